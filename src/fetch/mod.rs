// src/fetch/mod.rs

pub mod api;
pub mod bulk;
pub mod transport;

use std::{path::PathBuf, time::Duration};
use tracing::{error, info};
use url::Url;

use crate::error::Result;
use api::ApiConfig;
use bulk::LAST_BULK_YEAR;
use transport::HttpTransport;

/// First year any deposit data is published for.
pub const FIRST_YEAR: i32 = 1987;

#[derive(Debug)]
pub enum DownloadOutcome {
    Downloaded { path: PathBuf, bytes: u64 },
    Skipped(PathBuf),
}

#[derive(Debug, Clone)]
pub struct DownloadConfig {
    pub start_year: i32,
    pub end_year: i32,
    pub out_dir: PathBuf,
    pub api: ApiConfig,
    pub archive_base: Url,
    /// Pause before each archive download.
    pub bulk_delay: Duration,
}

impl DownloadConfig {
    pub fn new(start_year: i32, end_year: i32, out_dir: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            start_year,
            end_year,
            out_dir: out_dir.into(),
            api: ApiConfig::default(),
            archive_base: Url::parse(bulk::ARCHIVE_BASE_URL)?,
            bulk_delay: Duration::from_millis(500),
        })
    }
}

#[derive(Debug, Default)]
pub struct DownloadSummary {
    pub succeeded: Vec<i32>,
    pub failed: Vec<(i32, String)>,
}

impl DownloadSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Download every year in the configured range, one at a time.
/// Archive-era years come from the bulk endpoint, later years from the paginated API.
/// A failing year is recorded and the loop moves on.
pub async fn download_years(transport: &HttpTransport, cfg: &DownloadConfig) -> DownloadSummary {
    let mut summary = DownloadSummary::default();

    for year in cfg.start_year..=cfg.end_year {
        let res = if year <= LAST_BULK_YEAR {
            bulk::download_year_bulk(transport, &cfg.archive_base, year, &cfg.out_dir, cfg.bulk_delay)
                .await
        } else {
            api::download_year_api(transport, &cfg.api, year, &cfg.out_dir).await
        };

        match res {
            Ok(_) => summary.succeeded.push(year),
            Err(e) => {
                error!(year, error = %e, "download failed");
                summary.failed.push((year, e.to_string()));
            }
        }
    }

    info!(
        succeeded = summary.succeeded.len(),
        failed = summary.failed.len(),
        "download summary"
    );
    if let (Some(lo), Some(hi)) = (summary.succeeded.first(), summary.succeeded.last()) {
        info!("years {}-{}", lo, hi);
    }
    if !summary.failed.is_empty() {
        let years: Vec<i32> = summary.failed.iter().map(|(y, _)| *y).collect();
        error!("failed years: {:?}", years);
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use serde_json::json;
    use transport::RetryPolicy;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn one_failing_year_does_not_stop_the_range() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/foia/sod/sod-1993.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"PK".to_vec()))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/banks/sod"))
            .and(query_param("filters", "YEAR:1994"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "meta": { "total": 0 }, "data": [] })),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir()?;
        let mut cfg = DownloadConfig::new(1993, 1994, dir.path())?;
        cfg.archive_base = Url::parse(&format!("{}/foia/sod/", server.uri()))?;
        cfg.api.base_url = format!("{}/banks/sod", server.uri());
        cfg.api.page_delay = Duration::ZERO;
        cfg.bulk_delay = Duration::ZERO;

        let transport = HttpTransport::new(RetryPolicy {
            initial_backoff: Duration::from_millis(1),
            ..RetryPolicy::default()
        })?;
        let summary = download_years(&transport, &cfg).await;

        assert_eq!(summary.succeeded, vec![1993]);
        assert_eq!(summary.failed.len(), 1);
        assert_eq!(summary.failed[0].0, 1994);
        assert!(!summary.is_success());
        assert!(dir.path().join("sod-1993.zip").exists());
        Ok(())
    }
}
