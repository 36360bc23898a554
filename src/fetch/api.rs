// src/fetch/api.rs

use serde::Deserialize;
use serde_json::{Map, Value};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::time::sleep;
use tracing::{debug, error, info, instrument, warn};

use super::transport::HttpTransport;
use super::DownloadOutcome;
use crate::error::{Result, SodError};
use crate::process::utils::{publish, staging_file};

pub const API_BASE_URL: &str = "https://api.fdic.gov/banks/sod";
/// Largest `limit` the dataset endpoint accepts.
pub const MAX_PAGE_SIZE: usize = 10_000;
/// Stable sort key so offsets never skip or repeat rows.
const SORT_FIELD: &str = "CERT";

/// One record after unwrapping from its `{ "data": {...}, "score": .. }` envelope.
pub type Record = Map<String, Value>;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub page_size: usize,
    /// Pause between successive page requests.
    pub page_delay: Duration,
    pub api_key: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: API_BASE_URL.to_string(),
            page_size: MAX_PAGE_SIZE,
            page_delay: Duration::from_millis(500),
            api_key: None,
        }
    }
}

impl ApiConfig {
    fn query(&self, year: i32, limit: usize, offset: u64, sorted: bool) -> Vec<(&'static str, String)> {
        let mut q = vec![
            ("filters", format!("YEAR:{}", year)),
            ("limit", limit.min(MAX_PAGE_SIZE).to_string()),
            ("offset", offset.to_string()),
        ];
        if sorted {
            q.push(("sort_by", SORT_FIELD.to_string()));
            q.push(("sort_order", "ASC".to_string()));
        }
        if let Some(key) = &self.api_key {
            q.push(("api_key", key.clone()));
        }
        q
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    meta: ApiMeta,
    #[serde(default)]
    data: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ApiMeta {
    #[serde(default)]
    total: u64,
}

/// All pages accumulated for one year, in fetch order.
#[derive(Debug)]
pub struct FetchedYear {
    pub year: i32,
    /// Total reported by the probe; may be approximate.
    pub total: u64,
    pub pages: usize,
    pub records: Vec<Record>,
}

fn unwrap_record(wrapper: Value) -> Option<Record> {
    match wrapper {
        Value::Object(mut outer) => match outer.remove("data") {
            Some(Value::Object(inner)) => Some(inner),
            Some(other) => {
                outer.insert("data".to_string(), other);
                Some(outer)
            }
            None => Some(outer),
        },
        _ => None,
    }
}

/// Zero-limit query that only reads `meta.total`.
pub async fn probe_total(transport: &HttpTransport, cfg: &ApiConfig, year: i32) -> Result<u64> {
    let resp: ApiResponse = transport
        .get_json(&cfg.base_url, &cfg.query(year, 0, 0, false))
        .await?;
    Ok(resp.meta.total)
}

pub async fn fetch_page(
    transport: &HttpTransport,
    cfg: &ApiConfig,
    year: i32,
    offset: u64,
) -> Result<Vec<Record>> {
    let resp: ApiResponse = transport
        .get_json(&cfg.base_url, &cfg.query(year, cfg.page_size, offset, true))
        .await?;
    Ok(resp.data.into_iter().filter_map(unwrap_record).collect())
}

/// Page through one year's records strictly sequentially.
///
/// Stops on an empty page or once the accumulated count reaches the probed
/// total. A page failure after at least one good page ends pagination with
/// what has been fetched so far; failing before any page fails the year.
#[instrument(level = "info", skip(transport, cfg))]
pub async fn fetch_year(transport: &HttpTransport, cfg: &ApiConfig, year: i32) -> Result<FetchedYear> {
    let total = probe_total(transport, cfg, year).await?;
    if total == 0 {
        warn!(year, "no records found");
        return Err(SodError::EmptyResult(year));
    }
    info!(year, total, "total records");

    let mut records: Vec<Record> = Vec::new();
    let mut pages = 0usize;
    let mut offset = 0u64;
    let mut last_err = None;

    while offset < total {
        let page = match fetch_page(transport, cfg, year, offset).await {
            Ok(p) => p,
            Err(e) => {
                error!(year, offset, error = %e, "page request failed");
                last_err = Some(e);
                break;
            }
        };
        if page.is_empty() {
            debug!(year, offset, "empty page");
            break;
        }

        offset += page.len() as u64;
        pages += 1;
        records.extend(page);
        debug!(year, pages, fetched = offset, total, "page fetched");

        if offset < total && !cfg.page_delay.is_zero() {
            sleep(cfg.page_delay).await;
        }
    }

    if pages == 0 {
        return Err(last_err.unwrap_or(SodError::NoPages(year)));
    }
    if offset < total {
        warn!(year, fetched = offset, total, "stopped before reported total");
    }

    Ok(FetchedYear {
        year,
        total,
        pages,
        records,
    })
}

fn render(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        nested => nested.to_string(),
    }
}

/// Write records as CSV with upper-cased column names in first-seen order.
pub fn write_records_csv(records: &[Record], dest: &Path) -> Result<()> {
    let mut columns: Vec<String> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();
    for rec in records {
        for key in rec.keys() {
            let upper = key.to_uppercase();
            if !index.contains_key(&upper) {
                index.insert(upper.clone(), columns.len());
                columns.push(upper);
            }
        }
    }

    let mut staged = staging_file(dest)?;
    {
        let mut wtr = csv::Writer::from_writer(staged.as_file_mut());
        wtr.write_record(&columns)?;
        for rec in records {
            let mut row = vec![String::new(); columns.len()];
            for (key, value) in rec {
                row[index[&key.to_uppercase()]] = render(value);
            }
            wtr.write_record(&row)?;
        }
        wtr.flush()?;
    }
    publish(staged, dest)?;
    Ok(())
}

pub fn api_file_name(year: i32) -> String {
    format!("ALL_{}.csv", year)
}

/// Fetch one API-era year into `out_dir/ALL_{year}.csv`, skipping if it exists.
pub async fn download_year_api(
    transport: &HttpTransport,
    cfg: &ApiConfig,
    year: i32,
    out_dir: &Path,
) -> Result<DownloadOutcome> {
    let dest: PathBuf = out_dir.join(api_file_name(year));
    if dest.exists() {
        info!(year, path = %dest.display(), "already exists");
        return Ok(DownloadOutcome::Skipped(dest));
    }
    fs::create_dir_all(out_dir)?;

    let fetched = fetch_year(transport, cfg, year).await?;
    info!(year, pages = fetched.pages, records = fetched.records.len(), "combining pages");
    write_records_csv(&fetched.records, &dest)?;

    let bytes = fs::metadata(&dest)?.len();
    info!(year, records = fetched.records.len(), bytes, "saved {}", dest.display());
    Ok(DownloadOutcome::Downloaded { path: dest, bytes })
}
