// src/fetch/bulk.rs

use futures_util::StreamExt;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tokio::{fs, io::AsyncWriteExt, time::sleep};
use tracing::{debug, info, instrument};
use url::Url;

use super::transport::HttpTransport;
use super::DownloadOutcome;
use crate::error::Result;
use crate::process::utils::{publish, staging_file};

pub const ARCHIVE_BASE_URL: &str = "https://www.fdic.gov/foia/sod/";
/// Years up to and including this one exist only as bulk archives.
pub const LAST_BULK_YEAR: i32 = 1993;

pub fn archive_file_name(year: i32) -> String {
    format!("sod-{}.zip", year)
}

pub fn archive_url(base: &Url, year: i32) -> Result<Url> {
    Ok(base.join(&archive_file_name(year))?)
}

/// Download `sod-{year}.zip` into `out_dir`, streaming the body to disk.
/// Skips without any request when the archive is already present.
#[instrument(level = "info", skip(transport, base, out_dir))]
pub async fn download_year_bulk(
    transport: &HttpTransport,
    base: &Url,
    year: i32,
    out_dir: &Path,
    delay: Duration,
) -> Result<DownloadOutcome> {
    let dest: PathBuf = out_dir.join(archive_file_name(year));
    if dest.exists() {
        info!(year, path = %dest.display(), "already exists");
        return Ok(DownloadOutcome::Skipped(dest));
    }
    fs::create_dir_all(out_dir).await?;

    if !delay.is_zero() {
        sleep(delay).await;
    }

    let url = archive_url(base, year)?;
    info!(year, %url, "downloading");
    // dropped, and so deleted, on any early return
    let staged = staging_file(&dest)?;
    let file = fs::File::from_std(staged.as_file().try_clone()?);
    let bytes = stream_to_file(transport, &url, file, year).await?;
    publish(staged, &dest)?;

    info!(year, bytes, "downloaded {}", dest.display());
    Ok(DownloadOutcome::Downloaded { path: dest, bytes })
}

async fn stream_to_file(
    transport: &HttpTransport,
    url: &Url,
    mut file: fs::File,
    year: i32,
) -> Result<u64> {
    let resp = transport.get(url.as_str(), &[]).await?;
    let declared = resp.content_length().filter(|n| *n > 0);

    let mut stream = resp.bytes_stream();
    let mut written = 0u64;
    let step = declared.map(|total| (total / 10).max(1));
    let mut next_report = step.unwrap_or(u64::MAX);

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;

        if let (Some(total), Some(step)) = (declared, step) {
            if written >= next_report {
                debug!(year, written, total, "progress {}%", written * 100 / total);
                next_report = written + step;
            }
        }
    }
    file.flush().await?;
    Ok(written)
}
