// src/error.rs

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for library operations
pub type Result<T> = std::result::Result<T, SodError>;

#[derive(Error, Debug)]
pub enum SodError {
    // ─── transport ──────────────────────────────────────────────────
    #[error("GET {url} failed after {attempts} attempts: {reason}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        reason: String,
    },

    #[error("GET {url} returned non-retryable status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    // ─── fetch ──────────────────────────────────────────────────────
    #[error("no records found for year {0}")]
    EmptyResult(i32),

    #[error("failed to download any data for year {0}")]
    NoPages(i32),

    // ─── data ───────────────────────────────────────────────────────
    #[error("CERT column not found in data for year {0}")]
    MissingIdentifier(i32),

    #[error("row {row} has {found} fields but the header has {expected}")]
    RaggedRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    // ─── format ─────────────────────────────────────────────────────
    #[error("unsupported file type: {0:?}")]
    UnsupportedFormat(String),

    #[error("could not extract year from {0}")]
    UndeterminableYear(String),

    #[error("no CSV found in {}", .0.display())]
    NoTableInArchive(PathBuf),

    // ─── wrapped ────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("ZIP error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("Parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("bad glob pattern: {0}")]
    Glob(#[from] glob::PatternError),

    #[error("worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

impl SodError {
    /// True for failures that came from the network layer.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            SodError::RetriesExhausted { .. } | SodError::HttpStatus { .. } | SodError::Http(_)
        )
    }
}
