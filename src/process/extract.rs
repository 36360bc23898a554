// src/process/extract.rs

use csv::ReaderBuilder;
use std::{
    fs::{self, File},
    io::Read,
    path::Path,
};
use tracing::{debug, instrument, warn};
use zip::ZipArchive;

use super::RawTable;
use crate::error::{Result, SodError};

/// How a raw file is laid out on disk; decided by extension alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    /// ZIP holding one CSV (bulk-archive years).
    Archive,
    /// Bare CSV (API years).
    Table,
}

impl SourceFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        match ext.as_str() {
            "zip" => Ok(SourceFormat::Archive),
            "csv" => Ok(SourceFormat::Table),
            _ => Err(SodError::UnsupportedFormat(format!(".{}", ext))),
        }
    }
}

/// UTF-8 if valid, otherwise Latin-1 (every byte maps to one char, nothing is lost).
pub fn decode_text(bytes: Vec<u8>) -> String {
    match String::from_utf8(bytes) {
        Ok(s) => s,
        Err(e) => {
            debug!(
                valid_up_to = e.utf8_error().valid_up_to(),
                "not UTF-8, decoding as Latin-1"
            );
            e.into_bytes().iter().map(|&b| b as char).collect()
        }
    }
}

/// Parse CSV text with a header row. Short rows are padded with empty cells;
/// rows longer than the header are rejected.
pub fn parse_table(text: &str) -> Result<RawTable> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
    let width = headers.len();

    let mut rows = Vec::new();
    for (idx, result) in rdr.records().enumerate() {
        let record = result?;
        if record.len() > width {
            return Err(SodError::RaggedRow {
                row: idx + 1,
                expected: width,
                found: record.len(),
            });
        }
        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(width, String::new());
        rows.push(row);
    }

    Ok(RawTable { headers, rows })
}

/// Open `zip_path` and read the first `.csv` entry.
pub fn read_archive(zip_path: &Path) -> Result<RawTable> {
    let file = File::open(zip_path)?;
    let mut archive = ZipArchive::new(file)?;

    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if !entry.is_file() || !name.to_lowercase().ends_with(".csv") {
            continue;
        }

        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf)?;
        debug!(entry = %name, bytes = buf.len(), "read archive member");
        return parse_table(&decode_text(buf));
    }

    Err(SodError::NoTableInArchive(zip_path.to_path_buf()))
}

pub fn read_bare_table(csv_path: &Path) -> Result<RawTable> {
    parse_table(&decode_text(fs::read(csv_path)?))
}

/// Turn any supported raw file into a header + rows table.
#[instrument(level = "debug", skip(path), fields(path = %path.display()))]
pub fn read_table(path: &Path) -> Result<RawTable> {
    let table = match SourceFormat::from_path(path)? {
        SourceFormat::Archive => read_archive(path)?,
        SourceFormat::Table => read_bare_table(path)?,
    };
    if table.rows.is_empty() {
        warn!("table has no data rows");
    }
    Ok(table)
}
