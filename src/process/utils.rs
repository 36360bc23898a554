use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::{io, path::Path};
use tempfile::{Builder, NamedTempFile};

use crate::schema::ColumnType;

static LEGACY_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"sod-(\d{4})").expect("valid regex"));
static MODERN_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"ALL_(\d{4})").expect("valid regex"));

/// Extracts the data year from a raw file name, trying:
///  - `sod-YYYY` (bulk archives)
///  - `ALL_YYYY` (API exports)
pub fn year_from_filename(filename: &str) -> Option<i32> {
    [&*LEGACY_YEAR, &*MODERN_YEAR]
        .iter()
        .find_map(|re| re.captures(filename))
        .and_then(|caps| caps[1].parse().ok())
}

/// June 30 of `year`.
pub fn reporting_period(year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, 6, 30)
}

/// Days since the Unix epoch, as stored in an Arrow Date32 column.
pub fn date32_days(date: NaiveDate) -> i32 {
    (date - NaiveDate::default()).num_days() as i32
}

/// Empty or whitespace-only cells are missing values.
pub fn is_missing(raw: &str) -> bool {
    raw.trim().is_empty()
}

/// Integer value of a cell, accepting integral floats such as `"628.0"`.
pub fn parse_integer(raw: &str) -> Option<i64> {
    let s = raw.trim();
    if let Ok(v) = s.parse::<i64>() {
        return Some(v);
    }
    let f = s.parse::<f64>().ok()?;
    if f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

/// Infer a column type from its cells; missing cells don't vote.
pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut seen = false;
    let mut all_int = true;
    let mut all_float = true;

    for v in values.into_iter().filter(|v| !is_missing(v)) {
        seen = true;
        let s = v.trim();
        if all_int && s.parse::<i64>().is_err() {
            all_int = false;
        }
        if !all_int && s.parse::<f64>().is_err() {
            all_float = false;
            break;
        }
    }

    match (seen, all_int, all_float) {
        (false, _, _) => ColumnType::Utf8,
        (true, true, _) => ColumnType::Int64,
        (true, false, true) => ColumnType::Float64,
        _ => ColumnType::Utf8,
    }
}

/// Hidden, uniquely named file next to `dest` for writing into.
/// Deleted on drop unless handed to [`publish`].
pub fn staging_file(dest: &Path) -> io::Result<NamedTempFile> {
    let dir = dest
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let name = dest
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Builder::new()
        .prefix(&format!(".{}.", name))
        .suffix(".partial")
        .tempfile_in(dir)
}

/// Move a fully written staging file to `dest`.
/// Fails with `AlreadyExists` instead of replacing a file another writer published.
pub fn publish(staged: NamedTempFile, dest: &Path) -> io::Result<()> {
    staged.persist_noclobber(dest).map(|_| ()).map_err(|e| e.error)
}
