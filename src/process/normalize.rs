// src/process/normalize.rs

use arrow::{
    array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray},
    record_batch::RecordBatch,
};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};

use super::utils::{date32_days, infer_column_type, is_missing, parse_integer, reporting_period};
use super::{RawTable, YearDataset};
use crate::error::{Result, SodError};
use crate::schema::{build_arrow_schema, descriptions::REPORTING_PERIOD, ColumnType};

pub const CERT: &str = "CERT";
/// Identifier columns placed right after CERT and REPORTING_PERIOD when present.
pub const OPTIONAL_ID_COLUMNS: [&str; 3] = ["UNINUMBR", "BRNUM", "YEAR"];

/// Cell text; cells past the end of a short row read as empty.
fn raw_cell(row: &[String], idx: usize) -> &str {
    row.get(idx).map_or("", String::as_str)
}

fn cell(row: &[String], idx: usize) -> Option<&str> {
    let v = raw_cell(row, idx);
    (!is_missing(v)).then_some(v)
}

fn build_array(ty: ColumnType, rows: &[&Vec<String>], idx: usize) -> ArrayRef {
    match ty {
        ColumnType::Int64 => Arc::new(
            rows.iter()
                .map(|r| cell(r, idx).and_then(|v| v.trim().parse::<i64>().ok()))
                .collect::<Int64Array>(),
        ),
        ColumnType::Float64 => Arc::new(
            rows.iter()
                .map(|r| cell(r, idx).and_then(|v| v.trim().parse::<f64>().ok()))
                .collect::<Float64Array>(),
        ),
        ColumnType::Utf8 | ColumnType::Date32 => {
            Arc::new(rows.iter().map(|r| cell(r, idx)).collect::<StringArray>())
        }
    }
}

/// Standardize one year's raw table.
///
/// 1. column names trimmed and upper-cased
/// 2. REPORTING_PERIOD = June 30 of `year` on every row
/// 3. CERT coerced to integer; rows that don't coerce are dropped
/// 4. columns ordered CERT, REPORTING_PERIOD, present optional ids, then the rest A→Z
///
/// Fails only when the CERT column is absent altogether.
pub fn normalize(raw: RawTable, year: i32) -> Result<YearDataset> {
    let period = reporting_period(year)
        .ok_or_else(|| SodError::UndeterminableYear(year.to_string()))?;

    let mut columns: Vec<(String, usize)> = Vec::with_capacity(raw.headers.len());
    let mut seen = HashSet::new();
    for (idx, header) in raw.headers.iter().enumerate() {
        let name = header.trim().to_uppercase();
        if name == REPORTING_PERIOD {
            debug!(year, "replacing source {} column", REPORTING_PERIOD);
            continue;
        }
        if !seen.insert(name.clone()) {
            warn!(year, column = %name, "duplicate column after upper-casing; keeping first");
            continue;
        }
        columns.push((name, idx));
    }

    let cert_idx = columns
        .iter()
        .find(|(name, _)| name == CERT)
        .map(|(_, idx)| *idx)
        .ok_or(SodError::MissingIdentifier(year))?;

    let mut certs: Vec<i64> = Vec::with_capacity(raw.rows.len());
    let mut kept: Vec<&Vec<String>> = Vec::with_capacity(raw.rows.len());
    for row in &raw.rows {
        if let Some(cert) = parse_integer(raw_cell(row, cert_idx)) {
            certs.push(cert);
            kept.push(row);
        }
    }
    let dropped = raw.rows.len() - kept.len();
    if dropped > 0 {
        debug!(year, dropped, "dropped rows with non-numeric CERT");
    }

    let ids = OPTIONAL_ID_COLUMNS
        .iter()
        .filter_map(|id| columns.iter().find(|(name, _)| name == id).cloned());
    let mut rest: Vec<(String, usize)> = columns
        .iter()
        .filter(|(name, _)| name != CERT && !OPTIONAL_ID_COLUMNS.contains(&name.as_str()))
        .cloned()
        .collect();
    rest.sort_by(|a, b| a.0.cmp(&b.0));

    let mut fields: Vec<(String, ColumnType)> = vec![
        (CERT.to_string(), ColumnType::Int64),
        (REPORTING_PERIOD.to_string(), ColumnType::Date32),
    ];
    let mut arrays: Vec<ArrayRef> = vec![
        Arc::new(Int64Array::from(certs)),
        Arc::new(Date32Array::from(vec![date32_days(period); kept.len()])),
    ];

    for (name, idx) in ids.chain(rest) {
        let ty = infer_column_type(kept.iter().map(|r| raw_cell(r, idx)));
        arrays.push(build_array(ty, &kept, idx));
        fields.push((name, ty));
    }

    let batch = RecordBatch::try_new(build_arrow_schema(&fields), arrays)?;
    Ok(YearDataset { year, batch })
}
