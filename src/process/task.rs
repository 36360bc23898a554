// src/process/task.rs

use std::{
    fmt,
    panic::{self, AssertUnwindSafe},
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, error, info, instrument};

use super::{extract::read_table, normalize::normalize, utils::year_from_filename, write};
use crate::error::{Result, SodError};
use crate::schema::FieldDescriptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Success,
    Skipped,
    Error,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Success => "success",
            Status::Skipped => "skipped",
            Status::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome of processing one raw file. Never an `Err`: failures are data.
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub status: Status,
    /// Known whenever the file name carried a year.
    pub year: Option<i32>,
    pub message: String,
    pub source: PathBuf,
}

impl ProcessingResult {
    fn new(status: Status, year: Option<i32>, message: impl Into<String>, source: &Path) -> Self {
        Self {
            status,
            year,
            message: message.into(),
            source: source.to_path_buf(),
        }
    }
}

fn convert(path: &Path, year: i32, out_dir: &Path, descriptions: &FieldDescriptions) -> Result<String> {
    let raw = read_table(path)?;
    let dataset = normalize(raw, year)?;
    let bytes = write::write_year(&dataset, out_dir, descriptions)?;
    let cols = dataset.batch.num_columns();
    debug!(year, bytes, cols, "year written");
    Ok(format!(
        "{} branches, {} variables",
        dataset.num_rows(),
        cols.saturating_sub(2)
    ))
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}

/// Turn one raw file into `{out_dir}/{year}.parquet`.
///
/// Idempotent: an existing output is left untouched and reported as skipped.
/// Every failure, panics included, becomes an `Error` result.
#[instrument(level = "info", skip(path, out_dir, descriptions), fields(file = %path.display()))]
pub fn process_file(path: &Path, out_dir: &Path, descriptions: &FieldDescriptions) -> ProcessingResult {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let Some(year) = year_from_filename(&name) else {
        let err = SodError::UndeterminableYear(name);
        error!("{}", err);
        return ProcessingResult::new(Status::Error, None, err.to_string(), path);
    };

    if write::output_path(out_dir, year).exists() {
        info!(year, "output exists, skipping");
        return ProcessingResult::new(Status::Skipped, Some(year), "Already exists", path);
    }

    let start = Instant::now();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        convert(path, year, out_dir, descriptions)
    }));

    match outcome {
        Ok(Ok(message)) => {
            info!(year, elapsed = ?start.elapsed(), "{}", message);
            ProcessingResult::new(Status::Success, Some(year), message, path)
        }
        Ok(Err(e)) => {
            error!(year, "{}", e);
            ProcessingResult::new(Status::Error, Some(year), e.to_string(), path)
        }
        Err(payload) => {
            let message = panic_message(payload);
            error!(year, "panic: {}", message);
            ProcessingResult::new(Status::Error, Some(year), message, path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use anyhow::Result;
    use arrow::array::{Date32Array, Int64Array};
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entry: &str, body: &str) -> Result<()> {
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        zip.start_file(entry, SimpleFileOptions::default())?;
        zip.write_all(body.as_bytes())?;
        zip.finish()?;
        Ok(())
    }

    #[test]
    fn end_to_end_year_from_archive() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let raw = dir.path().join("sod-2000.zip");
        write_zip(
            &raw,
            "sod2000.csv",
            "cert,Branch_Name,DEPOSITS\n100,Main,5000\n,Orphan,10\n200,North,7500\n",
        )?;
        let out = dir.path().join("out");

        let result = process_file(&raw, &out, &FieldDescriptions::empty());
        assert_eq!(result.status, Status::Success, "{}", result.message);
        assert_eq!(result.year, Some(2000));
        assert_eq!(result.message, "2 branches, 2 variables");

        let file = File::open(out.join("2000.parquet"))?;
        let mut reader = ParquetRecordBatchReaderBuilder::try_new(file)?.build()?;
        let batch = reader.next().expect("one batch")?;
        let names: Vec<String> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect();
        assert_eq!(names, vec!["CERT", "REPORTING_PERIOD", "BRANCH_NAME", "DEPOSITS"]);

        let certs = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(certs.values().to_vec(), vec![100, 200]);
        let dates = batch.column(1).as_any().downcast_ref::<Date32Array>().unwrap();
        assert_eq!(dates.value_as_date(0).unwrap().to_string(), "2000-06-30");
        Ok(())
    }

    #[test]
    fn second_run_skips_and_leaves_output_untouched() -> Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("ALL_2010.csv");
        fs::write(&raw, "CERT,NAMEBR\n1,A\n2,B\n")?;

        let first = process_file(&raw, dir.path(), &FieldDescriptions::empty());
        assert_eq!(first.status, Status::Success);
        let before = fs::read(dir.path().join("2010.parquet"))?;

        let second = process_file(&raw, dir.path(), &FieldDescriptions::empty());
        assert_eq!(second.status, Status::Skipped);
        assert_eq!(second.message, "Already exists");
        assert_eq!(fs::read(dir.path().join("2010.parquet"))?, before);
        Ok(())
    }

    #[test]
    fn file_without_year_is_an_error_without_year() -> Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("notes.txt");
        fs::write(&raw, "hello")?;

        let result = process_file(&raw, dir.path(), &FieldDescriptions::empty());
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.year, None);
        assert!(result.message.contains("notes.txt"));
        Ok(())
    }

    #[test]
    fn unsupported_extension_reports_year() -> Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("ALL_2015.xlsx");
        fs::write(&raw, "binary")?;

        let result = process_file(&raw, dir.path(), &FieldDescriptions::empty());
        assert_eq!(result.status, Status::Error);
        assert_eq!(result.year, Some(2015));
        assert!(result.message.contains(".xlsx"));
        assert!(!dir.path().join("2015.parquet").exists());
        Ok(())
    }

    #[test]
    fn missing_cert_leaves_no_output() -> Result<()> {
        let dir = tempdir()?;
        let raw = dir.path().join("ALL_2003.csv");
        fs::write(&raw, "NAME,DEPSUMBR\nA,1\n")?;

        let result = process_file(&raw, dir.path(), &FieldDescriptions::empty());
        assert_eq!(result.status, Status::Error);
        assert!(result.message.contains("CERT"));
        assert!(!dir.path().join("2003.parquet").exists());
        Ok(())
    }
}
