// src/process/orchestrate.rs

use glob::glob;
use std::{
    path::{Path, PathBuf},
    sync::mpsc,
    time::Instant,
};
use tracing::{info, instrument, warn};

use super::task::{process_file, ProcessingResult, Status};
use super::utils::year_from_filename;
use crate::error::Result;
use crate::schema::FieldDescriptions;

const PROGRESS_EVERY: usize = 5;
const RAW_PATTERNS: [&str; 4] = ["*.zip", "*.ZIP", "*.csv", "*.CSV"];

/// How the run fans out over files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// One file at a time on the calling thread.
    Sequential,
    /// A dedicated pool of this many worker threads.
    Pool(usize),
}

impl Default for Parallelism {
    fn default() -> Self {
        Parallelism::Pool(num_cpus::get())
    }
}

impl Parallelism {
    pub fn from_options(no_parallel: bool, workers: Option<usize>) -> Self {
        match (no_parallel, workers) {
            (true, _) => Parallelism::Sequential,
            (false, Some(0)) => {
                warn!("--workers 0 is not a pool size; running sequentially");
                Parallelism::Sequential
            }
            (false, Some(n)) => Parallelism::Pool(n),
            (false, None) => Parallelism::default(),
        }
    }
}

/// Results of one run, in the order tasks finished.
#[derive(Debug, Default)]
pub struct RunSummary {
    pub results: Vec<ProcessingResult>,
}

impl RunSummary {
    fn with_status(&self, status: Status) -> Vec<&ProcessingResult> {
        self.results.iter().filter(|r| r.status == status).collect()
    }

    pub fn succeeded(&self) -> Vec<&ProcessingResult> {
        self.with_status(Status::Success)
    }

    pub fn skipped(&self) -> Vec<&ProcessingResult> {
        self.with_status(Status::Skipped)
    }

    pub fn failed(&self) -> Vec<&ProcessingResult> {
        self.with_status(Status::Error)
    }

    /// Exit condition for the whole run: no task failed.
    pub fn is_success(&self) -> bool {
        self.results.iter().all(|r| r.status != Status::Error)
    }

    /// Log counts and the years in each bucket.
    pub fn log(&self) {
        let years = |rs: Vec<&ProcessingResult>| -> Vec<String> {
            let mut ys: Vec<String> = rs
                .iter()
                .map(|r| match r.year {
                    Some(y) => y.to_string(),
                    None => r.source.display().to_string(),
                })
                .collect();
            ys.sort();
            ys
        };
        let (ok, skipped, failed) = (self.succeeded(), self.skipped(), self.failed());
        info!(
            succeeded = ok.len(),
            skipped = skipped.len(),
            failed = failed.len(),
            "run complete"
        );
        if !ok.is_empty() {
            info!("succeeded: {}", years(ok).join(", "));
        }
        if !skipped.is_empty() {
            info!("skipped (already processed): {}", years(skipped).join(", "));
        }
        for r in failed {
            warn!(year = ?r.year, file = %r.source.display(), "failed: {}", r.message);
        }
    }
}

/// Raw files under `input_dir`, sorted by path. With a year bound, files whose
/// year can't be read from the name are left out.
pub fn discover_raw_files(
    input_dir: &Path,
    start_year: Option<i32>,
    end_year: Option<i32>,
) -> Result<Vec<PathBuf>> {
    let dir = glob::Pattern::escape(&input_dir.display().to_string());
    let mut files = Vec::new();
    for pattern in RAW_PATTERNS {
        let pattern = format!("{}/{}", dir, pattern);
        files.extend(glob(&pattern)?.filter_map(|entry| entry.ok()));
    }
    files.sort();
    files.dedup();

    if start_year.is_none() && end_year.is_none() {
        return Ok(files);
    }
    let lo = start_year.unwrap_or(i32::MIN);
    let hi = end_year.unwrap_or(i32::MAX);
    Ok(files
        .into_iter()
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .and_then(year_from_filename)
                .is_some_and(|y| (lo..=hi).contains(&y))
        })
        .collect())
}

fn report_progress(done: usize, total: usize, result: &ProcessingResult) {
    if done % PROGRESS_EVERY == 0 || done == total {
        info!(done, total, "progress");
    }
    if result.status == Status::Error {
        warn!(file = %result.source.display(), "{}", result.message);
    }
}

/// Process every file, collecting one result per file as each finishes.
/// A failing file never stops the others.
#[instrument(level = "info", skip_all, fields(files = files.len()))]
pub fn run_all(
    files: &[PathBuf],
    out_dir: &Path,
    descriptions: &FieldDescriptions,
    parallelism: Parallelism,
) -> Result<RunSummary> {
    std::fs::create_dir_all(out_dir)?;
    let start = Instant::now();
    let total = files.len();
    let mut summary = RunSummary::default();

    match parallelism {
        Parallelism::Sequential | Parallelism::Pool(1) => {
            info!(total, "processing sequentially");
            for path in files {
                let result = process_file(path, out_dir, descriptions);
                report_progress(summary.results.len() + 1, total, &result);
                summary.results.push(result);
            }
        }
        Parallelism::Pool(n) => {
            info!(total, workers = n, "processing in parallel");
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n)
                .thread_name(|i| format!("sod-worker-{}", i))
                .build()?;

            let (tx, rx) = mpsc::channel::<ProcessingResult>();
            for path in files {
                let tx = tx.clone();
                let path = path.clone();
                let out_dir = out_dir.to_path_buf();
                let descriptions = descriptions.clone();
                pool.spawn(move || {
                    let _ = tx.send(process_file(&path, &out_dir, &descriptions));
                });
            }
            // rx ends once every task has dropped its sender
            drop(tx);

            for result in rx {
                report_progress(summary.results.len() + 1, total, &result);
                summary.results.push(result);
            }
            if summary.results.len() < total {
                warn!(
                    expected = total,
                    received = summary.results.len(),
                    "some workers exited without reporting"
                );
            }
        }
    }

    info!(elapsed = ?start.elapsed(), "all files handled");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::init_test_logging;
    use anyhow::Result;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, body: &str) -> Result<()> {
        let mut zip = zip::ZipWriter::new(File::create(path)?);
        zip.start_file("data.csv", SimpleFileOptions::default())?;
        zip.write_all(body.as_bytes())?;
        zip.finish()?;
        Ok(())
    }

    fn fixture_dir() -> Result<tempfile::TempDir> {
        let dir = tempdir()?;
        for year in 1988..=1991 {
            let body = format!("CERT,BRNUM,DEPSUMBR\n{0},0,100\n{0},1,200\n", year);
            write_zip(&dir.path().join(format!("sod-{}.zip", year)), &body)?;
        }
        fs::write(dir.path().join("sod-1992.zip"), b"this is not a zip")?;
        Ok(dir)
    }

    fn check_mixed_run(parallelism: Parallelism) -> Result<()> {
        init_test_logging();
        let dir = fixture_dir()?;
        let out = dir.path().join("processed");

        let files = discover_raw_files(dir.path(), None, None)?;
        assert_eq!(files.len(), 5);

        let summary = run_all(&files, &out, &FieldDescriptions::empty(), parallelism)?;
        assert_eq!(summary.results.len(), 5);
        assert_eq!(summary.succeeded().len(), 4);
        assert_eq!(summary.failed().len(), 1);
        assert_eq!(summary.failed()[0].year, Some(1992));
        assert!(!summary.is_success());

        for year in 1988..=1991 {
            assert!(out.join(format!("{}.parquet", year)).exists());
        }
        assert!(!out.join("1992.parquet").exists());

        let again = run_all(&files, &out, &FieldDescriptions::empty(), parallelism)?;
        assert_eq!(again.skipped().len(), 4);
        assert_eq!(again.failed().len(), 1);
        Ok(())
    }

    #[test]
    fn one_bad_year_does_not_stop_the_pool() -> Result<()> {
        check_mixed_run(Parallelism::Pool(3))
    }

    #[test]
    fn sequential_mode_matches_pool() -> Result<()> {
        check_mixed_run(Parallelism::Sequential)
    }

    #[test]
    fn discovery_filters_by_year() -> Result<()> {
        let dir = tempdir()?;
        for name in ["sod-1990.zip", "sod-1993.ZIP", "ALL_2001.csv", "ALL_2024.CSV", "notes.txt", "misc.csv"] {
            fs::write(dir.path().join(name), b"")?;
        }

        let all = discover_raw_files(dir.path(), None, None)?;
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0] <= w[1]));

        let names = |ps: Vec<PathBuf>| -> Vec<String> {
            ps.iter()
                .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
                .collect()
        };
        let ranged = discover_raw_files(dir.path(), Some(1991), Some(2010))?;
        assert_eq!(names(ranged), vec!["ALL_2001.csv", "sod-1993.ZIP"]);

        let from = discover_raw_files(dir.path(), Some(2002), None)?;
        assert_eq!(names(from), vec!["ALL_2024.CSV"]);
        Ok(())
    }

    #[test]
    fn discovery_handles_glob_characters_in_directory() -> Result<()> {
        let root = tempdir()?;
        let dir = root.path().join("raw[1]");
        fs::create_dir(&dir)?;
        fs::write(dir.join("ALL_2001.csv"), b"CERT\n1\n")?;

        let found = discover_raw_files(&dir, None, None)?;
        assert_eq!(found, vec![dir.join("ALL_2001.csv")]);
        Ok(())
    }

    #[test]
    fn two_inputs_for_one_year_publish_one_readable_file() -> Result<()> {
        init_test_logging();
        let dir = tempdir()?;
        let mut csv = String::from("CERT,DEPSUMBR\n");
        for cert in 0..20_000 {
            csv.push_str(&format!("{},{}\n", cert, cert * 10));
        }
        fs::write(dir.path().join("ALL_2000.csv"), &csv)?;
        write_zip(&dir.path().join("ALL_2000.zip"), "CERT,DEPSUMBR\n1,10\n2,20\n")?;
        let out = dir.path().join("processed");

        let files = discover_raw_files(dir.path(), None, None)?;
        assert_eq!(files.len(), 2);
        let summary = run_all(&files, &out, &FieldDescriptions::empty(), Parallelism::Pool(2))?;

        assert_eq!(summary.results.len(), 2);
        let winners = summary.succeeded();
        assert_eq!(winners.len(), 1);
        assert_eq!(summary.skipped().len() + summary.failed().len(), 1);

        let entries: Vec<String> = fs::read_dir(&out)?
            .map(|e| e.map(|e| e.file_name().to_string_lossy().into_owned()))
            .collect::<std::io::Result<_>>()?;
        assert_eq!(entries, vec!["2000.parquet"]);

        let file = File::open(out.join("2000.parquet"))?;
        let mut rows = 0;
        for batch in ParquetRecordBatchReaderBuilder::try_new(file)?.build()? {
            rows += batch?.num_rows();
        }
        assert_eq!(winners[0].message, format!("{} branches, 1 variables", rows));
        Ok(())
    }

    #[test]
    fn worker_selection() {
        assert_eq!(Parallelism::from_options(true, Some(8)), Parallelism::Sequential);
        assert_eq!(Parallelism::from_options(false, Some(4)), Parallelism::Pool(4));
        assert_eq!(Parallelism::from_options(false, Some(0)), Parallelism::Sequential);
        assert_eq!(
            Parallelism::from_options(false, None),
            Parallelism::Pool(num_cpus::get())
        );
    }
}
