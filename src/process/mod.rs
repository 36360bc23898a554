// src/process/mod.rs

pub mod extract;
pub mod normalize;
pub mod orchestrate;
pub mod task;
pub mod utils;
pub mod write;

use arrow::{datatypes::SchemaRef, record_batch::RecordBatch};

pub use normalize::normalize;
pub use orchestrate::{discover_raw_files, run_all, Parallelism, RunSummary};
pub use task::{process_file, ProcessingResult, Status};
pub use write::{output_path, write_year};

/// One raw file as read from disk, before any normalization.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    /// Column names exactly as the file spells them.
    pub headers: Vec<String>,
    /// Data rows, each padded to `headers.len()`.
    pub rows: Vec<Vec<String>>,
}

/// A normalized year: canonical column order, CERT on every row,
/// REPORTING_PERIOD fixed to June 30 of `year`.
#[derive(Debug, Clone)]
pub struct YearDataset {
    pub year: i32,
    pub batch: RecordBatch,
}

impl YearDataset {
    pub fn num_rows(&self) -> usize {
        self.batch.num_rows()
    }

    pub fn schema(&self) -> SchemaRef {
        self.batch.schema()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name().clone())
            .collect()
    }
}
