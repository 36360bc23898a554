use arrow::record_batch::RecordBatch;
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::debug;

use super::utils::{publish, staging_file};
use super::YearDataset;
use crate::error::Result;
use crate::schema::{arrow::descriptions_of, with_descriptions, FieldDescriptions};

/// `{out_dir}/{year}.parquet`; its existence is what marks a year as done.
pub fn output_path(out_dir: &Path, year: i32) -> PathBuf {
    out_dir.join(format!("{}.parquet", year))
}

/// Write one year to Parquet with per-field descriptions as column metadata.
/// The file only appears under its final name once fully written, and an
/// output some other writer already published is never replaced.
/// Returns the size of the written file in bytes.
pub fn write_year(
    dataset: &YearDataset,
    out_dir: &Path,
    descriptions: &FieldDescriptions,
) -> Result<u64> {
    fs::create_dir_all(out_dir)?;
    let dest = output_path(out_dir, dataset.year);

    let schema = with_descriptions(&dataset.schema(), descriptions);
    let documented = descriptions_of(&schema).len();
    let batch = RecordBatch::try_new(schema.clone(), dataset.batch.columns().to_vec())?;

    let mut staged = staging_file(&dest)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(staged.as_file_mut(), schema, Some(props))?;
    writer.write(&batch)?;
    writer.close()?;
    publish(staged, &dest)?;

    let bytes = fs::metadata(&dest)?.len();
    debug!(year = dataset.year, bytes, documented, "wrote {}", dest.display());
    Ok(bytes)
}
