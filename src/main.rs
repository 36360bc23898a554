use anyhow::Result;
use clap::Parser;
use sodscraper::{
    fetch::transport::{HttpTransport, RetryPolicy},
    logging::init_logging,
    process::{discover_raw_files, run_all, Parallelism},
    schema::{
        descriptions::{DEFAULT_CACHE_PATH, SCHEMA_URL},
        FieldDescriptions, SchemaCache,
    },
};
use std::{path::PathBuf, process::ExitCode};
use tokio::time::Instant;
use tracing::{error, info};

/// Normalize raw Summary of Deposits files into one Parquet file per year.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory holding `sod-YYYY.zip` / `ALL_YYYY.csv` files.
    #[arg(long, default_value = "data/raw")]
    input_dir: PathBuf,

    #[arg(long, default_value = "data/processed")]
    output_dir: PathBuf,

    /// Worker threads (default: CPU count).
    #[arg(long)]
    workers: Option<usize>,

    /// Process one file at a time.
    #[arg(long)]
    no_parallel: bool,

    #[arg(long)]
    start_year: Option<i32>,

    #[arg(long)]
    end_year: Option<i32>,

    /// Skip field descriptions entirely.
    #[arg(long)]
    no_descriptions: bool,

    /// Refetch the schema document even if a cache exists.
    #[arg(long)]
    refresh_schema: bool,

    #[arg(long, default_value = DEFAULT_CACHE_PATH)]
    schema_cache: PathBuf,

    #[arg(long, default_value = SCHEMA_URL)]
    schema_url: String,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let args = Args::parse();
    let start = Instant::now();

    // ─── 1) find raw files ───────────────────────────────────────────
    if !args.input_dir.is_dir() {
        error!("input directory {} does not exist", args.input_dir.display());
        return Ok(ExitCode::FAILURE);
    }
    let files = discover_raw_files(&args.input_dir, args.start_year, args.end_year)?;
    if files.is_empty() {
        error!("no raw files found in {}", args.input_dir.display());
        return Ok(ExitCode::FAILURE);
    }
    info!("{} files to process → {}", files.len(), args.output_dir.display());

    // ─── 2) field descriptions, resolved once before fan-out ─────────
    let descriptions = if args.no_descriptions {
        info!("field descriptions disabled");
        FieldDescriptions::empty()
    } else {
        let transport = HttpTransport::new(RetryPolicy::default())?;
        SchemaCache::new(&args.schema_cache, &args.schema_url)
            .load_or_fetch(&transport, args.refresh_schema)
            .await
    };

    // ─── 3) process on the blocking pool ─────────────────────────────
    let parallelism = Parallelism::from_options(args.no_parallel, args.workers);
    let out_dir = args.output_dir.clone();
    let summary = tokio::task::spawn_blocking(move || {
        run_all(&files, &out_dir, &descriptions, parallelism)
    })
    .await??;

    summary.log();
    info!(elapsed = ?start.elapsed(), "done");

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
