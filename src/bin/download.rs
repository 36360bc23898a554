use anyhow::Result;
use clap::Parser;
use sodscraper::{
    fetch::{
        api::{API_BASE_URL, MAX_PAGE_SIZE},
        download_years,
        transport::{HttpTransport, RetryPolicy},
        DownloadConfig, FIRST_YEAR,
    },
    logging::init_logging,
};
use std::{path::PathBuf, process::ExitCode, time::Duration};
use tracing::{error, info, warn};

/// Download raw Summary of Deposits data, one file per year.
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    #[arg(long, default_value_t = FIRST_YEAR)]
    start_year: i32,

    #[arg(long, default_value_t = 2025)]
    end_year: i32,

    #[arg(long, default_value = "data/raw")]
    output_dir: PathBuf,

    #[arg(long, env = "FDIC_API_KEY")]
    api_key: Option<String>,

    /// Seconds to wait between requests.
    #[arg(long, default_value_t = 0.5)]
    delay: f64,

    #[arg(long, default_value_t = MAX_PAGE_SIZE)]
    page_size: usize,

    #[arg(long, default_value = API_BASE_URL)]
    base_url: String,
}

fn parse_delay(secs: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(secs).ok()
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_logging();
    let args = Args::parse();

    let start_year = if args.start_year < FIRST_YEAR {
        warn!("no data before {}; starting there instead of {}", FIRST_YEAR, args.start_year);
        FIRST_YEAR
    } else {
        args.start_year
    };
    if args.end_year < start_year {
        error!("end year {} is before start year {}", args.end_year, start_year);
        return Ok(ExitCode::FAILURE);
    }
    if args.page_size == 0 || args.page_size > MAX_PAGE_SIZE {
        error!("page size must be between 1 and {}", MAX_PAGE_SIZE);
        return Ok(ExitCode::FAILURE);
    }

    let delay = match parse_delay(args.delay) {
        Some(d) => d,
        None => {
            error!("--delay must be a finite, non-negative number of seconds, got {}", args.delay);
            return Ok(ExitCode::FAILURE);
        }
    };
    let mut cfg = DownloadConfig::new(start_year, args.end_year, &args.output_dir)?;
    cfg.bulk_delay = delay;
    cfg.api.page_delay = delay;
    cfg.api.page_size = args.page_size;
    cfg.api.base_url = args.base_url;
    cfg.api.api_key = args.api_key.filter(|k| !k.is_empty());

    info!(
        "downloading {}-{} → {}",
        cfg.start_year,
        cfg.end_year,
        cfg.out_dir.display()
    );
    std::fs::create_dir_all(&cfg.out_dir)?;

    let transport = HttpTransport::new(RetryPolicy::default())?;
    let summary = download_years(&transport, &cfg).await;

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
