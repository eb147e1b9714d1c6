//! follower-rank
//!
//! Collects the followers of an account, keeps them in
//! `{data_dir}/{handle}_followers.csv` and prints the top accounts ranked by
//! follower count.
//!
//! # Usage
//!
//! ```bash
//! # .env
//! X_BEARER_TOKEN=your_token_here
//! FOLLOWERS_HANDLE=rustlang
//!
//! follower-rank --mode fetch --top-n 10
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use collector::followers::config::DEFAULT_API_BASE;
use collector::followers::{ConsoleProgressReporter, IntoProgressCallback, ReportColumn};
use collector::{CollectorConfig, CollectorError, FollowerPipeline, ReportOptions, RunMode};

/// Rank the followers of an account by their own follower count
#[derive(Parser, Debug)]
#[command(name = "follower-rank", version)]
#[command(about = "Collect an account's followers incrementally and print a ranked report")]
struct Cli {
    /// Account whose followers are collected (leading @ optional)
    #[arg(long, env = "FOLLOWERS_HANDLE")]
    handle: String,

    /// API bearer token
    #[arg(long, env = "X_BEARER_TOKEN", hide_env_values = true)]
    token: String,

    /// Number of accounts in the report
    #[arg(long, default_value_t = 20)]
    top_n: usize,

    /// `existing` reports from stored data when present; `fetch` always merges new followers
    #[arg(long, default_value = "existing")]
    mode: RunMode,

    /// Directory holding the follower store
    #[arg(long, default_value = ".")]
    data_dir: PathBuf,

    /// Provider API root
    #[arg(long, env = "FOLLOWERS_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Report columns, comma separated (screen_name, followers_count, joined, name, id, resolved_at)
    #[arg(long, value_delimiter = ',')]
    columns: Vec<ReportColumn>,

    /// Column the report is ranked by, descending
    #[arg(long, default_value = "followers_count")]
    sort_by: ReportColumn,

    /// Log debug output and per-chunk progress
    #[arg(long, short)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    // Ignore error if .env not present
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(report) => {
            print!("{}", report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!("Run aborted ({})", e.category());
            eprint!("{}", e.detailed_report());
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<String, CollectorError> {
    let config = CollectorConfig::new(cli.token).with_api_base(cli.api_base);
    let progress = ConsoleProgressReporter::new(cli.verbose).into_callback();
    let pipeline = FollowerPipeline::from_config(config, cli.data_dir)?.with_progress(Some(progress));

    let summary = pipeline.run(&cli.handle, cli.mode).await?;
    if summary.fetched {
        tracing::info!(
            "{} new followers stored, {} in total",
            summary.written(),
            summary.stored
        );
        if !summary.unresolved().is_empty() {
            tracing::warn!(
                "{} followers could not be resolved and will be retried on the next run",
                summary.unresolved().len()
            );
        }
    }

    let mut options = ReportOptions {
        sort_by: cli.sort_by,
        top_n: cli.top_n,
        ..ReportOptions::default()
    };
    if !cli.columns.is_empty() {
        options.columns = cli.columns;
    }

    let report = pipeline.report(&summary.handle, &options).await?;
    Ok(report.render())
}
