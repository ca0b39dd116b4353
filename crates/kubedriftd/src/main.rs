//! kubedriftd — the kubedrift daemon.
//!
//! Single binary that assembles:
//! - Record store (redb)
//! - Node metric scraper
//! - Query API (drift records, node metrics, resource ingestion)
//!
//! # Usage
//!
//! ```text
//! kubectl proxy --port 8001 &
//! kubedriftd run --api-server 127.0.0.1:8001 --data-dir /var/lib/kubedrift --scrape-period 1m
//! ```

mod config;
mod daemon;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::{DEFAULT_LOG_FILTER, LogFormat, RunArgs, Settings};

#[derive(Parser)]
#[command(name = "kubedriftd", about = "kubedrift daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scrape node metrics on a fixed period and serve the query API.
    Run(RunArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            init_tracing(args.log_format);
            let settings = Settings::load(&args)?;
            daemon::run(settings).await
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
