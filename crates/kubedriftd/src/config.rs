//! Daemon settings: CLI flags layered over an optional TOML file.
//!
//! ```toml
//! data_dir = "/var/lib/kubedrift"
//! api_server = "http://127.0.0.1:8001"
//! listen = "0.0.0.0:8080"
//! scrape_period = "1m"
//! endpoint = "metrics/cadvisor"
//! timeout_fraction = 0.9
//! conditions = "last"          # or "all"
//! allow_list = ["container_cpu_usage_seconds_total"]
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Args, ValueEnum};
use kubedrift_drift::{ConditionPolicy, FlattenOptions};
use kubedrift_metrics::MetricAllowList;
use kubedrift_scraper::ScrapeConfig;
use serde::Deserialize;

pub const DEFAULT_DATA_DIR: &str = "/tmp/kube-drift";
pub const DEFAULT_API_SERVER: &str = "127.0.0.1:8001";
pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_LOG_FILTER: &str = "info,kubedrift=debug";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Default, Args)]
pub struct RunArgs {
    /// Directory holding the record store.
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// API server address (host:port or http://host:port), e.g. a `kubectl proxy`.
    #[arg(long)]
    pub api_server: Option<String>,

    /// Address the query API binds to.
    #[arg(long)]
    pub listen: Option<SocketAddr>,

    /// Time between scrape cycles ("30s", "2m", "500ms", or bare seconds).
    #[arg(long)]
    pub scrape_period: Option<String>,

    /// Path scraped under each node's proxy.
    #[arg(long)]
    pub endpoint: Option<String>,

    /// TOML settings file. Flags override its values.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// File containing a bearer token for the API server.
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Settings file contents. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    pub api_server: Option<String>,
    pub listen: Option<SocketAddr>,
    pub scrape_period: Option<String>,
    pub endpoint: Option<String>,
    pub timeout_fraction: Option<f64>,
    pub token_file: Option<PathBuf>,
    pub allow_list: Option<Vec<String>>,
    pub conditions: Option<ConditionPolicy>,
}

impl FileConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        toml::from_str(&text).with_context(|| format!("parsing config file {}", path.display()))
    }
}

/// Fully resolved daemon settings.
#[derive(Debug)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub api_server: String,
    pub listen: SocketAddr,
    pub token: Option<String>,
    pub scrape: ScrapeConfig,
    pub allow_list: MetricAllowList,
    pub flatten: FlattenOptions,
}

impl Settings {
    /// Read the config file named by `args` (if any) and merge.
    pub fn load(args: &RunArgs) -> anyhow::Result<Self> {
        let file = match &args.config {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };
        Self::resolve(args, file)
    }

    pub fn resolve(args: &RunArgs, file: FileConfig) -> anyhow::Result<Self> {
        let period_text = args
            .scrape_period
            .clone()
            .or(file.scrape_period)
            .unwrap_or_else(|| "1m".to_string());
        let period = parse_duration(&period_text)
            .with_context(|| format!("invalid scrape period {period_text:?}"))?;
        if period.is_zero() {
            bail!("scrape period must be greater than zero");
        }

        let defaults = ScrapeConfig::default();
        let timeout_fraction = file.timeout_fraction.unwrap_or(defaults.timeout_fraction);
        if !(timeout_fraction > 0.0 && timeout_fraction <= 1.0) {
            bail!("timeout_fraction must be in (0, 1], got {timeout_fraction}");
        }

        let listen = match args.listen.or(file.listen) {
            Some(addr) => addr,
            None => DEFAULT_LISTEN.parse().context("default listen address")?,
        };

        let token = match args.token_file.as_ref().or(file.token_file.as_ref()) {
            Some(path) => Some(read_token(path)?),
            None => None,
        };

        let allow_list = match file.allow_list {
            Some(names) if names.is_empty() => bail!("allow_list must name at least one metric"),
            Some(names) => MetricAllowList::new(names),
            None => MetricAllowList::cadvisor(),
        };

        Ok(Self {
            data_dir: args
                .data_dir
                .clone()
                .or(file.data_dir)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            api_server: args
                .api_server
                .clone()
                .or(file.api_server)
                .unwrap_or_else(|| DEFAULT_API_SERVER.to_string()),
            listen,
            token,
            scrape: ScrapeConfig {
                period,
                endpoint: args
                    .endpoint
                    .clone()
                    .or(file.endpoint)
                    .unwrap_or(defaults.endpoint),
                timeout_fraction,
            },
            allow_list,
            flatten: FlattenOptions {
                conditions: file.conditions.unwrap_or_default(),
            },
        })
    }
}

fn read_token(path: &Path) -> anyhow::Result<String> {
    let token = std::fs::read_to_string(path)
        .with_context(|| format!("reading token file {}", path.display()))?;
    let token = token.trim();
    if token.is_empty() {
        bail!("token file {} is empty", path.display());
    }
    Ok(token.to_string())
}

/// Parse a duration string like "5s", "500ms", "2m", or bare seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(secs) = s.strip_suffix('s') {
        if let Some(ms) = secs.strip_suffix('m') {
            ms.parse::<u64>().ok().map(Duration::from_millis)
        } else {
            secs.parse::<u64>().ok().map(Duration::from_secs)
        }
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok()?.checked_mul(60).map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
