use std::path::PathBuf;
use std::time::Duration;

use census_core::{
    default_config_path, parse_byte_size, AggregationPolicy, AuditConfig, CatalogConfig,
    CounterLimits, FileConfig, HttpConfig, ReportConfig,
};
use clap::{Parser, ValueEnum};

/// Portal audited when neither the command line nor the config file names one.
pub const DEFAULT_PORTAL_URL: &str = "https://data.gov.ua";

/// CLI configuration parsed from command line arguments and environment variables.
///
/// Every option left unset falls back to the config file, then to the
/// built-in defaults.
#[derive(Parser, Debug)]
#[command(name = "census")]
#[command(
    author,
    version,
    about = "Estimate how many data rows each dataset of a CKAN portal holds"
)]
#[command(after_help = "Examples:
  census --limit 100 --verbose
  census --portal https://demo.ckan.org --out demo.csv
  census --max-bytes 50MB --large-threshold 1GiB --aggregation sum
  census --config ~/census.toml --concurrency 4")]
pub struct Config {
    /// Base URL of the CKAN portal
    #[arg(long, env = "CENSUS_PORTAL_URL", value_name = "URL")]
    pub portal: Option<String>,

    /// Stop after this many datasets
    #[arg(long)]
    pub limit: Option<usize>,

    /// Byte cap for delimited-text bodies; spreadsheet and archive caps derive from it
    #[arg(long, value_name = "SIZE", value_parser = byte_size)]
    pub max_bytes: Option<u64>,

    /// Read and write granularity for downloads
    #[arg(long, value_name = "SIZE", value_parser = byte_size)]
    pub chunk_size: Option<u64>,

    /// Metrics report (appended to)
    #[arg(long, value_name = "PATH")]
    pub out: Option<PathBuf>,

    /// Large-resource report (appended to)
    #[arg(long, value_name = "PATH")]
    pub large_out: Option<PathBuf>,

    /// Resources whose Content-Length is at or above this size are not counted
    #[arg(long, value_name = "SIZE", value_parser = byte_size)]
    pub large_threshold: Option<u64>,

    /// Datasets per package_search page
    #[arg(long)]
    pub page_size: Option<usize>,

    /// Pause between catalog and DataStore calls, in milliseconds
    #[arg(long, value_name = "MS")]
    pub delay_ms: Option<u64>,

    /// Per-request timeout, in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout_secs: Option<u64>,

    /// Attempts per HTTP call
    #[arg(long)]
    pub retries: Option<u32>,

    /// How resource counts combine into a dataset total
    #[arg(long, value_enum)]
    pub aggregation: Option<Aggregation>,

    /// Datasets audited at once
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// TOML configuration file (default: <config dir>/census/config.toml, if present)
    #[arg(short, long, env = "CENSUS_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log every per-resource decision
    #[arg(short, long)]
    pub verbose: bool,
}

/// Aggregation policies selectable on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Aggregation {
    /// Largest resource count wins
    Max,
    /// Resource counts are added up
    Sum,
}

impl From<Aggregation> for AggregationPolicy {
    fn from(value: Aggregation) -> Self {
        match value {
            Aggregation::Max => AggregationPolicy::Max,
            Aggregation::Sum => AggregationPolicy::Sum,
        }
    }
}

/// Fully resolved settings for one audit run.
#[derive(Debug, Clone)]
pub struct Settings {
    pub portal_url: String,
    pub verbose: bool,
    pub http: HttpConfig,
    pub catalog: CatalogConfig,
    pub limits: CounterLimits,
    pub audit: AuditConfig,
    pub report: ReportConfig,
}

impl Config {
    /// The explicit `--config` path, or the default one when that file exists.
    pub fn config_path(&self) -> Option<PathBuf> {
        self.config
            .clone()
            .or_else(|| default_config_path().filter(|path| path.is_file()))
    }

    /// Layers command-line values over `file`.
    ///
    /// `--max-bytes` re-derives every per-format cap, replacing caps the file
    /// set individually.
    pub fn resolve(&self, file: &FileConfig) -> Settings {
        let mut http = file.http_config();
        if let Some(secs) = self.timeout_secs {
            http.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = self.retries {
            http.max_retries = retries;
        }

        let mut catalog = file.catalog_config();
        if let Some(page_size) = self.page_size {
            catalog.page_size = page_size;
        }
        if let Some(ms) = self.delay_ms {
            catalog.delay = Duration::from_millis(ms);
        }
        if self.limit.is_some() {
            catalog.limit = self.limit;
        }
        catalog.page_size = catalog.page_size.max(1);

        let file_limits = file.counter_limits();
        let mut limits = match self.max_bytes {
            Some(max_bytes) => {
                CounterLimits::from_max_bytes(max_bytes).with_chunk_size(file_limits.chunk_size)
            }
            None => file_limits,
        };
        if let Some(chunk_size) = self.chunk_size {
            limits = limits.with_chunk_size(usize::try_from(chunk_size).unwrap_or(usize::MAX));
        }

        let mut audit = file.audit_config();
        if let Some(threshold) = self.large_threshold {
            audit.large_threshold = threshold;
        }
        if let Some(aggregation) = self.aggregation {
            audit.aggregation = aggregation.into();
        }
        if let Some(concurrency) = self.concurrency {
            audit.concurrency = concurrency.max(1);
        }

        let mut report = file.report_config();
        if let Some(path) = &self.out {
            report.metrics_path = path.clone();
        }
        if let Some(path) = &self.large_out {
            report.large_resources_path = path.clone();
        }

        Settings {
            portal_url: self
                .portal
                .clone()
                .or_else(|| file.portal_url.clone())
                .unwrap_or_else(|| DEFAULT_PORTAL_URL.to_string()),
            verbose: self.verbose || file.verbose.unwrap_or(false),
            http,
            catalog,
            limits,
            audit,
            report,
        }
    }
}

fn byte_size(raw: &str) -> Result<u64, String> {
    parse_byte_size(raw)
        .ok_or_else(|| format!("invalid size '{}' (try 15000000, 15MB or 512MiB)", raw))
}
