//! Configuration types for Census components.
//!
//! Every component receives its configuration explicitly at construction.
//! Values are layered: built-in defaults, then the optional TOML file
//! (see [`default_config_path`]), then command-line arguments or
//! environment variables applied by the CLI.
//!
//! ```toml
//! portal_url = "https://data.gov.ua"
//!
//! [http]
//! timeout_secs = 30
//! max_retries = 3
//!
//! [counters]
//! max_bytes = 15000000
//!
//! [audit]
//! large_threshold = 536870912
//! aggregation = "max"
//! ```

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::audit::AggregationPolicy;
use crate::error::AppError;

/// Default byte cap for streamed delimited-text bodies.
pub const DEFAULT_MAX_BYTES: u64 = 15_000_000;

/// Resources whose probed size reaches this value are gated (512 MiB).
pub const DEFAULT_LARGE_THRESHOLD: u64 = 512 * 1024 * 1024;

const MIN_SPREADSHEET_MAX_BYTES: u64 = 20_000_000;
const MIN_ARCHIVE_MAX_BYTES: u64 = 25_000_000;
const MIN_ARCHIVE_ENTRY_MAX_BYTES: u64 = 10_000_000;

/// HTTP client configuration for catalog and resource requests.
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
            user_agent: format!("census/{} (ckan-audit)", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Catalog traversal configuration.
#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Datasets requested per `package_search` page.
    pub page_size: usize,
    /// Pause between catalog pages, per-item fetches and DataStore lookups.
    pub delay: Duration,
    /// Stop after this many datasets.
    pub limit: Option<usize>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            delay: Duration::from_millis(100),
            limit: None,
        }
    }
}

/// Byte caps and chunking for the file-based row counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterLimits {
    pub chunk_size: usize,
    pub csv_max_bytes: u64,
    pub spreadsheet_max_bytes: u64,
    /// Cap for the downloaded archive as a whole.
    pub archive_max_bytes: u64,
    /// Cap for the decompressed bytes of a single archive entry.
    pub archive_entry_max_bytes: u64,
}

impl CounterLimits {
    /// Derives every cap from a single `max_bytes` value.
    ///
    /// Spreadsheets and archives never get less than 20 MB and 25 MB, and
    /// archive entries get 90% of `max_bytes` with a 10 MB floor.
    ///
    /// ```
    /// use census_core::CounterLimits;
    ///
    /// let limits = CounterLimits::from_max_bytes(15_000_000);
    /// assert_eq!(limits.csv_max_bytes, 15_000_000);
    /// assert_eq!(limits.spreadsheet_max_bytes, 20_000_000);
    /// assert_eq!(limits.archive_max_bytes, 25_000_000);
    /// assert_eq!(limits.archive_entry_max_bytes, 13_500_000);
    /// ```
    pub fn from_max_bytes(max_bytes: u64) -> Self {
        Self {
            chunk_size: 64 * 1024,
            csv_max_bytes: max_bytes,
            spreadsheet_max_bytes: max_bytes.max(MIN_SPREADSHEET_MAX_BYTES),
            archive_max_bytes: max_bytes.max(MIN_ARCHIVE_MAX_BYTES),
            archive_entry_max_bytes: (max_bytes.saturating_mul(9) / 10)
                .max(MIN_ARCHIVE_ENTRY_MAX_BYTES),
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }
}

impl Default for CounterLimits {
    fn default() -> Self {
        Self::from_max_bytes(DEFAULT_MAX_BYTES)
    }
}

/// Dataset auditor configuration.
#[derive(Debug, Clone)]
pub struct AuditConfig {
    pub large_threshold: u64,
    pub aggregation: AggregationPolicy,
    /// Datasets audited at once. 1 keeps the run strictly sequential.
    pub concurrency: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            large_threshold: DEFAULT_LARGE_THRESHOLD,
            aggregation: AggregationPolicy::Max,
            concurrency: 1,
        }
    }
}

/// Locations of the two CSV reports.
#[derive(Debug, Clone)]
pub struct ReportConfig {
    pub metrics_path: PathBuf,
    pub large_resources_path: PathBuf,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            metrics_path: PathBuf::from("census_audit.csv"),
            large_resources_path: PathBuf::from("large_resources.csv"),
        }
    }
}

/// Optional settings read from a TOML file. Missing keys keep their defaults.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub portal_url: Option<String>,
    pub verbose: Option<bool>,
    pub http: HttpSection,
    pub catalog: CatalogSection,
    pub counters: CountersSection,
    pub audit: AuditSection,
    pub report: ReportSection,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpSection {
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CatalogSection {
    pub page_size: Option<usize>,
    pub delay_ms: Option<u64>,
    pub limit: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CountersSection {
    pub max_bytes: Option<u64>,
    pub chunk_size: Option<usize>,
    pub csv_max_bytes: Option<u64>,
    pub spreadsheet_max_bytes: Option<u64>,
    pub archive_max_bytes: Option<u64>,
    pub archive_entry_max_bytes: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AuditSection {
    pub large_threshold: Option<u64>,
    pub aggregation: Option<AggregationPolicy>,
    pub concurrency: Option<usize>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReportSection {
    pub metrics_path: Option<PathBuf>,
    pub large_resources_path: Option<PathBuf>,
}

impl FileConfig {
    pub fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig::default();
        let section = &self.http;
        if let Some(secs) = section.timeout_secs {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(retries) = section.max_retries {
            config.max_retries = retries;
        }
        if let Some(ms) = section.retry_base_delay_ms {
            config.retry_base_delay = Duration::from_millis(ms);
        }
        if let Some(agent) = &section.user_agent {
            config.user_agent = agent.clone();
        }
        config
    }

    pub fn catalog_config(&self) -> CatalogConfig {
        let mut config = CatalogConfig::default();
        let section = &self.catalog;
        if let Some(page_size) = section.page_size {
            config.page_size = page_size;
        }
        if let Some(ms) = section.delay_ms {
            config.delay = Duration::from_millis(ms);
        }
        config.limit = section.limit;
        config
    }

    /// Per-format caps given explicitly win over the ones derived from `max_bytes`.
    pub fn counter_limits(&self) -> CounterLimits {
        let section = &self.counters;
        let max_bytes = section.max_bytes.unwrap_or(DEFAULT_MAX_BYTES);
        let mut limits = CounterLimits::from_max_bytes(max_bytes);
        if let Some(chunk_size) = section.chunk_size {
            limits = limits.with_chunk_size(chunk_size);
        }
        if let Some(bytes) = section.csv_max_bytes {
            limits.csv_max_bytes = bytes;
        }
        if let Some(bytes) = section.spreadsheet_max_bytes {
            limits.spreadsheet_max_bytes = bytes;
        }
        if let Some(bytes) = section.archive_max_bytes {
            limits.archive_max_bytes = bytes;
        }
        if let Some(bytes) = section.archive_entry_max_bytes {
            limits.archive_entry_max_bytes = bytes;
        }
        limits
    }

    pub fn audit_config(&self) -> AuditConfig {
        let mut config = AuditConfig::default();
        let section = &self.audit;
        if let Some(threshold) = section.large_threshold {
            config.large_threshold = threshold;
        }
        if let Some(policy) = section.aggregation {
            config.aggregation = policy;
        }
        if let Some(concurrency) = section.concurrency {
            config.concurrency = concurrency.max(1);
        }
        config
    }

    pub fn report_config(&self) -> ReportConfig {
        let mut config = ReportConfig::default();
        if let Some(path) = &self.report.metrics_path {
            config.metrics_path = path.clone();
        }
        if let Some(path) = &self.report.large_resources_path {
            config.large_resources_path = path.clone();
        }
        config
    }
}

/// Returns `<config_dir>/census/config.toml`, if the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("census").join("config.toml"))
}

/// Reads and parses a TOML configuration file.
///
/// # Errors
///
/// Returns `AppError::ConfigError` if the file cannot be read or parsed.
pub fn load_file_config(path: &Path) -> Result<FileConfig, AppError> {
    let fail = |e: &dyn Display| AppError::ConfigError(format!("{}: {}", path.display(), e));
    let raw = std::fs::read_to_string(path).map_err(|e| fail(&e))?;
    toml::from_str(&raw).map_err(|e| fail(&e))
}
