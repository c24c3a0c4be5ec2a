//! Census Core - Domain types, row-count auditing, error handling, and configuration.

pub mod audit;
pub mod config;
pub mod error;
pub mod format;
pub mod lines;
pub mod models;
pub mod outcome;
pub mod size;

pub use audit::{
    aggregate_rows, AggregationPolicy, AuditStats, CountRequest, DatasetAudit, DatasetAuditor,
    ResourceOutcome, RowCountSource,
};
pub use config::{
    default_config_path, load_file_config, AuditConfig, CatalogConfig, CounterLimits, FileConfig,
    HttpConfig, ReportConfig,
};
pub use error::AppError;
pub use format::ResourceFormat;
pub use lines::{LimitExceeded, LineTally};
pub use models::{
    DatasetDescriptor, DatasetMetrics, LargeResourceReason, LargeResourceRecord, ResourceDescriptor,
    TabularCounts,
};
pub use outcome::{Probe, RowCount};
pub use size::parse_byte_size;
