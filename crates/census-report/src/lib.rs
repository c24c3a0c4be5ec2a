//! Census Report - append-only CSV sinks for audit results.
//!
//! Two reports are written during a run:
//!
//! - [`MetricsReport`]: one row per dataset
//!   (`dataset_id, dataset_title, n_resources, rows_total`)
//! - [`LargeResourceReport`]: one row per resource gated by the size threshold
//!   (`dataset_id, dataset_title, resource_id, url, format, content_length_bytes, reason`)
//!
//! Files are only ever appended to, so several runs can share one report.

use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use census_core::error::AppError;
use census_core::{DatasetMetrics, LargeResourceRecord};
use tracing::debug;

/// A record with a fixed column layout.
pub trait ReportRow {
    const HEADER: &'static [&'static str];

    fn record(&self) -> Vec<String>;
}

impl ReportRow for DatasetMetrics {
    const HEADER: &'static [&'static str] =
        &["dataset_id", "dataset_title", "n_resources", "rows_total"];

    fn record(&self) -> Vec<String> {
        vec![
            self.dataset_id.clone(),
            self.dataset_title.clone(),
            self.n_resources.to_string(),
            self.rows_total.to_string(),
        ]
    }
}

impl ReportRow for LargeResourceRecord {
    const HEADER: &'static [&'static str] = &[
        "dataset_id",
        "dataset_title",
        "resource_id",
        "url",
        "format",
        "content_length_bytes",
        "reason",
    ];

    fn record(&self) -> Vec<String> {
        vec![
            self.dataset_id.clone(),
            self.dataset_title.clone(),
            self.resource_id.clone().unwrap_or_default(),
            self.url.clone(),
            self.format.clone().unwrap_or_default(),
            self.content_length.to_string(),
            self.reason.as_str().to_string(),
        ]
    }
}

/// Append-only CSV file of `T` rows.
///
/// The header is written when the file is absent or empty; missing parent
/// directories are created.
///
/// # Examples
///
/// ```no_run
/// use census_core::DatasetMetrics;
/// use census_report::MetricsReport;
///
/// # fn example() -> Result<(), census_core::AppError> {
/// let report = MetricsReport::new("out/census_audit.csv");
/// report.append(&[DatasetMetrics {
///     dataset_id: "ds-1".to_string(),
///     dataset_title: "Budget".to_string(),
///     n_resources: 2,
///     rows_total: 450,
/// }])?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CsvReport<T> {
    path: PathBuf,
    _rows: PhantomData<fn(&T)>,
}

pub type MetricsReport = CsvReport<DatasetMetrics>;
pub type LargeResourceReport = CsvReport<LargeResourceRecord>;

impl<T: ReportRow> CsvReport<T> {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _rows: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `rows`. An empty slice still creates the file with its header.
    ///
    /// # Errors
    ///
    /// Returns `AppError::ReportError` if the file cannot be created or written.
    pub fn append(&self, rows: &[T]) -> Result<(), AppError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.error(e))?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.error(e))?;
        let is_empty = file.metadata().map_err(|e| self.error(e))?.len() == 0;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(file);
        if is_empty {
            writer.write_record(T::HEADER).map_err(|e| self.error(e))?;
        }
        for row in rows {
            writer
                .write_record(row.record())
                .map_err(|e| self.error(e))?;
        }
        writer.flush().map_err(|e| self.error(e))?;

        debug!("appended {} rows to {}", rows.len(), self.path.display());
        Ok(())
    }

    fn error(&self, e: impl std::fmt::Display) -> AppError {
        AppError::ReportError(format!("{}: {}", self.path.display(), e))
    }
}
