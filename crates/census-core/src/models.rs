//! Domain records exchanged between the catalog, the auditor and the reports.

use std::fmt;

use serde::Serialize;

/// A single file or DataStore table belonging to a dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDescriptor {
    pub id: Option<String>,
    pub url: Option<String>,
    /// True when the catalog can answer `datastore_search` for this resource.
    pub datastore_active: bool,
    /// Lowercased, trimmed format tag; `None` when the catalog left it blank.
    pub format: Option<String>,
}

impl ResourceDescriptor {
    pub fn new(
        id: Option<String>,
        url: Option<String>,
        datastore_active: bool,
        format: Option<&str>,
    ) -> Self {
        Self {
            id: id.filter(|i| !i.trim().is_empty()),
            url: url.filter(|u| !u.trim().is_empty()),
            datastore_active,
            format: normalize_format_tag(format),
        }
    }
}

/// Trims and lowercases a catalog format tag, mapping blanks to `None`.
///
/// ```
/// use census_core::models::normalize_format_tag;
///
/// assert_eq!(normalize_format_tag(Some(" XLSX ")), Some("xlsx".to_string()));
/// assert_eq!(normalize_format_tag(Some("  ")), None);
/// assert_eq!(normalize_format_tag(None), None);
/// ```
pub fn normalize_format_tag(tag: Option<&str>) -> Option<String> {
    tag.map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
}

/// A catalog entry with its resources, in catalog order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetDescriptor {
    pub id: String,
    pub title: String,
    pub resources: Vec<ResourceDescriptor>,
}

/// Row and column counts reported by the DataStore.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TabularCounts {
    pub rows: u64,
    pub columns: u64,
}

/// One line of the metrics report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetMetrics {
    pub dataset_id: String,
    pub dataset_title: String,
    pub n_resources: usize,
    pub rows_total: u64,
}

/// Why a resource was excluded from counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LargeResourceReason {
    /// The HEAD `Content-Length` met the large-resource threshold.
    ContentLengthAtThreshold,
}

impl LargeResourceReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            LargeResourceReason::ContentLengthAtThreshold => "content-length at/above threshold",
        }
    }
}

impl fmt::Display for LargeResourceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the large-resource report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LargeResourceRecord {
    pub dataset_id: String,
    pub dataset_title: String,
    pub resource_id: Option<String>,
    pub url: String,
    pub format: Option<String>,
    pub content_length: u64,
    pub reason: LargeResourceReason,
}
