//! Per-dataset row-count auditing.
//!
//! This module holds the fallback chain and aggregation policy, decoupled from
//! HTTP: the auditor talks to a [`RowCountSource`], which the client crate
//! implements on top of the catalog, the DataStore and the file counters.

use std::fmt;
use std::future::Future;

use serde::Deserialize;
use tracing::debug;

use crate::config::AuditConfig;
use crate::format::ResourceFormat;
use crate::models::{
    DatasetDescriptor, DatasetMetrics, LargeResourceReason, LargeResourceRecord, ResourceDescriptor,
    TabularCounts,
};
use crate::outcome::{Probe, RowCount};

/// What a file counter needs to know about a resource.
#[derive(Debug, Clone, Copy)]
pub struct CountRequest<'a> {
    pub url: &'a str,
    pub format_tag: Option<&'a str>,
    /// Result of the HEAD probe the auditor already made.
    pub content_length: Probe<u64>,
}

/// The signals the auditor combines.
///
/// None of these methods fail: network and parse problems surface as
/// [`Probe::Unknown`] or [`RowCount::Uncountable`].
pub trait RowCountSource {
    /// Authoritative DataStore counts for a server-indexed resource.
    fn tabular_counts(&self, resource_id: &str) -> impl Future<Output = Probe<TabularCounts>>;

    /// HEAD `Content-Length` of a resource URL.
    fn content_length(&self, url: &str) -> impl Future<Output = Probe<u64>>;

    /// Runs the counter for `format` against the resource.
    fn count_rows(
        &self,
        format: ResourceFormat,
        request: &CountRequest<'_>,
    ) -> impl Future<Output = RowCount>;
}

/// How per-resource counts combine into a dataset total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationPolicy {
    /// Largest resource wins; republished copies of a table are not double-counted.
    #[default]
    Max,
    Sum,
}

impl fmt::Display for AggregationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AggregationPolicy::Max => f.write_str("max"),
            AggregationPolicy::Sum => f.write_str("sum"),
        }
    }
}

/// Combines contributing counts; 0 when nothing contributed.
///
/// ```
/// use census_core::{aggregate_rows, AggregationPolicy};
///
/// assert_eq!(aggregate_rows(AggregationPolicy::Max, &[120, 450, 450]), 450);
/// assert_eq!(aggregate_rows(AggregationPolicy::Sum, &[120, 450, 450]), 1020);
/// assert_eq!(aggregate_rows(AggregationPolicy::Max, &[]), 0);
/// ```
pub fn aggregate_rows(policy: AggregationPolicy, counts: &[u64]) -> u64 {
    match policy {
        AggregationPolicy::Max => counts.iter().copied().max().unwrap_or(0),
        AggregationPolicy::Sum => counts.iter().fold(0u64, |acc, c| acc.saturating_add(*c)),
    }
}

/// Terminal state of one resource in the fallback chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceOutcome {
    /// DataStore answered.
    Tabular(TabularCounts),
    /// Server-indexed, but the DataStore lookup failed. No file fallback.
    TabularUnavailable,
    /// A file counter produced a positive count.
    Counted { format: ResourceFormat, rows: u64 },
    /// Gated by the large-resource threshold before any counter ran.
    Gated { content_length: u64 },
    /// Had a URL but no counter produced a positive count.
    Uncounted,
    /// Neither server-indexed nor downloadable.
    NoSource,
}

impl ResourceOutcome {
    /// The row contribution of this resource, if any.
    pub fn rows(&self) -> Option<u64> {
        match self {
            ResourceOutcome::Tabular(counts) => Some(counts.rows),
            ResourceOutcome::Counted { rows, .. } => Some(*rows),
            _ => None,
        }
    }
}

/// Everything learned about one dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetAudit {
    pub metrics: DatasetMetrics,
    /// One entry per resource, in catalog order.
    pub outcomes: Vec<ResourceOutcome>,
    pub large_resources: Vec<LargeResourceRecord>,
}

/// Runs the fallback chain over every resource of a dataset.
#[derive(Debug)]
pub struct DatasetAuditor<S> {
    source: S,
    config: AuditConfig,
}

impl<S: RowCountSource> DatasetAuditor<S> {
    pub fn new(source: S, config: AuditConfig) -> Self {
        Self { source, config }
    }

    pub fn config(&self) -> &AuditConfig {
        &self.config
    }

    /// Audits one dataset. Never fails; the worst case for a resource is
    /// contributing nothing.
    pub async fn audit_dataset(&self, dataset: &DatasetDescriptor) -> DatasetAudit {
        let mut outcomes = Vec::with_capacity(dataset.resources.len());
        let mut large_resources = Vec::new();

        for resource in &dataset.resources {
            let outcome = self.audit_resource(resource).await;
            if let ResourceOutcome::Gated { content_length } = outcome {
                large_resources.push(LargeResourceRecord {
                    dataset_id: dataset.id.clone(),
                    dataset_title: dataset.title.clone(),
                    resource_id: resource.id.clone(),
                    url: resource.url.clone().unwrap_or_default(),
                    format: resource.format.clone(),
                    content_length,
                    reason: LargeResourceReason::ContentLengthAtThreshold,
                });
            }
            outcomes.push(outcome);
        }

        let counts: Vec<u64> = outcomes.iter().filter_map(ResourceOutcome::rows).collect();
        let rows_total = aggregate_rows(self.config.aggregation, &counts);

        debug!(
            "[dataset-total] {} ({}) rows_total({})={}",
            dataset.title, dataset.id, self.config.aggregation, rows_total
        );
        if rows_total == 0 {
            debug!(
                "[dataset-zero] {} ({}) has 0 rows after all fallbacks",
                dataset.title, dataset.id
            );
        }

        DatasetAudit {
            metrics: DatasetMetrics {
                dataset_id: dataset.id.clone(),
                dataset_title: dataset.title.clone(),
                n_resources: dataset.resources.len(),
                rows_total,
            },
            outcomes,
            large_resources,
        }
    }

    async fn audit_resource(&self, resource: &ResourceDescriptor) -> ResourceOutcome {
        debug!(
            "[res] datastore_active={} id={:?} url={:?}",
            resource.datastore_active, resource.id, resource.url
        );

        if resource.datastore_active {
            if let Some(id) = resource.id.as_deref() {
                return match self.source.tabular_counts(id).await {
                    Probe::Known(counts) => {
                        debug!(
                            "[datastore] rows={} cols={} for resource {}",
                            counts.rows, counts.columns, id
                        );
                        ResourceOutcome::Tabular(counts)
                    }
                    Probe::Unknown => {
                        debug!("[datastore] no rows/failed for resource {}", id);
                        ResourceOutcome::TabularUnavailable
                    }
                };
            }
        }

        let Some(url) = resource.url.as_deref() else {
            return ResourceOutcome::NoSource;
        };

        let content_length = self.source.content_length(url).await;
        if let Probe::Known(bytes) = content_length {
            if bytes >= self.config.large_threshold {
                debug!(
                    "[large] skip resource {:?} size={} bytes url={}",
                    resource.id, bytes, url
                );
                return ResourceOutcome::Gated {
                    content_length: bytes,
                };
            }
        }

        let request = CountRequest {
            url,
            format_tag: resource.format.as_deref(),
            content_length,
        };
        for format in ResourceFormat::counters_for(url, request.format_tag) {
            if let Some(rows) = self.source.count_rows(format, &request).await.positive() {
                debug!("[fallback-{}] rows={} from {}", format, rows, url);
                return ResourceOutcome::Counted { format, rows };
            }
        }

        debug!("[fallback] no count for url={}", url);
        ResourceOutcome::Uncounted
    }
}

/// Running totals for an audit run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AuditStats {
    pub datasets: usize,
    pub datasets_with_rows: usize,
    pub resources: usize,
    pub tabular: usize,
    pub tabular_unavailable: usize,
    pub counted_csv: usize,
    pub counted_spreadsheet: usize,
    pub counted_archive: usize,
    pub gated: usize,
    pub uncounted: usize,
    pub no_source: usize,
}

impl AuditStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, audit: &DatasetAudit) {
        self.datasets += 1;
        if audit.metrics.rows_total > 0 {
            self.datasets_with_rows += 1;
        }
        for outcome in &audit.outcomes {
            self.resources += 1;
            match outcome {
                ResourceOutcome::Tabular(_) => self.tabular += 1,
                ResourceOutcome::TabularUnavailable => self.tabular_unavailable += 1,
                ResourceOutcome::Counted { format, .. } => match format {
                    ResourceFormat::DelimitedText => self.counted_csv += 1,
                    ResourceFormat::Spreadsheet => self.counted_spreadsheet += 1,
                    ResourceFormat::Archive => self.counted_archive += 1,
                    ResourceFormat::Unrecognized => self.uncounted += 1,
                },
                ResourceOutcome::Gated { .. } => self.gated += 1,
                ResourceOutcome::Uncounted => self.uncounted += 1,
                ResourceOutcome::NoSource => self.no_source += 1,
            }
        }
    }

    pub fn zero_row_datasets(&self) -> usize {
        self.datasets - self.datasets_with_rows
    }

    /// Resources that contributed a row count.
    pub fn counted_resources(&self) -> usize {
        self.tabular + self.counted_csv + self.counted_spreadsheet + self.counted_archive
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MockSource {
        tabular: HashMap<String, TabularCounts>,
        lengths: HashMap<String, u64>,
        counts: HashMap<(ResourceFormat, String), RowCount>,
        calls: Mutex<Vec<String>>,
    }

    impl MockSource {
        fn with_tabular(mut self, id: &str, rows: u64) -> Self {
            self.tabular
                .insert(id.to_string(), TabularCounts { rows, columns: 3 });
            self
        }

        fn with_length(mut self, url: &str, bytes: u64) -> Self {
            self.lengths.insert(url.to_string(), bytes);
            self
        }

        fn with_count(mut self, format: ResourceFormat, url: &str, count: RowCount) -> Self {
            self.counts.insert((format, url.to_string()), count);
            self
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn counter_calls(&self) -> Vec<String> {
            self.calls()
                .into_iter()
                .filter(|c| c.starts_with("count:"))
                .collect()
        }
    }

    impl RowCountSource for MockSource {
        async fn tabular_counts(&self, resource_id: &str) -> Probe<TabularCounts> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("tabular:{resource_id}"));
            self.tabular.get(resource_id).copied().into()
        }

        async fn content_length(&self, url: &str) -> Probe<u64> {
            self.calls.lock().unwrap().push(format!("head:{url}"));
            self.lengths.get(url).copied().into()
        }

        async fn count_rows(&self, format: ResourceFormat, request: &CountRequest<'_>) -> RowCount {
            self.calls
                .lock()
                .unwrap()
                .push(format!("count:{}:{}", format, request.url));
            self.counts
                .get(&(format, request.url.to_string()))
                .copied()
                .unwrap_or(RowCount::Uncountable)
        }
    }

    fn resource(
        id: &str,
        url: Option<&str>,
        datastore_active: bool,
        tag: Option<&str>,
    ) -> ResourceDescriptor {
        ResourceDescriptor::new(
            Some(id.to_string()),
            url.map(String::from),
            datastore_active,
            tag,
        )
    }

    fn dataset(resources: Vec<ResourceDescriptor>) -> DatasetDescriptor {
        DatasetDescriptor {
            id: "ds-1".to_string(),
            title: "Budget".to_string(),
            resources,
        }
    }

    fn auditor(source: MockSource) -> DatasetAuditor<MockSource> {
        DatasetAuditor::new(source, AuditConfig::default())
    }

    #[tokio::test]
    async fn test_server_indexed_never_reaches_file_counters() {
        let url = "https://x.org/table.csv";
        let source = MockSource::default()
            .with_tabular("r1", 42)
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(99));
        let auditor = auditor(source);

        let audit = auditor
            .audit_dataset(&dataset(vec![resource("r1", Some(url), true, Some("csv"))]))
            .await;

        assert_eq!(audit.metrics.rows_total, 42);
        assert_eq!(auditor.source.calls(), vec!["tabular:r1".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_tabular_lookup_contributes_nothing() {
        let url = "https://x.org/table.csv";
        let source = MockSource::default()
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(99));
        let auditor = auditor(source);

        let audit = auditor
            .audit_dataset(&dataset(vec![resource("r1", Some(url), true, None)]))
            .await;

        assert_eq!(audit.metrics.rows_total, 0);
        assert_eq!(audit.outcomes, vec![ResourceOutcome::TabularUnavailable]);
        assert!(auditor.source.counter_calls().is_empty());
    }

    #[tokio::test]
    async fn test_datastore_flag_without_id_uses_url() {
        let url = "https://x.org/table.csv";
        let source = MockSource::default()
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(7));
        let auditor = auditor(source);
        let res = ResourceDescriptor::new(None, Some(url.to_string()), true, None);

        let audit = auditor.audit_dataset(&dataset(vec![res])).await;

        assert_eq!(audit.metrics.rows_total, 7);
    }

    #[tokio::test]
    async fn test_blank_id_uses_url() {
        let url = "https://x.org/table.csv";
        let source = MockSource::default()
            .with_tabular("", 40)
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(7));
        let auditor = auditor(source);

        let audit = auditor
            .audit_dataset(&dataset(vec![resource("", Some(url), true, None)]))
            .await;

        assert_eq!(audit.metrics.rows_total, 7);
        let calls = auditor.source.calls();
        assert!(calls.iter().all(|c| !c.starts_with("tabular:")));
    }

    #[tokio::test]
    async fn test_large_resource_is_gated_before_counters() {
        let url = "https://x.org/huge.csv";
        let source = MockSource::default()
            .with_length(url, 512 * 1024 * 1024)
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(10));
        let auditor = auditor(source);

        let ds = dataset(vec![resource("r1", Some(url), false, Some("csv"))]);
        let audit = auditor.audit_dataset(&ds).await;

        assert_eq!(audit.metrics.rows_total, 0);
        assert_eq!(audit.large_resources.len(), 1);
        let record = &audit.large_resources[0];
        assert_eq!(record.reason.as_str(), "content-length at/above threshold");
        assert_eq!(record.content_length, 536_870_912);
        assert_eq!(record.resource_id.as_deref(), Some("r1"));
        assert_eq!(record.format.as_deref(), Some("csv"));
        assert!(auditor.source.counter_calls().is_empty());
    }

    #[tokio::test]
    async fn test_just_below_threshold_is_counted() {
        let url = "https://x.org/big.csv";
        let source = MockSource::default()
            .with_length(url, 512 * 1024 * 1024 - 1)
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(10));
        let auditor = auditor(source);

        let audit = auditor
            .audit_dataset(&dataset(vec![resource("r1", Some(url), false, None)]))
            .await;

        assert_eq!(audit.metrics.rows_total, 10);
        assert!(audit.large_resources.is_empty());
    }

    #[tokio::test]
    async fn test_zero_falls_through_to_next_counter() {
        let url = "https://x.org/export.csv";
        let source = MockSource::default()
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(0))
            .with_count(ResourceFormat::Spreadsheet, url, RowCount::Counted(12))
            .with_count(ResourceFormat::Archive, url, RowCount::Counted(50));
        let auditor = auditor(source);

        let ds = dataset(vec![resource("r1", Some(url), false, Some("xlsx"))]);
        let audit = auditor.audit_dataset(&ds).await;

        assert_eq!(
            audit.outcomes,
            vec![ResourceOutcome::Counted {
                format: ResourceFormat::Spreadsheet,
                rows: 12,
            }]
        );
        assert_eq!(
            auditor.source.counter_calls(),
            vec![
                format!("count:csv:{url}"),
                format!("count:spreadsheet:{url}")
            ]
        );
    }

    #[tokio::test]
    async fn test_uncountable_everywhere_contributes_nothing() {
        let url = "https://x.org/archive.zip";
        let auditor = auditor(MockSource::default());

        let audit = auditor
            .audit_dataset(&dataset(vec![
                resource("r1", Some(url), false, None),
                resource("r2", None, false, None),
            ]))
            .await;

        assert_eq!(audit.metrics.rows_total, 0);
        assert_eq!(audit.metrics.n_resources, 2);
        assert_eq!(
            audit.outcomes,
            vec![ResourceOutcome::Uncounted, ResourceOutcome::NoSource]
        );
    }

    #[tokio::test]
    async fn test_dataset_total_is_max_of_resources() {
        let source = MockSource::default()
            .with_tabular("r1", 120)
            .with_tabular("r2", 450)
            .with_count(
                ResourceFormat::DelimitedText,
                "https://x.org/copy.csv",
                RowCount::Counted(450),
            );
        let auditor = auditor(source);

        let audit = auditor
            .audit_dataset(&dataset(vec![
                resource("r1", None, true, None),
                resource("r2", None, true, None),
                resource("r3", Some("https://x.org/copy.csv"), false, None),
            ]))
            .await;

        assert_eq!(audit.metrics.rows_total, 450);
    }

    #[tokio::test]
    async fn test_sum_policy() {
        let source = MockSource::default()
            .with_tabular("r1", 120)
            .with_tabular("r2", 450);
        let config = AuditConfig {
            aggregation: AggregationPolicy::Sum,
            ..AuditConfig::default()
        };
        let auditor = DatasetAuditor::new(source, config);

        let audit = auditor
            .audit_dataset(&dataset(vec![
                resource("r1", None, true, None),
                resource("r2", None, true, None),
            ]))
            .await;

        assert_eq!(audit.metrics.rows_total, 570);
    }

    #[tokio::test]
    async fn test_reaudit_is_idempotent() {
        let url = "https://x.org/a.csv";
        let source = MockSource::default()
            .with_tabular("r1", 5)
            .with_count(ResourceFormat::DelimitedText, url, RowCount::Counted(9));
        let auditor = auditor(source);
        let ds = dataset(vec![
            resource("r1", None, true, None),
            resource("r2", Some(url), false, None),
        ]);

        let first = auditor.audit_dataset(&ds).await;
        let second = auditor.audit_dataset(&ds).await;

        assert_eq!(first, second);
        assert_eq!(first.metrics.rows_total, 9);
    }

    #[tokio::test]
    async fn test_empty_dataset() {
        let auditor = auditor(MockSource::default());
        let audit = auditor.audit_dataset(&dataset(vec![])).await;
        assert_eq!(audit.metrics.rows_total, 0);
        assert_eq!(audit.metrics.n_resources, 0);
        assert!(auditor.source.calls().is_empty());
    }

    #[test]
    fn test_aggregation_policy_deserialize() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: AggregationPolicy,
        }
        let w: Wrapper = serde_json::from_str(r#"{"policy": "sum"}"#).unwrap();
        assert_eq!(w.policy, AggregationPolicy::Sum);
        assert_eq!(AggregationPolicy::default(), AggregationPolicy::Max);
    }

    #[test]
    fn test_audit_stats_record() {
        let mut stats = AuditStats::new();
        stats.record(&DatasetAudit {
            metrics: DatasetMetrics {
                dataset_id: "a".into(),
                dataset_title: "A".into(),
                n_resources: 4,
                rows_total: 10,
            },
            outcomes: vec![
                ResourceOutcome::Tabular(TabularCounts {
                    rows: 10,
                    columns: 2,
                }),
                ResourceOutcome::Counted {
                    format: ResourceFormat::Archive,
                    rows: 3,
                },
                ResourceOutcome::Gated { content_length: 1 },
                ResourceOutcome::NoSource,
            ],
            large_resources: vec![],
        });
        stats.record(&DatasetAudit {
            metrics: DatasetMetrics {
                dataset_id: "b".into(),
                dataset_title: "B".into(),
                n_resources: 1,
                rows_total: 0,
            },
            outcomes: vec![ResourceOutcome::Uncounted],
            large_resources: vec![],
        });

        assert_eq!(stats.datasets, 2);
        assert_eq!(stats.datasets_with_rows, 1);
        assert_eq!(stats.zero_row_datasets(), 1);
        assert_eq!(stats.resources, 5);
        assert_eq!(stats.counted_resources(), 2);
        assert_eq!(stats.gated, 1);
        assert_eq!(stats.uncounted, 1);
        assert_eq!(stats.no_source, 1);
    }
}
