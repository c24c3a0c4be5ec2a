use anyhow::{anyhow, Context};
use clap::Parser;
use dotenvy::dotenv;
use futures::StreamExt;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use census_cli::{Config, Settings};
use census_client::{CatalogWalker, CkanClient, CkanRowCountSource, DataStoreClient, HttpClient};
use census_core::{load_file_config, AuditStats, DatasetAuditor, FileConfig};
use census_report::{LargeResourceReport, MetricsReport};

/// Datasets between two progress lines.
const PROGRESS_EVERY: usize = 200;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    dotenv().ok();

    let config = Config::parse();
    let file = match config.config_path() {
        Some(path) => load_file_config(&path).map_err(|e| anyhow!(e.user_message()))?,
        None => FileConfig::default(),
    };
    let settings = config.resolve(&file);

    // Logs go to stderr; per-resource decisions only with --verbose
    let subscriber = FmtSubscriber::builder()
        .with_max_level(if settings.verbose {
            Level::DEBUG
        } else {
            Level::INFO
        })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set the default tracing subscriber")?;

    audit(settings).await
}

/// Walks the portal, audits every dataset and appends both reports.
async fn audit(settings: Settings) -> anyhow::Result<()> {
    info!("Starting audit for: {}", settings.portal_url);

    let http = HttpClient::new(settings.http.clone()).context("Failed to build HTTP client")?;
    let ckan = CkanClient::new(&settings.portal_url, http.clone())
        .map_err(|e| anyhow!(e.user_message()))?;
    let datastore = DataStoreClient::new(http.clone(), ckan.action_base(), settings.catalog.delay)
        .context("Invalid DataStore endpoint")?;
    let source = CkanRowCountSource::new(http, datastore, settings.limits);
    let auditor = DatasetAuditor::new(source, settings.audit.clone());

    let metrics_report = MetricsReport::new(&settings.report.metrics_path);
    let large_report = LargeResourceReport::new(&settings.report.large_resources_path);
    // Create both files with their headers even if nothing gets appended
    metrics_report
        .append(&[])
        .map_err(|e| anyhow!(e.user_message()))?;
    large_report
        .append(&[])
        .map_err(|e| anyhow!(e.user_message()))?;

    info!(
        "Aggregation: {}, large-resource threshold: {} bytes, concurrency: {}",
        settings.audit.aggregation, settings.audit.large_threshold, settings.audit.concurrency
    );

    let walker = CatalogWalker::new(ckan, settings.catalog.clone());
    let auditor = &auditor;
    let mut audits = std::pin::pin!(walker
        .into_stream()
        .map(|dataset| async move { auditor.audit_dataset(&dataset).await })
        .buffer_unordered(settings.audit.concurrency));

    let mut stats = AuditStats::new();
    while let Some(audit) = audits.next().await {
        metrics_report
            .append(std::slice::from_ref(&audit.metrics))
            .context("Failed to append dataset metrics")?;
        if !audit.large_resources.is_empty() {
            large_report
                .append(&audit.large_resources)
                .context("Failed to append large resources")?;
        }
        stats.record(&audit);

        if stats.datasets % PROGRESS_EVERY == 0 {
            info!(
                "Processed {} datasets ({} with rows, {} resources)",
                stats.datasets, stats.datasets_with_rows, stats.resources
            );
        }
    }

    log_summary(&stats, &settings);
    Ok(())
}

fn log_summary(stats: &AuditStats, settings: &Settings) {
    info!(
        "Audit complete: {} datasets, {} with rows, {} with zero rows",
        stats.datasets,
        stats.datasets_with_rows,
        stats.zero_row_datasets()
    );
    info!(
        "Resources: {} total, {} counted (datastore {}, csv {}, spreadsheet {}, archive {})",
        stats.resources,
        stats.counted_resources(),
        stats.tabular,
        stats.counted_csv,
        stats.counted_spreadsheet,
        stats.counted_archive
    );
    info!(
        "Not counted: {} large, {} uncountable, {} datastore failures, {} without source",
        stats.gated, stats.uncounted, stats.tabular_unavailable, stats.no_source
    );
    info!(
        "Reports: {} and {}",
        settings.report.metrics_path.display(),
        settings.report.large_resources_path.display()
    );
}
