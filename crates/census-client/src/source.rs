use census_core::{
    CountRequest, CounterLimits, Probe, ResourceFormat, RowCount, RowCountSource, TabularCounts,
};
use tracing::debug;

use crate::counter::{exceeds_cap, ArchiveCounter, DelimitedTextCounter, SpreadsheetCounter};
use crate::datastore::DataStoreClient;
use crate::download::BoundedDownloader;
use crate::http::HttpClient;

/// [`RowCountSource`] backed by a live CKAN portal.
#[derive(Debug, Clone)]
pub struct CkanRowCountSource {
    http: HttpClient,
    datastore: DataStoreClient,
    delimited: DelimitedTextCounter,
    spreadsheet: SpreadsheetCounter,
    archive: ArchiveCounter,
    limits: CounterLimits,
}

impl CkanRowCountSource {
    pub fn new(http: HttpClient, datastore: DataStoreClient, limits: CounterLimits) -> Self {
        let downloader = BoundedDownloader::new(http.clone(), limits.chunk_size);
        Self {
            delimited: DelimitedTextCounter::new(http.clone(), limits.chunk_size),
            spreadsheet: SpreadsheetCounter::new(downloader.clone()),
            archive: ArchiveCounter::new(
                downloader,
                limits.archive_entry_max_bytes,
                limits.chunk_size,
            ),
            http,
            datastore,
            limits,
        }
    }

    pub fn limits(&self) -> &CounterLimits {
        &self.limits
    }
}

impl RowCountSource for CkanRowCountSource {
    async fn tabular_counts(&self, resource_id: &str) -> Probe<TabularCounts> {
        self.datastore.row_column_counts(resource_id).await
    }

    async fn content_length(&self, url: &str) -> Probe<u64> {
        self.http.head_content_length(url).await
    }

    async fn count_rows(&self, format: ResourceFormat, request: &CountRequest<'_>) -> RowCount {
        match format {
            ResourceFormat::DelimitedText => {
                self.delimited
                    .count_rows_with_length(
                        request.url,
                        self.limits.csv_max_bytes,
                        request.content_length,
                    )
                    .await
            }
            ResourceFormat::Spreadsheet => {
                let max = self.limits.spreadsheet_max_bytes;
                if exceeds_cap(request.content_length, max) {
                    debug!(
                        "[xlsx] {} exceeds {} bytes, not downloading",
                        request.url, max
                    );
                    return RowCount::Uncountable;
                }
                self.spreadsheet
                    .count_rows(request.url, max, request.format_tag)
                    .await
            }
            ResourceFormat::Archive => {
                let max = self.limits.archive_max_bytes;
                if exceeds_cap(request.content_length, max) {
                    debug!(
                        "[zip] {} exceeds {} bytes, not downloading",
                        request.url, max
                    );
                    return RowCount::Uncountable;
                }
                self.archive
                    .count_rows(request.url, max, request.format_tag)
                    .await
            }
            ResourceFormat::Unrecognized => RowCount::Uncountable,
        }
    }
}
