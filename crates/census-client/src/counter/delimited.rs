use std::fmt;
use std::time::Duration;

use bytes::Bytes;
use census_core::{LineTally, Probe, RowCount};
use futures::Stream;
use tracing::debug;

use super::exceeds_cap;
use crate::http::{next_chunk, HttpClient};

/// Counts lines of a delimited-text resource while streaming it.
///
/// The body is never held in memory as a whole. A body that grows past the
/// cap is `Uncountable`, with no partial count.
#[derive(Debug, Clone)]
pub struct DelimitedTextCounter {
    http: HttpClient,
    chunk_size: usize,
}

impl DelimitedTextCounter {
    pub fn new(http: HttpClient, chunk_size: usize) -> Self {
        Self {
            http,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Probes the size with HEAD, then streams the body.
    pub async fn count_rows(&self, url: &str, max_bytes: u64) -> RowCount {
        let content_length = self.http.head_content_length(url).await;
        self.count_rows_with_length(url, max_bytes, content_length)
            .await
    }

    /// Same as [`Self::count_rows`] for a caller that already probed the size.
    pub async fn count_rows_with_length(
        &self,
        url: &str,
        max_bytes: u64,
        content_length: Probe<u64>,
    ) -> RowCount {
        if exceeds_cap(content_length, max_bytes) {
            debug!("[csv] {} exceeds {} bytes, not downloading", url, max_bytes);
            return RowCount::Uncountable;
        }

        let Some(stream) = self.http.get_stream(url).await else {
            return RowCount::Uncountable;
        };
        let idle = self.http.chunk_timeout();
        count_stream(stream, max_bytes, self.chunk_size, idle).await
    }
}

/// Counts lines in a chunk stream, feeding the tally `chunk_size` bytes at a time.
pub async fn count_stream<S, E>(
    mut stream: S,
    max_bytes: u64,
    chunk_size: usize,
    idle: Duration,
) -> RowCount
where
    S: Stream<Item = Result<Bytes, E>> + Unpin,
    E: fmt::Display,
{
    let mut tally = LineTally::new(max_bytes);
    loop {
        let chunk = match next_chunk(&mut stream, idle).await {
            Ok(Some(chunk)) => chunk,
            Ok(None) => break,
            Err(e) => {
                debug!("[csv] stream aborted: {}", e);
                return RowCount::Uncountable;
            }
        };
        for piece in chunk.chunks(chunk_size.max(1)) {
            if let Err(e) = tally.feed(piece) {
                debug!("[csv] {}", e);
                return RowCount::Uncountable;
            }
        }
    }
    RowCount::Counted(tally.finish())
}
