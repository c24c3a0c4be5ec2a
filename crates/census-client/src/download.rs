//! Size-capped downloads into temporary files.

use std::path::Path;

use census_core::error::AppError;
use tempfile::{Builder, NamedTempFile};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::debug;

use crate::http::{next_chunk, HttpClient};

/// A downloaded resource on local disk. The file is removed on drop.
#[derive(Debug)]
pub struct TempDownload {
    file: NamedTempFile,
    bytes: u64,
}

impl TempDownload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Bytes written to disk.
    pub fn len(&self) -> u64 {
        self.bytes
    }

    pub fn is_empty(&self) -> bool {
        self.bytes == 0
    }

    /// Removes the file now and reports any failure to do so.
    pub fn release(self) -> Result<(), AppError> {
        self.file.close().map_err(AppError::from)
    }
}

/// Streams resources to disk, giving up as soon as a body would pass the cap.
#[derive(Debug, Clone)]
pub struct BoundedDownloader {
    http: HttpClient,
    chunk_size: usize,
}

impl BoundedDownloader {
    pub fn new(http: HttpClient, chunk_size: usize) -> Self {
        Self {
            http,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Downloads `url` into a temporary file named with `suffix`.
    ///
    /// Returns `None` when the request fails, the body stalls, or the body
    /// grows past `max_bytes`. No partial file survives any of those.
    pub async fn download(&self, url: &str, max_bytes: u64, suffix: &str) -> Option<TempDownload> {
        match self.try_download(url, max_bytes, suffix).await {
            Ok(Some(download)) => Some(download),
            Ok(None) => {
                debug!("download of {} exceeds {} bytes", url, max_bytes);
                None
            }
            Err(e) => {
                debug!("download of {} failed: {}", url, e);
                None
            }
        }
    }

    async fn try_download(
        &self,
        url: &str,
        max_bytes: u64,
        suffix: &str,
    ) -> Result<Option<TempDownload>, AppError> {
        let Some(mut stream) = self.http.get_stream(url).await else {
            let message = format!("no response body from {}", url);
            return Err(AppError::ClientError(message));
        };

        let file = Builder::new().prefix("census-").suffix(suffix).tempfile()?;
        let handle = tokio::fs::File::from_std(file.as_file().try_clone()?);
        let mut writer = BufWriter::with_capacity(self.chunk_size, handle);
        let mut written: u64 = 0;

        while let Some(chunk) = next_chunk(&mut stream, self.http.chunk_timeout()).await? {
            let next = written.saturating_add(chunk.len() as u64);
            if next > max_bytes {
                return Ok(None);
            }
            writer.write_all(&chunk).await?;
            written = next;
        }
        writer.flush().await?;

        Ok(Some(TempDownload {
            file,
            bytes: written,
        }))
    }
}
