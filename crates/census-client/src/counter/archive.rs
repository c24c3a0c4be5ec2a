use std::fs::File;
use std::path::Path;

use census_core::error::AppError;
use census_core::lines::count_lines_in_reader;
use census_core::RowCount;
use tracing::debug;
use zip::ZipArchive;

use crate::download::BoundedDownloader;

/// Sums line counts over the `.csv` entries of a downloaded zip archive.
#[derive(Debug, Clone)]
pub struct ArchiveCounter {
    downloader: BoundedDownloader,
    entry_max_bytes: u64,
    chunk_size: usize,
}

impl ArchiveCounter {
    pub fn new(downloader: BoundedDownloader, entry_max_bytes: u64, chunk_size: usize) -> Self {
        Self {
            downloader,
            entry_max_bytes,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Downloads the archive under `max_bytes`; each entry is then bounded
    /// separately by the per-entry cap.
    pub async fn count_rows(
        &self,
        url: &str,
        max_bytes: u64,
        format_tag: Option<&str>,
    ) -> RowCount {
        let Some(download) = self.downloader.download(url, max_bytes, ".zip").await else {
            debug!("[zip] no archive from {} (format {:?})", url, format_tag);
            return RowCount::Uncountable;
        };

        let entry_max = self.entry_max_bytes;
        let chunk_size = self.chunk_size;
        let joined = tokio::task::spawn_blocking(move || {
            let counted = count_archive_rows(download.path(), entry_max, chunk_size);
            (counted, download.release())
        })
        .await;

        match joined {
            Ok((counted, released)) => {
                if let Err(e) = released {
                    debug!("[zip] could not remove temporary file: {}", e);
                }
                counted.unwrap_or_else(|e| {
                    debug!("[zip] {} from {}", e, url);
                    RowCount::Uncountable
                })
            }
            Err(e) => {
                debug!("[zip] reader task failed for {}: {}", url, e);
                RowCount::Uncountable
            }
        }
    }
}

/// Counts lines across the delimited-text entries of the archive at `path`.
///
/// Entries that cannot be read or exceed `entry_max_bytes` are left out. A
/// total of zero, including an archive with no `.csv` entries, is `Uncountable`.
pub fn count_archive_rows(
    path: &Path,
    entry_max_bytes: u64,
    chunk_size: usize,
) -> Result<RowCount, AppError> {
    let file = File::open(path)?;
    let mut archive = ZipArchive::new(file).map_err(|e| AppError::ArchiveError(e.to_string()))?;

    let mut total: u64 = 0;
    for index in 0..archive.len() {
        let entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                debug!("[zip] skipping entry {}: {}", index, e);
                continue;
            }
        };
        if entry.is_dir() || !entry.name().to_lowercase().ends_with(".csv") {
            continue;
        }

        let name = entry.name().to_string();
        match count_lines_in_reader(entry, entry_max_bytes, chunk_size) {
            Ok(RowCount::Counted(rows)) => {
                debug!("[zip] {} rows={}", name, rows);
                total = total.saturating_add(rows);
            }
            Ok(RowCount::Uncountable) => {
                debug!("[zip] {} exceeds {} bytes, excluded", name, entry_max_bytes);
            }
            Err(e) => debug!("[zip] {} unreadable: {}", name, e),
        }
    }

    Ok(if total > 0 {
        RowCount::Counted(total)
    } else {
        RowCount::Uncountable
    })
}
