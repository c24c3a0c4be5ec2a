use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use census_core::error::AppError;
use census_core::format::workbook_suffix;
use census_core::RowCount;
use tracing::debug;

use crate::download::BoundedDownloader;

/// Counts non-blank rows on the first sheet of a downloaded workbook.
#[derive(Debug, Clone)]
pub struct SpreadsheetCounter {
    downloader: BoundedDownloader,
}

impl SpreadsheetCounter {
    pub fn new(downloader: BoundedDownloader) -> Self {
        Self { downloader }
    }

    /// Downloads the workbook under `max_bytes` and parses it off the async runtime.
    ///
    /// The file is stored with the suffix of its flavour (from the URL, then
    /// the format tag, else `.xlsx`) so the parser can pick a reader.
    pub async fn count_rows(
        &self,
        url: &str,
        max_bytes: u64,
        format_tag: Option<&str>,
    ) -> RowCount {
        let suffix = workbook_suffix(url, format_tag);
        let Some(download) = self.downloader.download(url, max_bytes, &suffix).await else {
            return RowCount::Uncountable;
        };

        let joined = tokio::task::spawn_blocking(move || {
            let counted = count_workbook_rows(download.path());
            (counted, download.release())
        })
        .await;

        match joined {
            Ok((counted, released)) => {
                if let Err(e) = released {
                    debug!("[xlsx] could not remove temporary file: {}", e);
                }
                match counted {
                    Ok(rows) => RowCount::Counted(rows),
                    Err(e) => {
                        debug!("[xlsx] {} from {}", e, url);
                        RowCount::Uncountable
                    }
                }
            }
            Err(e) => {
                debug!("[xlsx] parser task failed for {}: {}", url, e);
                RowCount::Uncountable
            }
        }
    }
}

/// Number of rows on the first sheet with at least one non-blank cell.
pub fn count_workbook_rows(path: &Path) -> Result<u64, AppError> {
    let mut workbook =
        open_workbook_auto(path).map_err(|e| AppError::SpreadsheetError(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| AppError::SpreadsheetError("workbook has no sheets".to_string()))?
        .map_err(|e| AppError::SpreadsheetError(e.to_string()))?;

    let rows = range.rows().filter(|row| is_non_blank_row(row)).count();
    Ok(rows as u64)
}

/// True if any cell holds something other than whitespace.
pub fn is_non_blank_row(row: &[Data]) -> bool {
    row.iter().any(|cell| match cell {
        Data::Empty => false,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => !s.trim().is_empty(),
        _ => true,
    })
}
