//! File-based row counters, one per recognized resource format.
//!
//! Counters never fail. Anything that prevents a reliable count (a body over
//! its cap, a parse error, an unreachable URL) is [`RowCount::Uncountable`].
//!
//! [`RowCount::Uncountable`]: census_core::RowCount::Uncountable

pub mod archive;
pub mod delimited;
pub mod spreadsheet;

pub use archive::ArchiveCounter;
pub use delimited::DelimitedTextCounter;
pub use spreadsheet::SpreadsheetCounter;

use census_core::Probe;

/// True when a known `Content-Length` already rules out a download.
pub(crate) fn exceeds_cap(content_length: Probe<u64>, max_bytes: u64) -> bool {
    matches!(content_length, Probe::Known(len) if len > max_bytes)
}
