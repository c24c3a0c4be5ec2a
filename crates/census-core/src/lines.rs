//! Newline counting over chunked byte input with a hard byte cap.
//!
//! Shared by the streamed delimited-text counter and by the archive counter,
//! which feeds it decompressed entry bytes.

use std::fmt;
use std::io::{self, Read};

use crate::outcome::RowCount;

/// The input grew past the configured cap; no partial count is available.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitExceeded {
    pub max_bytes: u64,
}

impl fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "input exceeds {} bytes", self.max_bytes)
    }
}

impl std::error::Error for LimitExceeded {}

/// Incremental line counter.
///
/// Counts `\n` bytes and treats a non-empty input without a trailing newline
/// as having one more line.
#[derive(Debug, Clone)]
pub struct LineTally {
    max_bytes: u64,
    bytes: u64,
    newlines: u64,
    ends_with_newline: bool,
}

impl LineTally {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            bytes: 0,
            newlines: 0,
            ends_with_newline: true,
        }
    }

    /// Adds a chunk. Fails as soon as the running total passes the cap.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), LimitExceeded> {
        let Some(&last) = chunk.last() else {
            return Ok(());
        };
        self.bytes = self.bytes.saturating_add(chunk.len() as u64);
        if self.bytes > self.max_bytes {
            return Err(LimitExceeded {
                max_bytes: self.max_bytes,
            });
        }
        self.newlines += chunk.iter().filter(|&&b| b == b'\n').count() as u64;
        self.ends_with_newline = last == b'\n';
        Ok(())
    }

    pub fn bytes_read(&self) -> u64 {
        self.bytes
    }

    pub fn finish(self) -> u64 {
        if self.bytes > 0 && !self.ends_with_newline {
            self.newlines + 1
        } else {
            self.newlines
        }
    }
}

/// Counts lines of an in-memory body.
///
/// ```
/// use census_core::{lines::count_lines, RowCount};
///
/// assert_eq!(count_lines(b"a,b\nc,d\n", 1024), RowCount::Counted(2));
/// assert_eq!(count_lines(b"a,b\nc,d", 1024), RowCount::Counted(2));
/// assert_eq!(count_lines(b"", 1024), RowCount::Counted(0));
/// assert_eq!(count_lines(b"a,b\nc,d\n", 4), RowCount::Uncountable);
/// ```
pub fn count_lines(body: &[u8], max_bytes: u64) -> RowCount {
    let mut tally = LineTally::new(max_bytes);
    match tally.feed(body) {
        Ok(()) => RowCount::Counted(tally.finish()),
        Err(_) => RowCount::Uncountable,
    }
}

/// Counts lines from a reader in `chunk_size` reads.
///
/// Returns `Ok(RowCount::Uncountable)` when the reader yields more than
/// `max_bytes`; read errors are propagated.
pub fn count_lines_in_reader<R: Read>(
    mut reader: R,
    max_bytes: u64,
    chunk_size: usize,
) -> io::Result<RowCount> {
    let mut tally = LineTally::new(max_bytes);
    let mut buf = vec![0u8; chunk_size.max(1)];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        if tally.feed(&buf[..n]).is_err() {
            return Ok(RowCount::Uncountable);
        }
    }
    Ok(RowCount::Counted(tally.finish()))
}
