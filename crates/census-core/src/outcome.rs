//! Explicit result types for lookups that may legitimately produce nothing.

/// Result of a best-effort lookup such as a HEAD probe or a DataStore query.
///
/// `Unknown` is not an error: callers proceed without the information.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe<T> {
    Known(T),
    Unknown,
}

impl<T> Probe<T> {
    pub fn known(self) -> Option<T> {
        match self {
            Probe::Known(value) => Some(value),
            Probe::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Probe::Known(_))
    }
}

impl<T> From<Option<T>> for Probe<T> {
    fn from(value: Option<T>) -> Self {
        value.map_or(Probe::Unknown, Probe::Known)
    }
}

/// Result of a file-based row counter.
///
/// `Counted(0)` means the body held no rows; `Uncountable` means the counter
/// could not produce a reliable value (too large, unparseable, unreachable).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowCount {
    Counted(u64),
    Uncountable,
}

impl RowCount {
    /// Returns the count only when it is strictly positive.
    ///
    /// ```
    /// use census_core::RowCount;
    ///
    /// assert_eq!(RowCount::Counted(3).positive(), Some(3));
    /// assert_eq!(RowCount::Counted(0).positive(), None);
    /// assert_eq!(RowCount::Uncountable.positive(), None);
    /// ```
    pub fn positive(self) -> Option<u64> {
        match self {
            RowCount::Counted(rows) if rows > 0 => Some(rows),
            _ => None,
        }
    }
}
