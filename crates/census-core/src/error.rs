use thiserror::Error;

/// Application-wide error types.
///
/// This enum represents all errors that can occur while auditing a catalog.
/// Most of them never reach the top level: the counters and the HTTP layer
/// convert them into [`crate::RowCount::Uncountable`] or
/// [`crate::Probe::Unknown`] and the audit moves on to the next resource.
///
/// # Error Conversion
///
/// Some errors automatically convert from their source types using `#[from]`:
/// - `serde_json::Error` → `AppError::SerializationError`
/// - `std::io::Error` → `AppError::Io`
///
/// # Examples
///
/// ```no_run
/// use census_core::error::AppError;
///
/// fn example() -> Result<(), AppError> {
///     Err(AppError::Generic("Something went wrong".to_string()))
/// }
/// ```
#[derive(Error, Debug)]
pub enum AppError {
    /// HTTP client request failed.
    ///
    /// This error occurs when HTTP requests fail due to unexpected statuses
    /// or when a response body cannot be read.
    #[error("API Client error: {0}")]
    ClientError(String),

    /// JSON serialization or deserialization failed.
    ///
    /// This error occurs when a catalog payload does not have the expected shape.
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Filesystem operation failed.
    ///
    /// Raised while writing temporary downloads or appending to reports.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing failed.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Invalid CKAN portal URL provided.
    ///
    /// This error occurs when the provided CKAN portal URL is malformed
    /// or cannot be used to construct valid API endpoints.
    #[error("Invalid CKAN portal URL: {0}")]
    InvalidPortalUrl(String),

    /// The catalog answered with `success: false` or an unexpected result.
    #[error("Unsuccessful catalog response: {0}")]
    UnsuccessfulResponse(String),

    /// Network or connection error.
    ///
    /// This error occurs when a network request fails due to connectivity issues,
    /// DNS resolution failures, or the remote server being unreachable.
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    /// Rate limit exceeded.
    #[error("Rate limit exceeded. Please wait and try again.")]
    RateLimitExceeded,

    /// A downloaded archive could not be read.
    #[error("Archive error: {0}")]
    ArchiveError(String),

    /// A downloaded workbook could not be parsed.
    #[error("Spreadsheet error: {0}")]
    SpreadsheetError(String),

    /// The configuration file is unreadable or malformed.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Appending to a CSV report failed.
    #[error("Report error: {0}")]
    ReportError(String),

    /// Generic application error for cases not covered by specific variants.
    ///
    /// Use this sparingly - prefer creating specific error variants
    /// for better error handling and debugging.
    #[error("Error: {0}")]
    Generic(String),
}

impl AppError {
    /// Returns a user-friendly error message suitable for CLI output.
    pub fn user_message(&self) -> String {
        match self {
            AppError::ClientError(msg) => {
                if msg.contains("timeout") || msg.contains("timed out") {
                    "Request timed out. The portal may be slow or unreachable.\n   Try again later or check the portal URL.".to_string()
                } else if msg.contains("connect") {
                    format!("Cannot connect to portal: {}\n   Check your internet connection and the portal URL.", msg)
                } else {
                    format!("API error: {}", msg)
                }
            }
            AppError::InvalidPortalUrl(url) => {
                format!(
                    "Invalid portal URL: {}\n   Example: https://data.gov.ua",
                    url
                )
            }
            AppError::NetworkError(msg) => {
                format!("Network error: {}\n   Check your internet connection.", msg)
            }
            AppError::Timeout(secs) => {
                format!("Request timed out after {} seconds.\n   The server may be overloaded. Try again later.", secs)
            }
            AppError::RateLimitExceeded => {
                "Too many requests. Increase --delay-ms and try again.".to_string()
            }
            AppError::ConfigError(msg) => {
                format!(
                    "Invalid configuration: {}\n   Check the TOML file passed with --config.",
                    msg
                )
            }
            AppError::ReportError(msg) => {
                format!(
                    "Cannot write report: {}\n   Check the --out and --large-out paths.",
                    msg
                )
            }
            _ => self.to_string(),
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Malformed or unsuccessful catalog payloads are retried like transient
    /// network failures.
    ///
    /// # Examples
    ///
    /// ```
    /// use census_core::error::AppError;
    ///
    /// let err = AppError::NetworkError("connection reset".to_string());
    /// assert!(err.is_retryable());
    ///
    /// let err = AppError::SpreadsheetError("not a workbook".to_string());
    /// assert!(!err.is_retryable());
    /// ```
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::NetworkError(_)
                | AppError::Timeout(_)
                | AppError::RateLimitExceeded
                | AppError::ClientError(_)
                | AppError::UnsuccessfulResponse(_)
                | AppError::SerializationError(_)
        )
    }
}
