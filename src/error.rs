//! Custom error types for pharmapapers.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, FetcherError>` instead of using `unwrap()`.

use thiserror::Error;

/// Main error type for pharmapapers operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum FetcherError {
    /// Network/HTTP request error (timeout, connection reset)
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Query rejected by the API or invalid before sending
    #[error("Query error: {0}")]
    Query(String),

    /// Response body could not be parsed (JSON or XML)
    #[error("Parse error: {0}")]
    Parse(String),

    /// A single record could not be extracted
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// Error code from API
        code: i32,
        /// Error message from API
        message: String,
    },

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV output error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),
}

impl FetcherError {
    /// Whether retrying the same call could plausibly succeed.
    ///
    /// Query and config errors are terminal; timeouts, rate limits and
    /// server-side failures are worth another attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            FetcherError::Network(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FetcherError::RateLimited(_) => true,
            FetcherError::Api { code, .. } => *code >= 500 || *code == 429,
            _ => false,
        }
    }
}

/// Result type alias using `FetcherError`
pub type Result<T> = std::result::Result<T, FetcherError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| FetcherError::Parse(msg.to_string()))
    }
}
