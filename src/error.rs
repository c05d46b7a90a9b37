//! Custom error types for rustscholar.
//!
//! Parse misses inside a result page are not errors: a block without a
//! title is dropped and a malformed count keeps its default. Everything
//! here is fatal for the call that produced it.

use std::time::Duration;
use thiserror::Error;

/// Main error type for rustscholar operations.
#[derive(Debug, Error)]
pub enum ScholarError {
    /// Network/HTTP transport error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The origin answered with a non-success status
    #[error("HTTP error: {status} for {url}")]
    Http {
        /// Status code returned by the origin
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Parser construction error or malformed bibliography text
    #[error("Parse error: {0}")]
    Parse(String),

    /// Delimited-text rendering error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// The cancellation token was tripped between two round trips
    #[error("Query cancelled")]
    Cancelled,

    /// The caller's deadline elapsed before the work finished
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// A spawned worker task panicked or was aborted
    #[error("Worker error: {0}")]
    Worker(String),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias using `ScholarError`
pub type Result<T> = std::result::Result<T, ScholarError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ScholarError::Parse(msg.to_string()))
    }
}
