//! Error types for change feed operations.

use thiserror::Error;

/// Main error type for change feed operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CdcError {
    /// A selector (or wire predicate) was configured inconsistently.
    #[error("Invalid selector configuration: {0}")]
    Configuration(String),

    /// The transport failed while reading from the feed.
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    /// A raw record could not be mapped into a change event.
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// The feed rejected the request.
    #[error("Server error: {0}")]
    Server(String),
}

impl From<serde_json::Error> for CdcError {
    fn from(e: serde_json::Error) -> Self {
        CdcError::Mapping(e.to_string())
    }
}

/// Result type for change feed operations.
pub type Result<T> = std::result::Result<T, CdcError>;
