//! Search error types

use thiserror::Error;

/// Result type alias for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Search-specific error types
#[derive(Error, Debug)]
pub enum SearchError {
    /// The index could not be reached, failed at the transport level, or
    /// did not answer within the gateway timeout
    #[error("Index unavailable: {0}")]
    IndexUnavailable(String),

    /// A mapper produced a document that must not reach the index
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Query error: {0}")]
    Query(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SearchError {
    /// Whether retrying later could succeed
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::IndexUnavailable(_))
    }
}

impl From<quill_core::Error> for SearchError {
    fn from(err: quill_core::Error) -> Self {
        match err {
            quill_core::Error::MalformedDocument(msg) => Self::MalformedDocument(msg),
            quill_core::Error::Serialization(e) => Self::Serialization(e),
            other => Self::InvalidRecord(other.to_string()),
        }
    }
}
