//! Error types for Quill Core

use thiserror::Error;

use crate::model::EntityKind;

/// Result type alias using Quill's core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Quill core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Malformed document: {0}")]
    MalformedDocument(String),

    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    #[error("Record kind mismatch: expected {expected}, got {actual}")]
    KindMismatch {
        expected: EntityKind,
        actual: EntityKind,
    },

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
