//! Record store errors
//!
//! Kept apart from search errors: a failing store aborts the write, a
//! failing index never does.

use thiserror::Error;

/// Result type alias for record store operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    /// Connection, lock or backend failure
    #[error("Record store error: {0}")]
    Database(String),

    /// A stored row could not be encoded or decoded
    #[error("Corrupt record: {0}")]
    Serialization(#[from] serde_json::Error),

    #[cfg(feature = "redb")]
    #[error("redb: {0}")]
    Redb(#[from] ::redb::Error),

    #[cfg(feature = "redb")]
    #[error("redb table: {0}")]
    RedbTable(#[from] ::redb::TableError),

    #[cfg(feature = "redb")]
    #[error("redb storage: {0}")]
    RedbStorage(#[from] ::redb::StorageError),

    #[cfg(feature = "redb")]
    #[error("redb commit: {0}")]
    RedbCommit(#[from] ::redb::CommitError),

    #[cfg(feature = "redb")]
    #[error("redb transaction: {0}")]
    RedbTransaction(#[from] ::redb::TransactionError),

    #[cfg(feature = "sqlite")]
    #[error("sqlite: {0}")]
    Sqlite(#[from] ::rusqlite::Error),
}
