//! Quill Storage - Relational record stores
//!
//! Stand-ins for the relational layer whose writes drive index
//! synchronization. Every store assigns per-kind integer keys and maintains
//! record timestamps on save.

#![allow(clippy::result_large_err)]

pub mod error;
pub mod memory;
pub mod traits;

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "sqlite")]
pub mod sqlite;

pub use error::{StorageError, StorageResult};
pub use memory::MemoryStore;
pub use traits::RecordStore;

#[cfg(feature = "redb")]
pub use self::redb::RedbStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
