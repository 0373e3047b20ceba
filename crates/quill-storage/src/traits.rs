//! Record store trait definitions

use crate::error::StorageResult;
use async_trait::async_trait;
use chrono::Utc;
use quill_core::{EntityKind, Record};

/// Trait for relational record stores
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Initialize the store (create tables, etc.)
    async fn initialize(&self) -> StorageResult<()>;

    /// Health check
    async fn health_check(&self) -> StorageResult<bool>;

    /// Insert or update a record.
    ///
    /// A new record (key <= 0) receives the next key for its kind. The
    /// returned record is the committed post-write state.
    async fn save(&self, record: Record) -> StorageResult<Record>;

    /// Get a record by kind and key
    async fn get(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>>;

    /// Delete a record, returning it if it existed
    async fn delete(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>>;

    /// All records of one kind, ordered by key
    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<Record>>;

    /// All records of every kind
    async fn list_all(&self) -> StorageResult<Vec<Record>> {
        let mut records = Vec::new();
        for kind in EntityKind::ALL {
            records.extend(self.list(kind).await?);
        }
        Ok(records)
    }
}

/// Assign a key to a new record and refresh its timestamps.
///
/// `next_id` is only called for new records.
pub(crate) fn prepare_for_save(
    mut record: Record,
    previous: Option<&Record>,
    next_id: impl FnOnce() -> StorageResult<i64>,
) -> StorageResult<Record> {
    record.touch(Utc::now(), previous);
    if record.is_new() {
        let id = next_id()?;
        record.set_item_id(id);
        tracing::debug!(kind = %record.kind(), item_id = id, "Assigned key to new record");
    }
    Ok(record)
}
