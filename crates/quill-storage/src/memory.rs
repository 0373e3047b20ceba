//! In-memory record store for testing

use crate::error::{StorageError, StorageResult};
use crate::traits::{prepare_for_save, RecordStore};
use async_trait::async_trait;
use quill_core::{EntityKind, Record};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

/// In-memory record store
///
/// Useful for testing and temporary storage.
pub struct MemoryStore {
    records: RwLock<BTreeMap<(EntityKind, i64), Record>>,
    sequences: RwLock<HashMap<EntityKind, i64>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(BTreeMap::new()),
            sequences: RwLock::new(HashMap::new()),
        }
    }

    fn next_id(&self, kind: EntityKind) -> StorageResult<i64> {
        let mut sequences = self
            .sequences
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let seq = sequences.entry(kind).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }

    fn bump_sequence(&self, kind: EntityKind, id: i64) -> StorageResult<()> {
        let mut sequences = self
            .sequences
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        let seq = sequences.entry(kind).or_insert(0);
        *seq = (*seq).max(id);
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(true)
    }

    async fn save(&self, record: Record) -> StorageResult<Record> {
        let kind = record.kind();
        let previous = if record.is_new() {
            None
        } else {
            self.get(kind, record.item_id()).await?
        };

        let record = prepare_for_save(record, previous.as_ref(), || self.next_id(kind))?;
        self.bump_sequence(kind, record.item_id())?;

        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        records.insert((kind, record.item_id()), record.clone());
        Ok(record)
    }

    async fn get(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(records.get(&(kind, item_id)).cloned())
    }

    async fn delete(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(records.remove(&(kind, item_id)))
    }

    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<Record>> {
        let records = self
            .records
            .read()
            .map_err(|e| StorageError::Database(format!("Lock error: {}", e)))?;
        Ok(records
            .range((kind, i64::MIN)..=(kind, i64::MAX))
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Author, Book, Tag};

    #[tokio::test]
    async fn test_keys_are_assigned_per_kind() {
        let store = MemoryStore::new();

        let author = store.save(Record::Author(Author::new("E. B.", "White"))).await.unwrap();
        let tag = store.save(Record::Tag(Tag::new("python"))).await.unwrap();
        let second = store.save(Record::Author(Author::new("Roald", "Dahl"))).await.unwrap();

        assert_eq!(author.item_id(), 1);
        assert_eq!(tag.item_id(), 1);
        assert_eq!(second.item_id(), 2);
        assert_eq!(store.list(EntityKind::Author).await.unwrap().len(), 2);
        assert_eq!(store.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let store = MemoryStore::new();
        let author = match store.save(Record::Author(Author::new("E. B.", "White"))).await.unwrap() {
            Record::Author(a) => a,
            other => panic!("unexpected record {:?}", other),
        };

        let book = store
            .save(Record::Book(Book::new("Charlotte's Web", author.clone())))
            .await
            .unwrap();

        let mut renamed = author;
        renamed.last_name = "Whyte".into();
        store.save(Record::Author(renamed)).await.unwrap();

        let stored = store.get(EntityKind::Author, 1).await.unwrap().unwrap();
        assert_eq!(stored.label(), "Whyte, E. B.");

        let removed = store.delete(EntityKind::Book, book.item_id()).await.unwrap();
        assert!(removed.is_some());
        assert!(store.get(EntityKind::Book, book.item_id()).await.unwrap().is_none());
        assert!(store.delete(EntityKind::Book, book.item_id()).await.unwrap().is_none());
    }
}
