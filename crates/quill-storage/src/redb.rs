//! ReDB record store

use crate::error::{StorageError, StorageResult};
use crate::traits::{prepare_for_save, RecordStore};
use async_trait::async_trait;
use quill_core::{EntityKind, Record};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Mutex;

// Table definitions
const RECORDS: TableDefinition<&str, &[u8]> = TableDefinition::new("records");
const SEQUENCES: TableDefinition<&str, i64> = TableDefinition::new("sequences");

/// ReDB record store
pub struct RedbStore {
    db: Mutex<Database>,
}

impl RedbStore {
    /// Open or create a ReDB database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let db = Database::create(path).map_err(|e| StorageError::Database(e.to_string()))?;

        // Initialize tables
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| StorageError::Database(e.to_string()))?;
            {
                write_txn.open_table(RECORDS)?;
                write_txn.open_table(SEQUENCES)?;
            }
            write_txn
                .commit()
                .map_err(|e| StorageError::Database(e.to_string()))?;
        }

        tracing::debug!("Opened redb record store");
        Ok(Self { db: Mutex::new(db) })
    }

    // Zero-padded so keys of one kind iterate in numeric order
    fn make_key(kind: EntityKind, item_id: i64) -> String {
        format!("{}:{:020}", kind, item_id)
    }

    fn make_prefix(kind: EntityKind) -> String {
        format!("{}:", kind)
    }
}

#[async_trait]
impl RecordStore for RedbStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let db = self
            .db
            .lock()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let read_txn = db.begin_read()?;
        read_txn.open_table(RECORDS)?;
        Ok(true)
    }

    async fn save(&self, record: Record) -> StorageResult<Record> {
        let kind = record.kind();

        let db = self
            .db
            .lock()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let write_txn = db.begin_write()?;
        let saved = {
            let mut records = write_txn.open_table(RECORDS)?;
            let mut sequences = write_txn.open_table(SEQUENCES)?;

            let previous = if record.is_new() {
                None
            } else {
                let key = Self::make_key(kind, record.item_id());
                let bytes = records.get(key.as_str())?.map(|v| v.value().to_vec());
                bytes
                    .map(|b| serde_json::from_slice::<Record>(&b))
                    .transpose()?
            };

            let last_id = sequences.get(kind.as_str())?.map(|v| v.value()).unwrap_or(0);
            let record = prepare_for_save(record, previous.as_ref(), || Ok(last_id + 1))?;

            let value = serde_json::to_vec(&record)?;
            let key = Self::make_key(kind, record.item_id());
            records.insert(key.as_str(), value.as_slice())?;
            sequences.insert(kind.as_str(), last_id.max(record.item_id()))?;
            record
        };
        write_txn.commit()?;

        Ok(saved)
    }

    async fn get(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let key = Self::make_key(kind, item_id);

        let db = self
            .db
            .lock()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;

        if let Some(value) = table.get(key.as_str())? {
            let record: Record = serde_json::from_slice(value.value())?;
            Ok(Some(record))
        } else {
            Ok(None)
        }
    }

    async fn delete(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let key = Self::make_key(kind, item_id);

        let db = self
            .db
            .lock()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let write_txn = db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(RECORDS)?;
            let bytes = table.remove(key.as_str())?.map(|v| v.value().to_vec());
            bytes
                .map(|b| serde_json::from_slice::<Record>(&b))
                .transpose()?
        };
        write_txn.commit()?;

        Ok(removed)
    }

    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<Record>> {
        let prefix = Self::make_prefix(kind);

        let db = self
            .db
            .lock()
            .map_err(|e| StorageError::Database(e.to_string()))?;
        let read_txn = db.begin_read()?;
        let table = read_txn.open_table(RECORDS)?;

        let mut records = Vec::new();
        for entry in table.iter()? {
            let (key, value) = entry?;
            if key.value().starts_with(&prefix) {
                let record: Record = serde_json::from_slice(value.value())?;
                records.push(record);
            }
        }

        Ok(records)
    }
}
