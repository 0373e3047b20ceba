//! SQLite record store

use crate::error::{StorageError, StorageResult};
use crate::traits::{prepare_for_save, RecordStore};
use async_trait::async_trait;
use quill_core::{EntityKind, Record};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// SQLite record store
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a SQLite database at the given path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StorageError::Database(e.to_string()))?;
        tracing::debug!(path = %path.display(), "Opened sqlite record store");

        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;

        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> StorageResult<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| StorageError::Database(e.to_string()))?;

        let store = Self { conn: Mutex::new(conn) };
        store.init_tables()?;

        Ok(store)
    }

    fn init_tables(&self) -> StorageResult<()> {
        let conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                item_id INTEGER NOT NULL,
                data TEXT NOT NULL,
                PRIMARY KEY (kind, item_id)
            );

            CREATE TABLE IF NOT EXISTS sequences (
                kind TEXT PRIMARY KEY,
                last_id INTEGER NOT NULL
            );
            "#,
        )?;

        Ok(())
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    async fn initialize(&self) -> StorageResult<()> {
        Ok(())
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;
        conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))?;
        Ok(true)
    }

    async fn save(&self, record: Record) -> StorageResult<Record> {
        let kind = record.kind();
        let mut conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;
        let tx = conn.transaction()?;

        let previous = if record.is_new() {
            None
        } else {
            let data: Option<String> = tx
                .query_row(
                    "SELECT data FROM records WHERE kind = ?1 AND item_id = ?2",
                    params![kind.as_str(), record.item_id()],
                    |row| row.get(0),
                )
                .optional()?;
            data.map(|d| serde_json::from_str::<Record>(&d)).transpose()?
        };

        let last_id: i64 = tx
            .query_row(
                "SELECT last_id FROM sequences WHERE kind = ?1",
                params![kind.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .unwrap_or(0);

        let record = prepare_for_save(record, previous.as_ref(), || Ok(last_id + 1))?;
        let data = serde_json::to_string(&record)?;

        tx.execute(
            "INSERT OR REPLACE INTO records (kind, item_id, data) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), record.item_id(), data],
        )?;
        tx.execute(
            "INSERT OR REPLACE INTO sequences (kind, last_id) VALUES (?1, ?2)",
            params![kind.as_str(), last_id.max(record.item_id())],
        )?;
        tx.commit()?;

        Ok(record)
    }

    async fn get(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;

        let result = conn.query_row(
            "SELECT data FROM records WHERE kind = ?1 AND item_id = ?2",
            params![kind.as_str(), item_id],
            |row| {
                let data: String = row.get(0)?;
                Ok(data)
            },
        );

        match result {
            Ok(data) => {
                let record: Record = serde_json::from_str(&data)?;
                Ok(Some(record))
            }
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(StorageError::Database(e.to_string())),
        }
    }

    async fn delete(&self, kind: EntityKind, item_id: i64) -> StorageResult<Option<Record>> {
        let existing = self.get(kind, item_id).await?;
        if existing.is_none() {
            return Ok(None);
        }

        let conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;
        conn.execute(
            "DELETE FROM records WHERE kind = ?1 AND item_id = ?2",
            params![kind.as_str(), item_id],
        )?;

        Ok(existing)
    }

    async fn list(&self, kind: EntityKind) -> StorageResult<Vec<Record>> {
        let conn = self.conn.lock().map_err(|e| StorageError::Database(e.to_string()))?;

        let mut stmt =
            conn.prepare("SELECT data FROM records WHERE kind = ?1 ORDER BY item_id")?;

        let rows = stmt.query_map(params![kind.as_str()], |row| {
            let data: String = row.get(0)?;
            Ok(data)
        })?;

        let mut records = Vec::new();
        for row in rows {
            let data = row?;
            let record: Record = serde_json::from_str(&data)?;
            records.push(record);
        }

        Ok(records)
    }
}
