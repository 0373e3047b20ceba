//! Change trigger: keeps the index in step with relational writes
//!
//! The write path calls [`IndexingService::on_write`] after a record is
//! committed and [`IndexingService::on_delete`] after one is deleted. Work
//! happens inline; there is no queue and no retry. A failed sync is
//! returned to the caller, logged, and remembered in the reconciliation set
//! until a later pass syncs that record again.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};

use quill_core::{DocumentKey, EntityKind, MapperRegistry, Record};
use tracing::{debug, error};

use crate::error::{SearchError, SearchResult};
use crate::writer::{IndexWriter, UpsertOutcome};

/// What a trigger call did to the index
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    Indexed(UpsertOutcome),
    Removed { key: DocumentKey, removed: usize },
    /// The kind has no mapper; the index was not touched
    Untracked(EntityKind),
}

/// Mirrors record writes and deletes into the index
#[derive(Debug, Clone)]
pub struct IndexingService {
    registry: Arc<MapperRegistry>,
    writer: IndexWriter,
    failed: Arc<Mutex<BTreeSet<(EntityKind, i64)>>>,
}

impl IndexingService {
    pub fn new(registry: MapperRegistry, writer: IndexWriter) -> Self {
        Self {
            registry: Arc::new(registry),
            writer,
            failed: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    pub fn registry(&self) -> &MapperRegistry {
        &self.registry
    }

    pub fn writer(&self) -> &IndexWriter {
        &self.writer
    }

    /// Index the post-write state of a record
    pub async fn on_write(&self, kind: EntityKind, record: &Record) -> SearchResult<SyncOutcome> {
        if record.kind() != kind {
            return Err(quill_core::Error::KindMismatch {
                expected: kind,
                actual: record.kind(),
            }
            .into());
        }
        let item_id = record.item_id();

        let result = match self.registry.map(record) {
            Ok(Some(document)) => self.writer.upsert(document).await.map(SyncOutcome::Indexed),
            Ok(None) => Ok(SyncOutcome::Untracked(kind)),
            Err(e) => Err(e.into()),
        };

        self.settle(kind, item_id, result)
    }

    /// Drop the documents of a deleted record
    pub async fn on_delete(&self, kind: EntityKind, item_id: i64) -> SearchResult<SyncOutcome> {
        let result = if self.registry.is_tracked(kind) {
            let key = DocumentKey::for_kind(kind, item_id);
            self.writer
                .remove(&key)
                .await
                .map(|removed| SyncOutcome::Removed { key, removed })
        } else {
            Ok(SyncOutcome::Untracked(kind))
        };

        self.settle(kind, item_id, result)
    }

    fn settle(
        &self,
        kind: EntityKind,
        item_id: i64,
        result: SearchResult<SyncOutcome>,
    ) -> SearchResult<SyncOutcome> {
        match &result {
            Ok(SyncOutcome::Untracked(_)) => {
                debug!(kind = %kind, item_id, "Untracked kind, index not touched");
            }
            Ok(_) => {
                self.failures().remove(&(kind, item_id));
            }
            Err(e) => {
                error!(kind = %kind, item_id, error = %e, "Search index sync failed");
                self.failures().insert((kind, item_id));
            }
        }
        result
    }

    fn failures(&self) -> MutexGuard<'_, BTreeSet<(EntityKind, i64)>> {
        // A panic while holding the lock leaves the set itself intact
        self.failed.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records whose last sync failed, in key order
    pub fn pending_reconciliation(&self) -> Vec<(EntityKind, i64)> {
        self.failures().iter().copied().collect()
    }

    pub fn pending_count(&self) -> usize {
        self.failures().len()
    }

    /// Add a record to the reconciliation set, e.g. one carried over from an
    /// earlier process
    pub fn mark_pending(&self, kind: EntityKind, item_id: i64) {
        self.failures().insert((kind, item_id));
    }

    /// Re-run the sync for a failed record; `record` is its current stored
    /// state, `None` when it no longer exists.
    pub async fn reconcile_one(
        &self,
        kind: EntityKind,
        item_id: i64,
        record: Option<&Record>,
    ) -> SearchResult<SyncOutcome> {
        match record {
            Some(record) if record.item_id() == item_id => self.on_write(kind, record).await,
            Some(record) => Err(SearchError::InvalidRecord(format!(
                "reconciling {}/{} with record {}",
                kind,
                item_id,
                record.item_id()
            ))),
            None => self.on_delete(kind, item_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::IndexGateway;
    use crate::memory::MemoryIndex;
    use quill_core::{Author, Book, Tag};

    fn service() -> (Arc<MemoryIndex>, IndexingService) {
        let index = Arc::new(MemoryIndex::new());
        let writer = IndexWriter::new(IndexGateway::new(index.clone()));
        (index, IndexingService::new(MapperRegistry::standard(), writer))
    }

    fn book(id: i64) -> Record {
        let mut book = Book::new("Charlotte's Web", Author::new("E. B.", "White"));
        book.id = id;
        Record::Book(book)
    }

    #[tokio::test]
    async fn test_on_write_then_on_delete() {
        let (index, service) = service();
        let outcome = service.on_write(EntityKind::Book, &book(1)).await.unwrap();
        assert!(matches!(outcome, SyncOutcome::Indexed(_)));
        assert_eq!(index.documents().len(), 1);

        let outcome = service.on_delete(EntityKind::Book, 1).await.unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Removed {
                key: DocumentKey::new("book", 1),
                removed: 1
            }
        );
        assert!(index.documents().is_empty());
    }

    #[tokio::test]
    async fn test_kind_mismatch_is_rejected() {
        let (index, service) = service();
        let err = service.on_write(EntityKind::Author, &book(1)).await.unwrap_err();
        assert!(matches!(err, SearchError::InvalidRecord(_)));
        assert_eq!(index.call_count(), 0);
    }

    #[tokio::test]
    async fn test_untracked_kind_skips_index() {
        let index = Arc::new(MemoryIndex::new());
        let writer = IndexWriter::new(IndexGateway::new(index.clone()));
        let mut registry = MapperRegistry::standard();
        registry.unregister(EntityKind::Tag);
        let service = IndexingService::new(registry, writer);

        let mut tag = Tag::new("rust");
        tag.id = 1;
        let outcome = service.on_write(EntityKind::Tag, &Record::Tag(tag)).await.unwrap();
        assert_eq!(outcome, SyncOutcome::Untracked(EntityKind::Tag));
        assert_eq!(
            service.on_delete(EntityKind::Tag, 1).await.unwrap(),
            SyncOutcome::Untracked(EntityKind::Tag)
        );
        assert_eq!(index.call_count(), 0);
    }

    #[tokio::test]
    async fn test_failures_tracked_until_reconciled() {
        let (index, service) = service();
        index.set_unavailable(true);

        assert!(service.on_write(EntityKind::Book, &book(4)).await.is_err());
        assert!(service.on_delete(EntityKind::Tag, 2).await.is_err());
        assert_eq!(
            service.pending_reconciliation(),
            vec![(EntityKind::Book, 4), (EntityKind::Tag, 2)]
        );

        index.set_unavailable(false);
        let record = book(4);
        service.reconcile_one(EntityKind::Book, 4, Some(&record)).await.unwrap();
        service.reconcile_one(EntityKind::Tag, 2, None).await.unwrap();
        assert_eq!(service.pending_count(), 0);
        assert_eq!(index.documents().len(), 1);
    }
}
