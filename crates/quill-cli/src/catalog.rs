//! Record write path: store first, then the search index
//!
//! The relational write always stands on its own. An index failure after a
//! committed write is reported back and kept in the reconciliation set; it
//! never undoes the write.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use quill_core::{EntityKind, Person, Record};
use quill_search::{IndexingService, SearchError, SyncOutcome};
use quill_storage::RecordStore;

/// A committed write and what happened to its index document
pub struct Synced {
    pub record: Record,
    pub index: Result<SyncOutcome, SearchError>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PassReport {
    pub synced: usize,
    pub failed: usize,
}

pub struct Catalog {
    store: Arc<dyn RecordStore>,
    indexing: IndexingService,
    pending_path: Option<PathBuf>,
}

impl Catalog {
    pub fn new(store: Arc<dyn RecordStore>, indexing: IndexingService) -> Self {
        Self {
            store,
            indexing,
            pending_path: None,
        }
    }

    /// Keep the reconciliation set in a file between runs
    pub fn with_pending_file(mut self, path: PathBuf) -> Self {
        self.pending_path = Some(path);
        self
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn indexing(&self) -> &IndexingService {
        &self.indexing
    }

    /// Save a record (creating any new related records it embeds) and sync
    /// it to the index
    pub async fn save(&self, record: Record) -> anyhow::Result<Synced> {
        let record = self.hydrate(record, true).await?;
        self.persist(record).await
    }

    async fn persist(&self, record: Record) -> anyhow::Result<Synced> {
        let kind = record.kind();
        let stored = self.store.save(record).await?;
        let index = self.indexing.on_write(kind, &stored).await;
        Ok(Synced {
            record: stored,
            index,
        })
    }

    /// Delete a record and its index document. `None` when nothing was stored.
    pub async fn delete(&self, kind: EntityKind, item_id: i64) -> anyhow::Result<Option<Synced>> {
        let Some(record) = self.store.delete(kind, item_id).await? else {
            return Ok(None);
        };
        let index = self.indexing.on_delete(kind, item_id).await;
        Ok(Some(Synced { record, index }))
    }

    /// Related record by key: the stored one, or on refresh passes the
    /// embedded snapshot when the stored one is gone
    async fn related(&self, kind: EntityKind, embedded: Record, strict: bool) -> anyhow::Result<Record> {
        let item_id = embedded.item_id();
        match self.store.get(kind, item_id).await? {
            Some(stored) => Ok(stored),
            None if strict => anyhow::bail!("{} {} not found", kind, item_id),
            None => {
                tracing::warn!(kind = %kind, item_id, "Related record missing, using embedded copy");
                Ok(embedded)
            }
        }
    }

    /// Resolve a related record: load it when it has a key, create it when
    /// it is new and `create` is set, otherwise keep it as given
    async fn resolve(&self, embedded: Record, has_content: bool, create: bool) -> anyhow::Result<Record> {
        let kind = embedded.kind();
        if !embedded.is_new() {
            return self.related(kind, embedded, create).await;
        }
        if create && has_content {
            return Ok(self.persist(embedded).await?.record);
        }
        Ok(embedded)
    }

    /// Refresh embedded related records from the store so flattened fields
    /// match stored state
    async fn hydrate(&self, record: Record, create: bool) -> anyhow::Result<Record> {
        let record = match record {
            Record::Book(mut book) => {
                let author = &book.author;
                let has_content = !author.first_name.is_empty() || !author.last_name.is_empty();
                if create && author.id <= 0 && !has_content {
                    anyhow::bail!("a book needs an author (give an author id or name)");
                }
                if let Record::Author(author) = self
                    .resolve(Record::Author(book.author.clone()), has_content, create)
                    .await?
                {
                    book.author = author;
                }
                Record::Book(book)
            }
            Record::Snippet(mut snippet) => {
                let mut tags = Vec::with_capacity(snippet.tags.len());
                for tag in std::mem::take(&mut snippet.tags) {
                    let has_content = !tag.name.is_empty();
                    if let Record::Tag(tag) = self.resolve(Record::Tag(tag), has_content, create).await? {
                        tags.push(tag);
                    }
                }
                snippet.tags = tags;

                let has_content = has_name(&snippet.creator);
                if let Record::Person(person) = self
                    .resolve(Record::Person(snippet.creator.clone()), has_content, create)
                    .await?
                {
                    snippet.creator = person;
                }
                Record::Snippet(snippet)
            }
            Record::TimekeeperActivity(mut activity) => {
                let has_content = activity.place.name.is_some();
                if let Record::TimekeeperPlace(place) = self
                    .resolve(Record::TimekeeperPlace(activity.place.clone()), has_content, create)
                    .await?
                {
                    activity.place = place;
                }
                if let Some(partner) = activity.partner.take() {
                    let has_content = has_name(&partner);
                    if let Record::TimekeeperPerson(person) = self
                        .resolve(Record::TimekeeperPerson(partner), has_content, create)
                        .await?
                    {
                        activity.partner = Some(person);
                    }
                }
                Record::TimekeeperActivity(activity)
            }
            other => other,
        };
        Ok(record)
    }

    /// Re-run the write path for every stored record
    pub async fn reindex(&self, clear: bool) -> anyhow::Result<PassReport> {
        if clear {
            self.indexing
                .writer()
                .clear()
                .await
                .context("clearing the index")?;
        }

        let mut report = PassReport::default();
        for record in self.store.list_all().await? {
            let kind = record.kind();
            let record = self.hydrate(record, false).await?;
            match self.indexing.on_write(kind, &record).await {
                Ok(_) => report.synced += 1,
                Err(_) => report.failed += 1,
            }
        }
        tracing::info!(synced = report.synced, failed = report.failed, "Reindex finished");
        Ok(report)
    }

    /// Retry every record in the reconciliation set against its current
    /// stored state
    pub async fn reconcile(&self) -> anyhow::Result<PassReport> {
        let mut report = PassReport::default();
        for (kind, item_id) in self.indexing.pending_reconciliation() {
            let record = match self.store.get(kind, item_id).await? {
                Some(record) => Some(self.hydrate(record, false).await?),
                None => None,
            };
            match self.indexing.reconcile_one(kind, item_id, record.as_ref()).await {
                Ok(_) => report.synced += 1,
                Err(_) => report.failed += 1,
            }
        }
        Ok(report)
    }

    /// Load the reconciliation set left by earlier runs
    pub fn restore_pending(&self) -> anyhow::Result<()> {
        let Some(path) = &self.pending_path else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let text = std::fs::read_to_string(path)?;
        let keys: Vec<(EntityKind, i64)> = serde_json::from_str(&text)
            .with_context(|| format!("reading {}", path.display()))?;
        for (kind, item_id) in keys {
            self.indexing.mark_pending(kind, item_id);
        }
        Ok(())
    }

    /// Write the reconciliation set back; the file is removed once empty
    pub fn save_pending(&self) -> anyhow::Result<()> {
        let Some(path) = &self.pending_path else {
            return Ok(());
        };
        let keys = self.indexing.pending_reconciliation();
        if keys.is_empty() {
            if path.exists() {
                std::fs::remove_file(path)?;
            }
            return Ok(());
        }
        std::fs::write(path, serde_json::to_string_pretty(&keys)?)?;
        Ok(())
    }
}

fn has_name(person: &Person) -> bool {
    person.first_name.is_some() || person.last_name.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Author, Book, MapperRegistry, Snippet, Tag};
    use quill_search::{IndexGateway, IndexWriter, MemoryIndex};
    use quill_storage::MemoryStore;

    fn catalog() -> (Arc<MemoryIndex>, Catalog) {
        let index = Arc::new(MemoryIndex::new());
        let writer = IndexWriter::new(IndexGateway::new(index.clone()));
        let indexing = IndexingService::new(MapperRegistry::standard(), writer);
        (index, Catalog::new(Arc::new(MemoryStore::new()), indexing))
    }

    fn author_s(index: &MemoryIndex, item_id: i64) -> Option<String> {
        index
            .documents()
            .iter()
            .find(|d| d.doc_type() == Some("book") && d.item_id() == Some(item_id))
            .and_then(|d| d.get("author_s").and_then(|v| v.as_str()).map(str::to_string))
    }

    #[tokio::test]
    async fn test_book_with_new_author_creates_both() {
        let (index, catalog) = catalog();
        let saved = catalog
            .save(Record::Book(Book::new("Charlotte's Web", Author::new("E. B.", "White"))))
            .await
            .unwrap();
        assert!(saved.index.is_ok());
        assert_eq!(saved.record.item_id(), 1);

        let authors = catalog.store().list(EntityKind::Author).await.unwrap();
        assert_eq!(authors.len(), 1);
        assert_eq!(index.documents().len(), 2);
        assert_eq!(author_s(&index, 1).as_deref(), Some("White"));
    }

    #[tokio::test]
    async fn test_book_refreshes_author_from_store() {
        let (index, catalog) = catalog();
        let author = catalog
            .save(Record::Author(Author::new("Elwyn", "White")))
            .await
            .unwrap()
            .record;

        // Stale embedded copy: only the key matters
        let mut stale = Author::new("", "Whyte");
        stale.id = author.item_id();
        catalog
            .save(Record::Book(Book::new("Stuart Little", stale)))
            .await
            .unwrap();
        assert_eq!(author_s(&index, 1).as_deref(), Some("White"));
    }

    #[tokio::test]
    async fn test_missing_related_record_is_an_error() {
        let (_index, catalog) = catalog();
        let mut ghost = Author::new("", "Ghost");
        ghost.id = 42;
        assert!(catalog.save(Record::Book(Book::new("Nothing", ghost))).await.is_err());
        assert!(catalog
            .save(Record::Book(Book::new("Nobody", Author::default())))
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_index_failure_keeps_store_write() {
        let (index, catalog) = catalog();
        index.set_unavailable(true);
        let saved = catalog.save(Record::Tag(Tag::new("python"))).await.unwrap();
        assert!(saved.index.is_err());
        assert!(catalog.store().get(EntityKind::Tag, 1).await.unwrap().is_some());
        assert_eq!(
            catalog.indexing().pending_reconciliation(),
            vec![(EntityKind::Tag, 1)]
        );

        index.set_unavailable(false);
        let report = catalog.reconcile().await.unwrap();
        assert_eq!(report, PassReport { synced: 1, failed: 0 });
        assert_eq!(index.documents().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_and_reindex() {
        let (index, catalog) = catalog();
        let snippet = Snippet::new("hello", "print('hello')", Person::new("Guido", "van Rossum"))
            .with_tag(Tag::new("python"));
        let saved = catalog.save(Record::Snippet(snippet)).await.unwrap();
        // tag, person, snippet
        assert_eq!(index.documents().len(), 3);

        let deleted = catalog
            .delete(EntityKind::Snippet, saved.record.item_id())
            .await
            .unwrap()
            .unwrap();
        assert!(deleted.index.is_ok());
        assert_eq!(index.documents().len(), 2);
        assert!(catalog.delete(EntityKind::Snippet, 99).await.unwrap().is_none());

        let report = catalog.reindex(true).await.unwrap();
        assert_eq!(report, PassReport { synced: 2, failed: 0 });
        assert_eq!(index.documents().len(), 2);
    }

    #[tokio::test]
    async fn test_pending_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reconcile.json");
        let (index, catalog) = catalog();
        let catalog = catalog.with_pending_file(path.clone());

        index.set_unavailable(true);
        catalog.save(Record::Tag(Tag::new("cli"))).await.unwrap();
        catalog.save_pending().unwrap();
        assert!(path.exists());

        let (_other_index, other) = self::catalog();
        let other = other.with_pending_file(path.clone());
        other.restore_pending().unwrap();
        assert_eq!(other.indexing().pending_count(), 1);

        index.set_unavailable(false);
        catalog.reconcile().await.unwrap();
        catalog.save_pending().unwrap();
        assert!(!path.exists());
    }
}
