//! Upsert and remove protocols against the index
//!
//! The index keeps at most one document per (`type`, `item_id`). That holds
//! only because every write goes through here: find what is there, delete
//! it, add the replacement, commit.
//!
//! Two writers racing on the same record can each find the other's document
//! missing and both add, or both delete the same old document and leave two
//! new ones. Nothing serializes them; the next write to the record or a
//! reindex repairs it.

use quill_core::{DocumentId, DocumentKey, SearchDocument};
use tracing::{debug, warn};

use crate::error::SearchResult;
use crate::gateway::IndexGateway;
use crate::traits::DeleteQuery;

/// Result of a successful upsert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub key: DocumentKey,
    /// Internal id given to the new document
    pub id: DocumentId,
    /// Number of prior documents deleted
    pub replaced: usize,
}

/// Writes documents through the gateway
#[derive(Debug, Clone)]
pub struct IndexWriter {
    gateway: IndexGateway,
}

impl IndexWriter {
    pub fn new(gateway: IndexGateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &IndexGateway {
        &self.gateway
    }

    /// Replace whatever the index holds for the document's key.
    ///
    /// A document failing validation is rejected before the index is
    /// touched. Any `id` it carries is replaced with a fresh one.
    pub async fn upsert(&self, mut document: SearchDocument) -> SearchResult<UpsertOutcome> {
        let key = document.validate()?;

        let replaced = self.delete_existing(&key).await?;

        let id = DocumentId::new();
        document.set_id(&id);
        self.gateway.add(&document).await?;
        self.gateway.commit().await?;

        debug!(doc_type = %key.doc_type, item_id = key.item_id, replaced, "Upserted document");
        Ok(UpsertOutcome { key, id, replaced })
    }

    /// Delete every document for the key. Removing an absent key succeeds
    /// and leaves the index as it was.
    pub async fn remove(&self, key: &DocumentKey) -> SearchResult<usize> {
        let removed = self.delete_existing(key).await?;
        if removed == 0 {
            debug!(doc_type = %key.doc_type, item_id = key.item_id, "Nothing to remove");
            return Ok(0);
        }
        self.gateway.commit().await?;
        debug!(doc_type = %key.doc_type, item_id = key.item_id, removed, "Removed documents");
        Ok(removed)
    }

    /// Delete every document in the index
    pub async fn clear(&self) -> SearchResult<()> {
        self.gateway.delete_by_query(&DeleteQuery::All).await?;
        self.gateway.commit().await
    }

    /// Stage deletion of every current match; returns how many were found
    async fn delete_existing(&self, key: &DocumentKey) -> SearchResult<usize> {
        let existing = self.gateway.find(key).await?;
        let mut keyed_delete = false;
        for doc in &existing {
            match doc.id() {
                Some(id) => self.gateway.delete_by_id(id).await?,
                None if !keyed_delete => {
                    warn!(doc_type = %key.doc_type, item_id = key.item_id, "Document without id, deleting by key");
                    self.gateway
                        .delete_by_query(&DeleteQuery::Key(key.clone()))
                        .await?;
                    keyed_delete = true;
                }
                None => {}
            }
        }
        Ok(existing.len())
    }
}
