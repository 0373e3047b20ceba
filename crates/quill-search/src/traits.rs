//! Search index traits

use async_trait::async_trait;
use quill_core::{DocumentKey, FacetCounts, SearchDocument};

pub use crate::error::{SearchError, SearchResult as Result};

/// Documents matched by a delete-by-query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteQuery {
    /// Every document in the index
    All,
    /// Every document with the given `type` and `item_id`
    Key(DocumentKey),
}

impl DeleteQuery {
    pub fn matches(&self, document: &SearchDocument) -> bool {
        match self {
            Self::All => true,
            Self::Key(key) => document.key().as_ref() == Some(key),
        }
    }
}

/// Primitives a search service offers.
///
/// Deletes and adds are staged until [`commit`](SearchIndex::commit); reads
/// only see committed state.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Short backend name for logs and status output
    fn name(&self) -> &'static str;

    /// Exact-match lookup on (`type`, `item_id`); every match, with its `id`
    async fn find(&self, key: &DocumentKey) -> Result<Vec<SearchDocument>>;

    /// Stage removal of the document with this internal id
    async fn delete_by_id(&self, id: &str) -> Result<()>;

    /// Stage removal of every document matched by the query
    async fn delete_by_query(&self, query: &DeleteQuery) -> Result<()>;

    /// Stage a document; it must already carry its `id`
    async fn add(&self, document: &SearchDocument) -> Result<()>;

    /// Make staged changes visible
    async fn commit(&self) -> Result<()>;

    /// Free-text or field-scoped query in relevance order, at most `rows`
    /// documents, projected onto `return_fields` when given
    async fn query(
        &self,
        text: &str,
        return_fields: Option<&[String]>,
        rows: usize,
    ) -> Result<Vec<SearchDocument>>;

    /// Facet counts over the whole index
    async fn facet_counts(&self, fields: &[String]) -> Result<FacetCounts>;

    /// Check the index answers
    async fn health_check(&self) -> Result<bool>;
}
