//! Embedded full-text index using Tantivy
//!
//! Every search document is stored whole (as JSON in `source`) and indexed
//! three ways: exact `id`/`type`/`item_id` terms for the writer protocol, a
//! catch-all `text` field for free-text queries, and an `attrs` JSON field
//! so `field:value` queries reach the individual document fields.
//!
//! Commits and searches run on the blocking pool, so a slow segment merge
//! never stalls a runtime worker and the gateway timeout can fire.

use async_trait::async_trait;
use std::path::Path;
use std::sync::{Arc, RwLock};
use tantivy::{
    collector::{DocSetCollector, TopDocs},
    directory::MmapDirectory,
    query::{AllQuery, BooleanQuery, Occur, Query, QueryParser, TermQuery},
    schema::{Field, IndexRecordOption, Schema, Value, STORED, STRING, TEXT},
    DocAddress, Index, IndexReader, IndexWriter, ReloadPolicy, Searcher, TantivyDocument, Term,
};
use tracing::debug;

use quill_core::document::{is_reserved, ID_FIELD, ITEM_ID_FIELD, TYPE_FIELD};
use quill_core::{count_facets, DocumentKey, FacetCounts, SearchDocument};

use crate::traits::{DeleteQuery, Result, SearchError, SearchIndex};

const TEXT_FIELD: &str = "text";
const ATTRS_FIELD: &str = "attrs";
const SOURCE_FIELD: &str = "source";

/// Default writer heap (50MB)
pub const DEFAULT_HEAP_SIZE: usize = 50_000_000;

/// Search index backed by Tantivy
pub struct TantivyIndex {
    state: Arc<IndexState>,
}

struct IndexState {
    index: Index,
    reader: IndexReader,
    writer: RwLock<IndexWriter>,
    schema: Schema,
    id_field: Field,
    type_field: Field,
    item_id_field: Field,
    text_field: Field,
    source_field: Field,
}

fn build_schema() -> Schema {
    let mut schema_builder = Schema::builder();
    schema_builder.add_text_field(ID_FIELD, STRING | STORED);
    schema_builder.add_text_field(TYPE_FIELD, STRING | STORED);
    schema_builder.add_text_field(ITEM_ID_FIELD, STRING | STORED);
    schema_builder.add_text_field(TEXT_FIELD, TEXT);
    schema_builder.add_json_field(ATTRS_FIELD, TEXT);
    schema_builder.add_text_field(SOURCE_FIELD, STORED);
    schema_builder.build()
}

impl TantivyIndex {
    /// Open (or create) an index in a directory
    pub fn open(index_path: &Path, heap_size: usize) -> Result<Self> {
        std::fs::create_dir_all(index_path)?;
        let dir = MmapDirectory::open(index_path).map_err(|e| SearchError::Index(e.to_string()))?;
        let index = Index::open_or_create(dir, build_schema())
            .map_err(|e| SearchError::Index(e.to_string()))?;
        debug!(path = %index_path.display(), "Opened tantivy index");
        Self::from_index(index, ReloadPolicy::OnCommitWithDelay, heap_size)
    }

    /// Create in-memory index for testing
    pub fn in_memory() -> Result<Self> {
        let index = Index::create_in_ram(build_schema());
        Self::from_index(index, ReloadPolicy::Manual, DEFAULT_HEAP_SIZE)
    }

    fn from_index(index: Index, policy: ReloadPolicy, heap_size: usize) -> Result<Self> {
        let schema = index.schema();
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|e| SearchError::Index(e.to_string()))
        };
        let id_field = field(ID_FIELD)?;
        let type_field = field(TYPE_FIELD)?;
        let item_id_field = field(ITEM_ID_FIELD)?;
        let text_field = field(TEXT_FIELD)?;
        let source_field = field(SOURCE_FIELD)?;

        let reader = index
            .reader_builder()
            .reload_policy(policy)
            .try_into()
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let writer = index
            .writer(heap_size)
            .map_err(|e| SearchError::Index(e.to_string()))?;

        let state = IndexState {
            index,
            reader,
            writer: RwLock::new(writer),
            schema,
            id_field,
            type_field,
            item_id_field,
            text_field,
            source_field,
        };
        Ok(Self {
            state: Arc::new(state),
        })
    }

    /// Run `work` against the index on the blocking pool
    async fn blocking<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&IndexState) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let state = self.state.clone();
        tokio::task::spawn_blocking(move || work(state.as_ref()))
            .await
            .map_err(|e| SearchError::Internal(format!("Index task failed: {}", e)))?
    }
}

impl IndexState {
    fn key_query(&self, key: &DocumentKey) -> BooleanQuery {
        let type_term = Term::from_field_text(self.type_field, &key.doc_type);
        let item_term = Term::from_field_text(self.item_id_field, &key.item_id.to_string());
        BooleanQuery::new(vec![
            (
                Occur::Must,
                Box::new(TermQuery::new(type_term, IndexRecordOption::Basic)) as Box<dyn Query>,
            ),
            (
                Occur::Must,
                Box::new(TermQuery::new(item_term, IndexRecordOption::Basic)) as Box<dyn Query>,
            ),
        ])
    }

    fn create_document(&self, document: &SearchDocument) -> Result<TantivyDocument> {
        let key = document.validate()?;
        let id = document
            .id()
            .ok_or_else(|| SearchError::MalformedDocument("document has no 'id'".to_string()))?;

        let attrs: serde_json::Map<String, serde_json::Value> = document
            .fields()
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .map(|(name, value)| Ok::<_, SearchError>((name.clone(), serde_json::to_value(value)?)))
            .collect::<Result<_>>()?;

        // Combine all searchable content
        let text = document.text_values().collect::<Vec<_>>().join(" ");

        let json = serde_json::json!({
            ID_FIELD: id,
            TYPE_FIELD: key.doc_type,
            ITEM_ID_FIELD: key.item_id.to_string(),
            TEXT_FIELD: text,
            ATTRS_FIELD: attrs,
            SOURCE_FIELD: serde_json::to_string(document)?,
        });

        TantivyDocument::parse_json(&self.schema, &json.to_string())
            .map_err(|e| SearchError::Index(e.to_string()))
    }

    fn load(&self, searcher: &Searcher, address: DocAddress) -> Result<SearchDocument> {
        let doc: TantivyDocument = searcher
            .doc(address)
            .map_err(|e| SearchError::Internal(e.to_string()))?;
        let source = doc
            .get_first(self.source_field)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SearchError::Index("stored document has no source".to_string()))?;
        Ok(serde_json::from_str(source)?)
    }

    fn collect_all<Q: Query>(&self, query: &Q) -> Result<Vec<SearchDocument>> {
        let searcher = self.reader.searcher();
        let mut addresses: Vec<DocAddress> = searcher
            .search(query, &DocSetCollector)
            .map_err(|e| SearchError::Query(e.to_string()))?
            .into_iter()
            .collect();
        addresses.sort();
        addresses
            .into_iter()
            .map(|address| self.load(&searcher, address))
            .collect()
    }

    fn reload(&self) -> Result<()> {
        self.reader
            .reload()
            .map_err(|e| SearchError::Index(e.to_string()))
    }

    fn writer(&self) -> Result<std::sync::RwLockReadGuard<'_, IndexWriter>> {
        self.writer
            .read()
            .map_err(|e| SearchError::Internal(format!("Lock error: {}", e)))
    }

    fn commit(&self) -> Result<()> {
        {
            let mut writer = self
                .writer
                .write()
                .map_err(|e| SearchError::Internal(format!("Lock error: {}", e)))?;
            writer
                .commit()
                .map_err(|e| SearchError::Index(e.to_string()))?;
        }
        self.reload()
    }

    fn search(&self, text: &str, return_fields: Option<&[String]>, rows: usize) -> Result<Vec<SearchDocument>> {
        let searcher = self.reader.searcher();
        // TopDocs preallocates for the limit
        let rows = rows.min(searcher.num_docs() as usize);
        if rows == 0 {
            return Ok(Vec::new());
        }

        let query_parser = QueryParser::for_index(&self.index, vec![self.text_field]);
        let scoped = scope_fields(text);
        let (parsed_query, errors) = query_parser.parse_query_lenient(&scoped);
        if !errors.is_empty() {
            debug!(query = %scoped, errors = errors.len(), "Lenient query parse dropped clauses");
        }

        let top_docs = searcher
            .search(&*parsed_query, &TopDocs::with_limit(rows))
            .map_err(|e| SearchError::Query(e.to_string()))?;

        top_docs
            .into_iter()
            .map(|(_score, address)| {
                let doc = self.load(&searcher, address)?;
                Ok(match return_fields {
                    Some(fields) => doc.project(fields),
                    None => doc,
                })
            })
            .collect()
    }
}

/// Point `name:` clauses at the `attrs` JSON field unless `name` is a
/// top-level schema field.
fn scope_fields(text: &str) -> String {
    const TOP_LEVEL: [&str; 6] = [ID_FIELD, TYPE_FIELD, ITEM_ID_FIELD, TEXT_FIELD, ATTRS_FIELD, SOURCE_FIELD];

    let mut out = String::with_capacity(text.len() + 16);
    let mut quoted = false;
    let mut at_start = true;
    let mut rest = text;
    while let Some(c) = rest.chars().next() {
        if at_start && !quoted {
            let len = rest
                .find(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
                .unwrap_or(rest.len());
            let name = &rest[..len];
            if len > 0 && rest[len..].starts_with(':') && !TOP_LEVEL.contains(&name) {
                out.push_str(ATTRS_FIELD);
                out.push('.');
            }
        }
        if c == '"' {
            quoted = !quoted;
        }
        at_start = !quoted && (c.is_whitespace() || matches!(c, '(' | '+' | '-'));
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    out
}

#[async_trait]
impl SearchIndex for TantivyIndex {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    async fn find(&self, key: &DocumentKey) -> Result<Vec<SearchDocument>> {
        let key = key.clone();
        self.blocking(move |state| state.collect_all(&state.key_query(&key)))
            .await
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        let state = &self.state;
        state
            .writer()?
            .delete_term(Term::from_field_text(state.id_field, id));
        Ok(())
    }

    async fn delete_by_query(&self, query: &DeleteQuery) -> Result<()> {
        let state = &self.state;
        let query: Box<dyn Query> = match query {
            DeleteQuery::All => Box::new(AllQuery),
            DeleteQuery::Key(key) => Box::new(state.key_query(key)),
        };
        state
            .writer()?
            .delete_query(query)
            .map_err(|e| SearchError::Index(e.to_string()))?;
        Ok(())
    }

    async fn add(&self, document: &SearchDocument) -> Result<()> {
        let state = &self.state;
        let doc = state.create_document(document)?;
        state
            .writer()?
            .add_document(doc)
            .map_err(|e| SearchError::Index(e.to_string()))?;
        Ok(())
    }

    async fn commit(&self) -> Result<()> {
        self.blocking(|state| state.commit()).await
    }

    async fn query(
        &self,
        text: &str,
        return_fields: Option<&[String]>,
        rows: usize,
    ) -> Result<Vec<SearchDocument>> {
        let text = text.to_string();
        let return_fields = return_fields.map(<[String]>::to_vec);
        self.blocking(move |state| state.search(&text, return_fields.as_deref(), rows))
            .await
    }

    async fn facet_counts(&self, fields: &[String]) -> Result<FacetCounts> {
        let fields = fields.to_vec();
        self.blocking(move |state| {
            let documents = state.collect_all(&AllQuery)?;
            Ok(count_facets(&documents, &fields))
        })
        .await
    }

    async fn health_check(&self) -> Result<bool> {
        let _ = self.state.reader.searcher().num_docs();
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::DocumentId;

    fn with_id(mut doc: SearchDocument) -> SearchDocument {
        doc.set_id(&DocumentId::new());
        doc
    }

    #[test]
    fn test_scope_fields() {
        assert_eq!(scope_fields("title_s:web"), "attrs.title_s:web");
        assert_eq!(scope_fields("type:book white"), "type:book white");
        assert_eq!(scope_fields("+name:python -tags:cli"), "+attrs.name:python -attrs.tags:cli");
        assert_eq!(scope_fields(r#""a b:c" title:x"#), r#""a b:c" attrs.title:x"#);
        assert_eq!(scope_fields("*:*"), "*:*");
    }

    #[tokio::test]
    async fn test_add_find_and_delete() {
        let index = TantivyIndex::in_memory().unwrap();
        let key = DocumentKey::new("book", 7);
        let doc = with_id(
            SearchDocument::new("book", 7)
                .with("title_s", "Charlotte's Web")
                .with("author_s", "White"),
        );

        index.add(&doc).await.unwrap();
        assert!(index.find(&key).await.unwrap().is_empty());
        index.commit().await.unwrap();

        let found = index.find(&key).await.unwrap();
        assert_eq!(found, vec![doc.clone()]);

        index.delete_by_id(doc.id().unwrap()).await.unwrap();
        index.commit().await.unwrap();
        assert!(index.find(&key).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_query_free_text_and_scoped() {
        let index = TantivyIndex::in_memory().unwrap();
        index
            .add(&with_id(SearchDocument::new("book", 1).with("title_s", "Charlotte's Web")))
            .await
            .unwrap();
        index
            .add(&with_id(SearchDocument::new("tag", 2).with("name", "web")))
            .await
            .unwrap();
        index
            .add(&with_id(SearchDocument::new("tag", 3).with("name", "python")))
            .await
            .unwrap();
        index.commit().await.unwrap();

        let hits = index.query("web", None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = index.query("name:python", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id(), Some(3));

        let fields = vec!["name".to_string()];
        let hits = index.query("type:tag", Some(&fields), 10).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|d| d.len() == 1));
    }

    #[tokio::test]
    async fn test_delete_all_and_facets() {
        let index = TantivyIndex::in_memory().unwrap();
        for (i, name) in ["python", "python", "cli"].iter().enumerate() {
            index
                .add(&with_id(SearchDocument::new("tag", i as i64 + 1).with("name", *name)))
                .await
                .unwrap();
        }
        index.commit().await.unwrap();

        let facets = index.facet_counts(&["name".to_string()]).await.unwrap();
        assert_eq!(facets["name"]["python"], 2);
        assert_eq!(facets["name"]["cli"], 1);

        index.delete_by_query(&DeleteQuery::All).await.unwrap();
        index.commit().await.unwrap();
        let facets = index.facet_counts(&["name".to_string()]).await.unwrap();
        assert!(facets["name"].is_empty());
    }

    #[tokio::test]
    async fn test_query_rows_beyond_index_size() {
        let index = TantivyIndex::in_memory().unwrap();
        index
            .add(&with_id(SearchDocument::new("tag", 1).with("name", "rust")))
            .await
            .unwrap();
        index.commit().await.unwrap();

        assert_eq!(index.query("rust", None, usize::MAX).await.unwrap().len(), 1);
        assert_eq!(index.query("rust", None, 1_000_000_000).await.unwrap().len(), 1);
        assert!(index.query("rust", None, 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commit_yields_to_runtime() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let index = TantivyIndex::in_memory().unwrap();
        index
            .add(&with_id(SearchDocument::new("tag", 1).with("name", "rust")))
            .await
            .unwrap();

        // Single-threaded runtime: the second branch can only run if the
        // commit gives the thread back while it waits on the writer
        let other_ran = AtomicBool::new(false);
        let (ran_during_commit, ()) = tokio::join!(
            async {
                index.commit().await.unwrap();
                other_ran.load(Ordering::SeqCst)
            },
            async {
                other_ran.store(true, Ordering::SeqCst);
            },
        );
        assert!(ran_during_commit);
        assert_eq!(index.query("rust", None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_gateway_bounds_tantivy_calls() {
        use crate::gateway::IndexGateway;
        use std::time::Duration;

        let index = Arc::new(TantivyIndex::in_memory().unwrap());
        let gateway = IndexGateway::new(index).with_timeout(Duration::from_secs(5));
        gateway
            .add(&with_id(SearchDocument::new("tag", 1).with("name", "rust")))
            .await
            .unwrap();
        gateway.commit().await.unwrap();
        assert_eq!(gateway.query("rust", None, 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reopen_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let doc = with_id(SearchDocument::new("language", 1).with("name", "Rust"));
        {
            let index = TantivyIndex::open(dir.path(), DEFAULT_HEAP_SIZE).unwrap();
            index.add(&doc).await.unwrap();
            index.commit().await.unwrap();
        }

        let index = TantivyIndex::open(dir.path(), DEFAULT_HEAP_SIZE).unwrap();
        let found = index.find(&DocumentKey::new("language", 1)).await.unwrap();
        assert_eq!(found, vec![doc]);
    }
}
