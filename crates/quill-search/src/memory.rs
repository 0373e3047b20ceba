//! In-process search index
//!
//! Keeps committed documents and staged changes apart the way a real index
//! does, and journals every call so tests can assert on round trips and
//! their order. [`MemoryIndex::set_unavailable`] makes every call fail.

use async_trait::async_trait;
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard};

use quill_core::document::is_reserved;
use quill_core::{count_facets, DocumentKey, FacetCounts, SearchDocument};

use crate::error::{SearchError, SearchResult};
use crate::traits::{DeleteQuery, SearchIndex};

/// One call made against a [`MemoryIndex`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexOp {
    Find(DocumentKey),
    DeleteById(String),
    DeleteByQuery(DeleteQuery),
    Add(DocumentKey),
    Commit,
    Query(String),
    Facets(Vec<String>),
    HealthCheck,
}

#[derive(Debug, Clone)]
enum Staged {
    Add(SearchDocument),
    DeleteById(String),
    DeleteByQuery(DeleteQuery),
}

#[derive(Debug, Default)]
struct Inner {
    committed: Vec<SearchDocument>,
    staged: Vec<Staged>,
    journal: Vec<IndexOp>,
    unavailable: bool,
}

/// Search index held in process memory
#[derive(Debug, Default)]
pub struct MemoryIndex {
    inner: Mutex<Inner>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> SearchResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|e| SearchError::Internal(format!("Lock error: {}", e)))
    }

    /// Journal the call, then fail if the index is marked unavailable
    fn begin(&self, op: IndexOp) -> SearchResult<MutexGuard<'_, Inner>> {
        let mut inner = self.lock()?;
        inner.journal.push(op);
        if inner.unavailable {
            return Err(SearchError::IndexUnavailable(
                "memory index is marked unavailable".to_string(),
            ));
        }
        Ok(inner)
    }

    /// Make every subsequent call fail with `IndexUnavailable`
    pub fn set_unavailable(&self, unavailable: bool) {
        if let Ok(mut inner) = self.lock() {
            inner.unavailable = unavailable;
        }
    }

    /// Every call made so far, oldest first
    pub fn journal(&self) -> Vec<IndexOp> {
        self.lock().map(|i| i.journal.clone()).unwrap_or_default()
    }

    /// Number of calls made so far
    pub fn call_count(&self) -> usize {
        self.lock().map(|i| i.journal.len()).unwrap_or_default()
    }

    pub fn clear_journal(&self) {
        if let Ok(mut inner) = self.lock() {
            inner.journal.clear();
        }
    }

    /// Committed documents, in insertion order
    pub fn documents(&self) -> Vec<SearchDocument> {
        self.lock().map(|i| i.committed.clone()).unwrap_or_default()
    }

    /// Number of staged changes awaiting commit
    pub fn staged_len(&self) -> usize {
        self.lock().map(|i| i.staged.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SearchIndex for MemoryIndex {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn find(&self, key: &DocumentKey) -> SearchResult<Vec<SearchDocument>> {
        let inner = self.begin(IndexOp::Find(key.clone()))?;
        Ok(inner
            .committed
            .iter()
            .filter(|d| d.key().as_ref() == Some(key))
            .cloned()
            .collect())
    }

    async fn delete_by_id(&self, id: &str) -> SearchResult<()> {
        let mut inner = self.begin(IndexOp::DeleteById(id.to_string()))?;
        inner.staged.push(Staged::DeleteById(id.to_string()));
        Ok(())
    }

    async fn delete_by_query(&self, query: &DeleteQuery) -> SearchResult<()> {
        let mut inner = self.begin(IndexOp::DeleteByQuery(query.clone()))?;
        inner.staged.push(Staged::DeleteByQuery(query.clone()));
        Ok(())
    }

    async fn add(&self, document: &SearchDocument) -> SearchResult<()> {
        let key = document.validate()?;
        let mut inner = self.begin(IndexOp::Add(key))?;
        if document.id().is_none() {
            return Err(SearchError::MalformedDocument(
                "document has no 'id'".to_string(),
            ));
        }
        inner.staged.push(Staged::Add(document.clone()));
        Ok(())
    }

    async fn commit(&self) -> SearchResult<()> {
        let mut inner = self.begin(IndexOp::Commit)?;
        let staged = std::mem::take(&mut inner.staged);
        for change in staged {
            match change {
                Staged::Add(doc) => inner.committed.push(doc),
                Staged::DeleteById(id) => inner.committed.retain(|d| d.id() != Some(id.as_str())),
                Staged::DeleteByQuery(query) => inner.committed.retain(|d| !query.matches(d)),
            }
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        return_fields: Option<&[String]>,
        rows: usize,
    ) -> SearchResult<Vec<SearchDocument>> {
        let inner = self.begin(IndexOp::Query(text.to_string()))?;
        let clauses = parse_clauses(text);

        let mut scored: Vec<(usize, &SearchDocument)> = inner
            .committed
            .iter()
            .map(|doc| (score(doc, &clauses), doc))
            .filter(|(s, _)| *s > 0)
            .collect();
        // Stable, so equal scores keep insertion order
        scored.sort_by(|a, b| b.0.cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(rows)
            .map(|(_, doc)| match return_fields {
                Some(fields) => doc.project(fields),
                None => doc.clone(),
            })
            .collect())
    }

    async fn facet_counts(&self, fields: &[String]) -> SearchResult<FacetCounts> {
        let inner = self.begin(IndexOp::Facets(fields.to_vec()))?;
        Ok(count_facets(&inner.committed, fields))
    }

    async fn health_check(&self) -> SearchResult<bool> {
        let _inner = self.begin(IndexOp::HealthCheck)?;
        Ok(true)
    }
}

/// One query clause: optional field scope plus the words it needs
#[derive(Debug, PartialEq)]
enum Clause {
    MatchAll,
    Exists(String),
    Terms { field: Option<String>, words: Vec<String> },
}

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

/// Split query text on whitespace, keeping quoted phrases together
fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in text.chars() {
        match c {
            '"' => {
                quoted = !quoted;
                current.push(c);
            }
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

fn parse_clauses(text: &str) -> Vec<Clause> {
    let mut clauses = Vec::new();
    for token in tokenize(text) {
        let token = token.trim_start_matches('+');
        if matches!(token, "AND" | "OR" | "") {
            continue;
        }
        if token == "*:*" || token == "*" {
            clauses.push(Clause::MatchAll);
            continue;
        }

        let (field, value) = match token.split_once(':') {
            Some((f, v)) if quill_core::document::validate_field_name(f).is_ok() => {
                (Some(f.to_string()), v)
            }
            _ => (None, token),
        };
        let value = value.trim_matches('"');

        match field {
            Some(f) if value == "*" => clauses.push(Clause::Exists(f)),
            field => {
                let words: Vec<String> = words(value).collect();
                if !words.is_empty() {
                    clauses.push(Clause::Terms { field, words });
                }
            }
        }
    }
    clauses
}

fn score(doc: &SearchDocument, clauses: &[Clause]) -> usize {
    clauses
        .iter()
        .filter(|clause| match clause {
            Clause::MatchAll => true,
            Clause::Exists(field) => doc.get(field).is_some(),
            Clause::Terms { field, words: needed } => {
                let haystack: BTreeSet<String> = doc
                    .fields()
                    .iter()
                    .filter(|(name, _)| match field {
                        Some(f) => *name == f,
                        None => !is_reserved(name),
                    })
                    .flat_map(|(_, value)| value.scalars())
                    .flat_map(|s| words(&s.to_text()).collect::<Vec<_>>())
                    .collect();
                needed.iter().all(|w| haystack.contains(w))
            }
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::DocumentId;

    fn doc(doc_type: &str, item_id: i64) -> SearchDocument {
        let mut d = SearchDocument::new(doc_type, item_id);
        d.set_id(&DocumentId::new());
        d
    }

    #[tokio::test]
    async fn test_changes_invisible_until_commit() {
        let index = MemoryIndex::new();
        let key = DocumentKey::new("tag", 1);
        index.add(&doc("tag", 1).with("name", "python")).await.unwrap();

        assert!(index.find(&key).await.unwrap().is_empty());
        assert_eq!(index.staged_len(), 1);

        index.commit().await.unwrap();
        assert_eq!(index.find(&key).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_by_query_key() {
        let index = MemoryIndex::new();
        index.add(&doc("tag", 1)).await.unwrap();
        index.add(&doc("tag", 2)).await.unwrap();
        index.add(&doc("language", 1)).await.unwrap();
        index.commit().await.unwrap();

        index
            .delete_by_query(&DeleteQuery::Key(DocumentKey::new("tag", 1)))
            .await
            .unwrap();
        index.commit().await.unwrap();

        let remaining: Vec<_> = index.documents().iter().filter_map(|d| d.key()).collect();
        assert_eq!(
            remaining,
            vec![DocumentKey::new("tag", 2), DocumentKey::new("language", 1)]
        );
    }

    #[tokio::test]
    async fn test_add_requires_id() {
        let index = MemoryIndex::new();
        let err = index.add(&SearchDocument::new("tag", 1)).await.unwrap_err();
        assert!(matches!(err, SearchError::MalformedDocument(_)));
    }

    #[tokio::test]
    async fn test_query_free_text_and_field_scoped() {
        let index = MemoryIndex::new();
        index
            .add(&doc("book", 1).with("title_s", "Charlotte's Web").with("author_s", "White"))
            .await
            .unwrap();
        index
            .add(&doc("book", 2).with("title_s", "Stuart Little").with("author_s", "White"))
            .await
            .unwrap();
        index.add(&doc("tag", 3).with("name", "web")).await.unwrap();
        index.commit().await.unwrap();

        let hits = index.query("web", None, 10).await.unwrap();
        assert_eq!(hits.len(), 2);

        let hits = index.query("title_s:web", None, 10).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id(), Some(1));

        let hits = index.query("white", Some(&["title_s".to_string()]), 1).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].len(), 1);

        let hits = index.query("type:book AND little", None, 10).await.unwrap();
        assert_eq!(hits[0].item_id(), Some(2));
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_call() {
        let index = MemoryIndex::new();
        index.set_unavailable(true);
        let err = index.find(&DocumentKey::new("tag", 1)).await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(index.commit().await.is_err());
        assert_eq!(index.call_count(), 2);

        index.set_unavailable(false);
        assert!(index.health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_is_journaled() {
        let index = MemoryIndex::new();
        assert!(index.health_check().await.unwrap());
        assert!(index.health_check().await.unwrap());
        assert_eq!(index.journal(), vec![IndexOp::HealthCheck, IndexOp::HealthCheck]);

        index.set_unavailable(true);
        assert!(index.health_check().await.unwrap_err().is_unavailable());
        assert_eq!(index.call_count(), 3);
    }

    #[test]
    fn test_parse_clauses() {
        assert_eq!(parse_clauses("*:*"), vec![Clause::MatchAll]);
        assert_eq!(
            parse_clauses(r#"title:"hello world" +cli"#),
            vec![
                Clause::Terms {
                    field: Some("title".into()),
                    words: vec!["hello".into(), "world".into()],
                },
                Clause::Terms {
                    field: None,
                    words: vec!["cli".into()],
                },
            ]
        );
        assert_eq!(parse_clauses("partner:*"), vec![Clause::Exists("partner".into())]);
    }
}
