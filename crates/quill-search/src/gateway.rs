//! Shared access to the configured search index

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use quill_core::{DocumentKey, FacetCounts, SearchDocument};
use tracing::{debug, warn};

use crate::config::{BackendKind, SearchConfig};
use crate::error::{SearchError, SearchResult};
use crate::memory::MemoryIndex;
use crate::traits::{DeleteQuery, SearchIndex};

/// Default timeout for a single round trip to the index
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// One reusable client for the search index.
///
/// Built once at startup and cloned into the writer and the query engine.
/// Every call is bounded by the gateway timeout; a call that runs out of
/// time fails with [`SearchError::IndexUnavailable`]. The timeout can only
/// fire while the backend future is pending, so backends push blocking work
/// off the runtime thread.
#[derive(Clone)]
pub struct IndexGateway {
    index: Arc<dyn SearchIndex>,
    timeout: Duration,
}

impl IndexGateway {
    pub fn new(index: Arc<dyn SearchIndex>) -> Self {
        Self {
            index,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Build the backend named by the configuration
    pub fn from_config(config: &SearchConfig) -> SearchResult<Self> {
        let index: Arc<dyn SearchIndex> = match config.backend {
            BackendKind::Memory => Arc::new(MemoryIndex::new()),
            BackendKind::Tantivy => open_tantivy(config)?,
            BackendKind::Solr => open_solr(config)?,
        };
        debug!(backend = index.name(), timeout_ms = config.timeout_ms, "Search gateway ready");
        Ok(Self::new(index).with_timeout(config.timeout()))
    }

    pub fn backend(&self) -> &'static str {
        self.index.name()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn call<T, F>(&self, operation: &'static str, fut: F) -> SearchResult<T>
    where
        F: Future<Output = SearchResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    backend = self.index.name(),
                    operation,
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Index round trip timed out"
                );
                Err(SearchError::IndexUnavailable(format!(
                    "{} timed out after {} ms",
                    operation,
                    self.timeout.as_millis()
                )))
            }
        }
    }

    pub async fn find(&self, key: &DocumentKey) -> SearchResult<Vec<SearchDocument>> {
        self.call("find", self.index.find(key)).await
    }

    pub async fn delete_by_id(&self, id: &str) -> SearchResult<()> {
        self.call("delete", self.index.delete_by_id(id)).await
    }

    pub async fn delete_by_query(&self, query: &DeleteQuery) -> SearchResult<()> {
        self.call("delete_by_query", self.index.delete_by_query(query)).await
    }

    pub async fn add(&self, document: &SearchDocument) -> SearchResult<()> {
        self.call("add", self.index.add(document)).await
    }

    pub async fn commit(&self) -> SearchResult<()> {
        self.call("commit", self.index.commit()).await
    }

    pub async fn query(
        &self,
        text: &str,
        return_fields: Option<&[String]>,
        rows: usize,
    ) -> SearchResult<Vec<SearchDocument>> {
        self.call("query", self.index.query(text, return_fields, rows)).await
    }

    pub async fn facet_counts(&self, fields: &[String]) -> SearchResult<FacetCounts> {
        self.call("facets", self.index.facet_counts(fields)).await
    }

    pub async fn health_check(&self) -> SearchResult<bool> {
        self.call("health_check", self.index.health_check()).await
    }
}

impl std::fmt::Debug for IndexGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexGateway")
            .field("backend", &self.index.name())
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[cfg(feature = "fulltext")]
fn open_tantivy(config: &SearchConfig) -> SearchResult<Arc<dyn SearchIndex>> {
    use crate::fulltext::TantivyIndex;

    let index = match &config.index_path {
        Some(path) => TantivyIndex::open(path, config.writer_heap_size)?,
        None => TantivyIndex::in_memory()?,
    };
    Ok(Arc::new(index))
}

#[cfg(not(feature = "fulltext"))]
fn open_tantivy(_config: &SearchConfig) -> SearchResult<Arc<dyn SearchIndex>> {
    Err(SearchError::Config(
        "tantivy backend not compiled in (enable the 'fulltext' feature)".to_string(),
    ))
}

#[cfg(feature = "solr")]
fn open_solr(config: &SearchConfig) -> SearchResult<Arc<dyn SearchIndex>> {
    Ok(Arc::new(crate::solr::SolrIndex::new(&config.solr_url, config.timeout())?))
}

#[cfg(not(feature = "solr"))]
fn open_solr(_config: &SearchConfig) -> SearchResult<Arc<dyn SearchIndex>> {
    Err(SearchError::Config(
        "solr backend not compiled in (enable the 'solr' feature)".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Index whose calls never finish in time
    struct StalledIndex;

    #[async_trait]
    impl SearchIndex for StalledIndex {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn find(&self, _key: &DocumentKey) -> SearchResult<Vec<SearchDocument>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(Vec::new())
        }

        async fn delete_by_id(&self, _id: &str) -> SearchResult<()> {
            Ok(())
        }

        async fn delete_by_query(&self, _query: &DeleteQuery) -> SearchResult<()> {
            Ok(())
        }

        async fn add(&self, _document: &SearchDocument) -> SearchResult<()> {
            Ok(())
        }

        async fn commit(&self) -> SearchResult<()> {
            Ok(())
        }

        async fn query(
            &self,
            _text: &str,
            _return_fields: Option<&[String]>,
            _rows: usize,
        ) -> SearchResult<Vec<SearchDocument>> {
            Ok(Vec::new())
        }

        async fn facet_counts(&self, _fields: &[String]) -> SearchResult<FacetCounts> {
            Ok(FacetCounts::new())
        }

        async fn health_check(&self) -> SearchResult<bool> {
            Ok(true)
        }
    }

    #[tokio::test]
    async fn test_timeout_is_unavailable() {
        let gateway =
            IndexGateway::new(Arc::new(StalledIndex)).with_timeout(Duration::from_millis(20));
        let err = gateway.find(&DocumentKey::new("book", 1)).await.unwrap_err();
        assert!(err.is_unavailable(), "unexpected error {:?}", err);
        assert!(gateway.commit().await.is_ok());
    }

    #[test]
    fn test_from_config_follows_features() {
        let tantivy = SearchConfig {
            backend: BackendKind::Tantivy,
            ..Default::default()
        };
        let result = IndexGateway::from_config(&tantivy);
        assert_eq!(result.is_ok(), cfg!(feature = "fulltext"));
        if let Err(err) = result {
            assert!(matches!(err, SearchError::Config(_)));
        }

        let solr = SearchConfig {
            backend: BackendKind::Solr,
            ..Default::default()
        };
        assert_eq!(IndexGateway::from_config(&solr).is_ok(), cfg!(feature = "solr"));
    }

    #[test]
    fn test_from_config_memory() {
        let config = SearchConfig {
            backend: BackendKind::Memory,
            timeout_ms: 250,
            ..Default::default()
        };
        let gateway = IndexGateway::from_config(&config).unwrap();
        assert_eq!(gateway.backend(), "memory");
        assert_eq!(gateway.timeout(), Duration::from_millis(250));
    }
}
