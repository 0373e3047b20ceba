//! Search configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::SearchError;

/// Which search backend the gateway talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Embedded Tantivy index
    #[default]
    Tantivy,
    /// Apache Solr core over HTTP
    Solr,
    /// Process-local index, lost on exit
    Memory,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Tantivy => "tantivy",
            Self::Solr => "solr",
            Self::Memory => "memory",
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for BackendKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tantivy" => Ok(Self::Tantivy),
            "solr" => Ok(Self::Solr),
            "memory" => Ok(Self::Memory),
            other => Err(SearchError::Config(format!("unknown search backend '{}'", other))),
        }
    }
}

/// Search service configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub backend: BackendKind,

    /// Tantivy index directory; an in-RAM index when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_path: Option<PathBuf>,

    /// Solr core URL, e.g. `http://localhost:8983/solr/quill`
    pub solr_url: String,

    /// Timeout for each round trip to the index, in milliseconds
    pub timeout_ms: u64,

    /// Maximum documents returned by a search
    pub rows: usize,

    /// Facet fields used when a request names none
    pub facet_fields: Vec<String>,

    /// Tantivy writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            index_path: None,
            solr_url: "http://localhost:8983/solr/quill".to_string(),
            timeout_ms: 5_000,
            rows: 10,
            facet_fields: vec!["name".into(), "title".into(), "last_name".into()],
            writer_heap_size: 50_000_000,
        }
    }
}

impl SearchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_parse() {
        assert_eq!("Solr".parse::<BackendKind>().unwrap(), BackendKind::Solr);
        assert_eq!("memory".parse::<BackendKind>().unwrap(), BackendKind::Memory);
        assert!("elastic".parse::<BackendKind>().is_err());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: SearchConfig = serde_json::from_str(r#"{"backend": "solr", "rows": 25}"#).unwrap();
        assert_eq!(config.backend, BackendKind::Solr);
        assert_eq!(config.rows, 25);
        assert_eq!(config.timeout(), Duration::from_secs(5));
        assert_eq!(config.facet_fields.len(), 3);
    }
}
