//! Quill Search - Keeps a search index in step with relational records
//!
//! The pieces, leaves first:
//! - [`IndexGateway`]: the shared client for one [`SearchIndex`] backend,
//!   with a timeout on every round trip
//! - [`IndexWriter`]: the upsert and remove protocols
//! - [`IndexingService`]: the change trigger called after relational writes
//! - [`QueryEngine`]: free-text and faceted search
//!
//! Backends: an in-memory index for tests, Tantivy (`fulltext` feature) and
//! Solr over HTTP (`solr` feature).

pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod sync;
pub mod traits;
pub mod writer;

#[cfg(feature = "fulltext")]
pub mod fulltext;

#[cfg(feature = "solr")]
pub mod solr;

pub use config::{BackendKind, SearchConfig};
pub use engine::QueryEngine;
pub use error::{SearchError, SearchResult};
pub use gateway::IndexGateway;
pub use memory::{IndexOp, MemoryIndex};
pub use sync::{IndexingService, SyncOutcome};
pub use traits::{DeleteQuery, SearchIndex};
pub use writer::{IndexWriter, UpsertOutcome};

#[cfg(feature = "fulltext")]
pub use fulltext::TantivyIndex;

#[cfg(feature = "solr")]
pub use solr::SolrIndex;
