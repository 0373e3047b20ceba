//! Quill Core - Model and search-document mapping
//!
//! This crate provides the relational record types of the books, code
//! keeper and time keeper applications, the flat search document they are
//! projected into, and the registry of per-kind mappers used by the
//! indexing service.

pub mod document;
pub mod error;
pub mod mapper;
pub mod model;
pub mod query;

pub use document::{DocumentId, DocumentKey, FieldValue, Scalar, SearchDocument};
pub use error::{Error, Result};
pub use mapper::{map_record, MapperFn, MapperRegistry, ToDocument};
pub use model::{
    Activity, Author, Book, EntityKind, Language, Person, Place, Record, Snippet, Tag,
};
pub use query::{count_facets, FacetCounts, SearchRequest, SearchResponse};
