//! Record to search-document mapping
//!
//! Each record type knows how to flatten itself ([`ToDocument`]). The
//! [`MapperRegistry`] decides which kinds are tracked at all and lets callers
//! swap in their own mapping for a kind.

use chrono::{DateTime, SecondsFormat, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use crate::document::{FieldValue, SearchDocument};
use crate::error::{Error, Result};
use crate::model::{Activity, Author, Book, EntityKind, Language, Person, Place, Record, Snippet, Tag};

/// Flatten a record into a search document
pub trait ToDocument {
    fn to_document(&self) -> SearchDocument;
}

fn timestamp(ts: &DateTime<Utc>) -> FieldValue {
    FieldValue::from(ts.to_rfc3339_opts(SecondsFormat::Secs, true))
}

impl ToDocument for Author {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::Author, self.id)
            .with("first_name_s", self.first_name.as_str())
            .with("last_name_s", self.last_name.as_str())
    }
}

impl ToDocument for Book {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::Book, self.id)
            .with("title_s", self.title.as_str())
            .with("author_s", self.author.last_name.as_str())
    }
}

fn person_document(kind: EntityKind, person: &Person) -> SearchDocument {
    SearchDocument::for_kind(kind, person.id)
        .with_opt("first_name", person.first_name.clone())
        .with_opt("last_name", person.last_name.clone())
        .with_opt("full_name", person.full_name())
        .with("created", timestamp(&person.created))
        .with("updated", timestamp(&person.updated))
}

impl ToDocument for Tag {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::Tag, self.id)
            .with("name", self.name.as_str())
            .with("created", timestamp(&self.created))
            .with("updated", timestamp(&self.updated))
    }
}

impl ToDocument for Language {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::Language, self.id)
            .with("name", self.name.as_str())
            .with("created", timestamp(&self.created))
            .with("updated", timestamp(&self.updated))
    }
}

impl ToDocument for Snippet {
    fn to_document(&self) -> SearchDocument {
        let tags: Vec<String> = self.tags.iter().map(|t| t.name.clone()).collect();
        SearchDocument::for_kind(EntityKind::Snippet, self.id)
            .with_opt("title", self.title.clone())
            .with("snippet", self.snippet.as_str())
            .with("tags", tags)
            .with_opt("creator", self.creator.full_name())
            .with("created", timestamp(&self.created))
            .with("updated", timestamp(&self.updated))
    }
}

impl ToDocument for Place {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::TimekeeperPlace, self.id)
            .with_opt("name", self.name.clone())
            .with_opt("latitude_coordinate", self.latitude)
            .with_opt("longitude_coordinate", self.longitude)
            .with("created", timestamp(&self.created))
            .with("updated", timestamp(&self.updated))
    }
}

impl ToDocument for Activity {
    fn to_document(&self) -> SearchDocument {
        SearchDocument::for_kind(EntityKind::TimekeeperActivity, self.id)
            .with_opt("title", self.title.clone())
            .with("start_time", timestamp(&self.start_time))
            .with("end_time", timestamp(&self.end_time))
            .with_opt("place", self.place.name.clone())
            .with_opt("partner", self.partner.as_ref().and_then(Person::full_name))
            .with("created", timestamp(&self.created))
            .with("updated", timestamp(&self.updated))
    }
}

/// Default flattening of any record
pub fn map_record(record: &Record) -> SearchDocument {
    match record {
        Record::Author(r) => r.to_document(),
        Record::Book(r) => r.to_document(),
        Record::Person(r) => person_document(EntityKind::Person, r),
        Record::Tag(r) => r.to_document(),
        Record::Language(r) => r.to_document(),
        Record::Snippet(r) => r.to_document(),
        Record::TimekeeperPerson(r) => person_document(EntityKind::TimekeeperPerson, r),
        Record::TimekeeperPlace(r) => r.to_document(),
        Record::TimekeeperActivity(r) => r.to_document(),
    }
}

/// Mapping function registered for one entity kind
pub type MapperFn = Arc<dyn Fn(&Record) -> Result<SearchDocument> + Send + Sync>;

/// Registry of entity kind to mapping function.
///
/// Kinds without a mapper are untracked: writes to them never reach the
/// index.
#[derive(Clone, Default)]
pub struct MapperRegistry {
    mappers: HashMap<EntityKind, MapperFn>,
}

impl MapperRegistry {
    /// An empty registry; nothing is tracked
    pub fn new() -> Self {
        Self::default()
    }

    /// Every kind tracked with its default mapping
    pub fn standard() -> Self {
        let mut registry = Self::new();
        for kind in EntityKind::ALL {
            registry.register(kind, |record: &Record| Ok(map_record(record)));
        }
        registry
    }

    /// Register (or replace) the mapper for a kind
    pub fn register<F>(&mut self, kind: EntityKind, mapper: F) -> &mut Self
    where
        F: Fn(&Record) -> Result<SearchDocument> + Send + Sync + 'static,
    {
        self.mappers.insert(kind, Arc::new(mapper));
        self
    }

    /// Stop tracking a kind
    pub fn unregister(&mut self, kind: EntityKind) -> bool {
        self.mappers.remove(&kind).is_some()
    }

    pub fn is_tracked(&self, kind: EntityKind) -> bool {
        self.mappers.contains_key(&kind)
    }

    /// Tracked kinds in application order
    pub fn tracked_kinds(&self) -> Vec<EntityKind> {
        EntityKind::ALL
            .into_iter()
            .filter(|k| self.is_tracked(*k))
            .collect()
    }

    /// Map a record, or `None` when its kind is untracked
    pub fn map(&self, record: &Record) -> Result<Option<SearchDocument>> {
        let kind = record.kind();
        let Some(mapper) = self.mappers.get(&kind) else {
            return Ok(None);
        };
        let document = mapper(record)?;
        match document.doc_type() {
            Some(t) if t != kind.as_str() => Err(Error::MalformedDocument(format!(
                "mapper for '{}' produced a '{}' document",
                kind, t
            ))),
            _ => Ok(Some(document)),
        }
    }
}

impl std::fmt::Debug for MapperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapperRegistry")
            .field("tracked", &self.tracked_kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Scalar;
    use chrono::TimeZone;

    #[test]
    fn test_book_flattens_author_last_name() {
        let mut book = Book::new("Charlotte's Web", Author::new("E. B.", "White"));
        book.id = 12;

        let doc = book.to_document();
        assert_eq!(doc.doc_type(), Some("book"));
        assert_eq!(doc.item_id(), Some(12));
        assert_eq!(doc.get("title_s").and_then(FieldValue::as_str), Some("Charlotte's Web"));
        assert_eq!(doc.get("author_s").and_then(FieldValue::as_str), Some("White"));
        assert_eq!(doc.len(), 4);
    }

    #[test]
    fn test_snippet_tags_become_a_list() {
        let snippet = Snippet::new("hello", "print('hello')", Person::new("Guido", "van Rossum"))
            .with_tag(Tag::new("python"))
            .with_tag(Tag::new("cli"));

        let doc = map_record(&Record::Snippet(snippet));
        assert_eq!(
            doc.get("tags"),
            Some(&FieldValue::List(vec![Scalar::from("python"), Scalar::from("cli")]))
        );
        assert_eq!(doc.get("creator").and_then(FieldValue::as_str), Some("Guido van Rossum"));
    }

    #[test]
    fn test_empty_relations_are_tolerated() {
        let snippet = Snippet {
            snippet: "ls -la".into(),
            ..Default::default()
        };
        let doc = snippet.to_document();
        assert_eq!(doc.get("tags"), Some(&FieldValue::List(Vec::new())));
        assert!(doc.get("title").is_none());
        assert!(doc.get("creator").is_none());

        let start = Utc.with_ymd_and_hms(2014, 4, 25, 9, 0, 0).unwrap();
        let activity = Activity::new("standup", start, start, Place::default());
        let doc = activity.to_document();
        assert!(doc.get("partner").is_none());
        assert!(doc.get("place").is_none());
        assert_eq!(doc.get("start_time").and_then(FieldValue::as_str), Some("2014-04-25T09:00:00Z"));
    }

    #[test]
    fn test_place_coordinates() {
        let mut place = Place::new("Library").at(51.75, -1.25);
        place.id = 4;
        let doc = map_record(&Record::TimekeeperPlace(place));
        assert_eq!(doc.doc_type(), Some("timekeeper_place"));
        assert_eq!(doc.get("latitude_coordinate"), Some(&FieldValue::from(51.75)));
        assert_eq!(doc.get("longitude_coordinate"), Some(&FieldValue::from(-1.25)));
    }

    #[test]
    fn test_people_use_kind_specific_type() {
        let person = Person::new("Ada", "Lovelace");
        let code = map_record(&Record::Person(person.clone()));
        let time = map_record(&Record::TimekeeperPerson(person));
        assert_eq!(code.doc_type(), Some("person"));
        assert_eq!(time.doc_type(), Some("timekeeper_person"));
        assert_eq!(time.get("full_name").and_then(FieldValue::as_str), Some("Ada Lovelace"));
    }

    #[test]
    fn test_registry_skips_untracked_kinds() {
        let mut registry = MapperRegistry::standard();
        assert!(registry.unregister(EntityKind::Tag));

        let tag = Record::Tag(Tag::new("rust"));
        assert!(registry.map(&tag).unwrap().is_none());
        assert!(registry.map(&Record::Language(Language::new("Rust"))).unwrap().is_some());
        assert!(!registry.tracked_kinds().contains(&EntityKind::Tag));
    }

    #[test]
    fn test_registry_rejects_mismatched_type() {
        let mut registry = MapperRegistry::new();
        registry.register(EntityKind::Tag, |record| {
            Ok(SearchDocument::new("language", record.item_id()))
        });
        let err = registry.map(&Record::Tag(Tag::new("rust"))).unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }
}
