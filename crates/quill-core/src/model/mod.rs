//! Relational record types
//!
//! Records are the post-write state handed over by the relational layer.
//! Related rows are embedded (a book carries its author, a snippet its tags)
//! so a record can be flattened without going back to the store.

mod books;
mod codekeeper;
mod person;
mod timekeeper;

pub use books::{Author, Book};
pub use codekeeper::{Language, Snippet, Tag};
pub use person::Person;
pub use timekeeper::{Activity, Place};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Kind of a tracked relational entity.
///
/// The serialized name doubles as the `type` discriminator of the search
/// document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Author,
    Book,
    Person,
    Tag,
    Language,
    Snippet,
    TimekeeperPerson,
    TimekeeperPlace,
    TimekeeperActivity,
}

impl EntityKind {
    /// Every kind, in application order
    pub const ALL: [EntityKind; 9] = [
        EntityKind::Author,
        EntityKind::Book,
        EntityKind::Person,
        EntityKind::Tag,
        EntityKind::Language,
        EntityKind::Snippet,
        EntityKind::TimekeeperPerson,
        EntityKind::TimekeeperPlace,
        EntityKind::TimekeeperActivity,
    ];

    /// The `type` discriminator used in search documents
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Author => "author",
            Self::Book => "book",
            Self::Person => "person",
            Self::Tag => "tag",
            Self::Language => "language",
            Self::Snippet => "snippet",
            Self::TimekeeperPerson => "timekeeper_person",
            Self::TimekeeperPlace => "timekeeper_place",
            Self::TimekeeperActivity => "timekeeper_activity",
        }
    }

    /// Application the kind belongs to
    pub fn app(&self) -> &'static str {
        match self {
            Self::Author | Self::Book => "books",
            Self::Person | Self::Tag | Self::Language | Self::Snippet => "codekeeper",
            Self::TimekeeperPerson | Self::TimekeeperPlace | Self::TimekeeperActivity => {
                "timekeeper"
            }
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        Self::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == needle)
            .ok_or_else(|| Error::UnknownKind(s.to_string()))
    }
}

/// A relational record of any tracked kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Author(Author),
    Book(Book),
    Person(Person),
    Tag(Tag),
    Language(Language),
    Snippet(Snippet),
    TimekeeperPerson(Person),
    TimekeeperPlace(Place),
    TimekeeperActivity(Activity),
}

impl Record {
    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Author(_) => EntityKind::Author,
            Self::Book(_) => EntityKind::Book,
            Self::Person(_) => EntityKind::Person,
            Self::Tag(_) => EntityKind::Tag,
            Self::Language(_) => EntityKind::Language,
            Self::Snippet(_) => EntityKind::Snippet,
            Self::TimekeeperPerson(_) => EntityKind::TimekeeperPerson,
            Self::TimekeeperPlace(_) => EntityKind::TimekeeperPlace,
            Self::TimekeeperActivity(_) => EntityKind::TimekeeperActivity,
        }
    }

    /// Primary key; zero until the store assigns one
    pub fn item_id(&self) -> i64 {
        match self {
            Self::Author(r) => r.id,
            Self::Book(r) => r.id,
            Self::Person(r) | Self::TimekeeperPerson(r) => r.id,
            Self::Tag(r) => r.id,
            Self::Language(r) => r.id,
            Self::Snippet(r) => r.id,
            Self::TimekeeperPlace(r) => r.id,
            Self::TimekeeperActivity(r) => r.id,
        }
    }

    pub fn set_item_id(&mut self, id: i64) {
        match self {
            Self::Author(r) => r.id = id,
            Self::Book(r) => r.id = id,
            Self::Person(r) | Self::TimekeeperPerson(r) => r.id = id,
            Self::Tag(r) => r.id = id,
            Self::Language(r) => r.id = id,
            Self::Snippet(r) => r.id = id,
            Self::TimekeeperPlace(r) => r.id = id,
            Self::TimekeeperActivity(r) => r.id = id,
        }
    }

    /// Whether the record has not been persisted yet
    pub fn is_new(&self) -> bool {
        self.item_id() <= 0
    }

    fn stamps_mut(&mut self) -> Option<(&mut DateTime<Utc>, &mut DateTime<Utc>)> {
        match self {
            Self::Author(_) | Self::Book(_) => None,
            Self::Person(r) | Self::TimekeeperPerson(r) => Some((&mut r.created, &mut r.updated)),
            Self::Tag(r) => Some((&mut r.created, &mut r.updated)),
            Self::Language(r) => Some((&mut r.created, &mut r.updated)),
            Self::Snippet(r) => Some((&mut r.created, &mut r.updated)),
            Self::TimekeeperPlace(r) => Some((&mut r.created, &mut r.updated)),
            Self::TimekeeperActivity(r) => Some((&mut r.created, &mut r.updated)),
        }
    }

    /// Creation timestamp, for kinds that carry one
    pub fn created(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Author(_) | Self::Book(_) => None,
            Self::Person(r) | Self::TimekeeperPerson(r) => Some(r.created),
            Self::Tag(r) => Some(r.created),
            Self::Language(r) => Some(r.created),
            Self::Snippet(r) => Some(r.created),
            Self::TimekeeperPlace(r) => Some(r.created),
            Self::TimekeeperActivity(r) => Some(r.created),
        }
    }

    /// Maintain `created`/`updated` the way the relational layer does on save.
    ///
    /// `created` is kept from `previous` when updating a stored row and set
    /// to `now` otherwise; `updated` always moves to `now`.
    pub fn touch(&mut self, now: DateTime<Utc>, previous: Option<&Record>) {
        let created = previous.and_then(Record::created).unwrap_or(now);
        if let Some((c, u)) = self.stamps_mut() {
            *c = created;
            *u = now;
        }
    }

    /// Short human-readable label
    pub fn label(&self) -> String {
        match self {
            Self::Author(r) => r.to_string(),
            Self::Book(r) => r.title.clone(),
            Self::Person(r) | Self::TimekeeperPerson(r) => r.to_string(),
            Self::Tag(r) => r.name.clone(),
            Self::Language(r) => r.name.clone(),
            Self::Snippet(r) => r.title.clone().unwrap_or_default(),
            Self::TimekeeperPlace(r) => r.name.clone().unwrap_or_default(),
            Self::TimekeeperActivity(r) => r.title.clone().unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_kind_round_trips_through_str() {
        for kind in EntityKind::ALL {
            let parsed: EntityKind = kind.as_str().parse().unwrap();
            assert_eq!(parsed, kind);
        }
        assert!("widget".parse::<EntityKind>().is_err());
    }

    #[test]
    fn test_record_serde_uses_kind_tag() {
        let record = Record::Book(Book::new("Charlotte's Web", Author::new("E. B.", "White")));
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "book");
        assert_eq!(json["author"]["last_name"], "White");

        let back: Record = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_partial_record_json_uses_defaults() {
        let record: Record =
            serde_json::from_str(r#"{"kind": "book", "title": "Stuart Little", "author": {"id": 3}}"#)
                .unwrap();
        match record {
            Record::Book(book) => {
                assert_eq!(book.author.id, 3);
                assert!(book.author.last_name.is_empty());
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_touch_keeps_created_from_previous() {
        let first = Utc.with_ymd_and_hms(2014, 4, 25, 21, 32, 0).unwrap();
        let later = Utc.with_ymd_and_hms(2014, 4, 26, 8, 0, 0).unwrap();

        let mut stored = Record::Tag(Tag::new("python"));
        stored.touch(first, None);
        stored.set_item_id(1);

        let mut edited = Record::Tag(Tag {
            id: 1,
            name: "python3".into(),
            ..Default::default()
        });
        edited.touch(later, Some(&stored));

        match edited {
            Record::Tag(tag) => {
                assert_eq!(tag.created, first);
                assert_eq!(tag.updated, later);
            }
            other => panic!("unexpected record {:?}", other),
        }
    }

    #[test]
    fn test_touch_ignores_untimestamped_kinds() {
        let mut record = Record::Author(Author::new("E. B.", "White"));
        record.touch(Utc::now(), None);
        assert_eq!(record.created(), None);
    }
}
