//! Code keeper records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::person::Person;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Tag {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Language {
    pub id: i64,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Language {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// A code snippet with its tags and creator embedded
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Snippet {
    pub id: i64,
    pub title: Option<String>,
    pub snippet: String,
    pub tags: Vec<Tag>,
    pub creator: Person,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Snippet {
    pub fn new(title: impl Into<String>, snippet: impl Into<String>, creator: Person) -> Self {
        Self {
            title: Some(title.into()),
            snippet: snippet.into(),
            creator,
            ..Default::default()
        }
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tags.push(tag);
        self
    }
}
