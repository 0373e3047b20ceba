//! Flat search documents
//!
//! A search document is a map of field name to a scalar or a list of
//! scalars. Three field names are reserved: `id` (index-internal, fresh on
//! every add), `type` (entity kind discriminator) and `item_id` (the owning
//! record's primary key).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use ulid::Ulid;

use crate::error::{Error, Result};
use crate::model::EntityKind;

/// Index-internal document id field
pub const ID_FIELD: &str = "id";

/// Entity kind discriminator field
pub const TYPE_FIELD: &str = "type";

/// Primary key of the owning record
pub const ITEM_ID_FIELD: &str = "item_id";

/// Maximum field name length (64 chars)
pub const MAX_FIELD_NAME_LEN: usize = 64;

/// Index-internal document identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(pub Ulid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Ulid::new())
    }

    pub fn from_string(s: &str) -> std::result::Result<Self, ulid::DecodeError> {
        Ok(Self(Ulid::from_string(s)?))
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The (type, item_id) pair identifying the record a document belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey {
    pub doc_type: String,
    pub item_id: i64,
}

impl DocumentKey {
    pub fn new(doc_type: impl Into<String>, item_id: i64) -> Self {
        Self {
            doc_type: doc_type.into(),
            item_id,
        }
    }

    pub fn for_kind(kind: EntityKind, item_id: i64) -> Self {
        Self::new(kind.as_str(), item_id)
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.doc_type, self.item_id)
    }
}

/// A single scalar field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Rendering used for facet values and the catch-all text field
    pub fn to_text(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Int(i) => i.to_string(),
            Self::Float(f) => f.to_string(),
            Self::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Scalar {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<i64> for Scalar {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Scalar {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// A field value: one scalar or a flat list of scalars
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

impl FieldValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Scalar(s) => s.as_str(),
            Self::List(_) => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Scalar(Scalar::Int(i)) => Some(*i),
            Self::Scalar(Scalar::Text(s)) => s.parse().ok(),
            _ => None,
        }
    }

    /// The scalars held by this value, one for a scalar field
    pub fn scalars(&self) -> &[Scalar] {
        match self {
            Self::Scalar(s) => std::slice::from_ref(s),
            Self::List(items) => items,
        }
    }
}

impl From<Scalar> for FieldValue {
    fn from(value: Scalar) -> Self {
        Self::Scalar(value)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        Self::Scalar(s.into())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        Self::Scalar(s.into())
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        Self::Scalar(i.into())
    }
}

impl From<f64> for FieldValue {
    fn from(f: f64) -> Self {
        Self::Scalar(f.into())
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        Self::Scalar(b.into())
    }
}

impl From<Vec<Scalar>> for FieldValue {
    fn from(items: Vec<Scalar>) -> Self {
        Self::List(items)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(items: Vec<String>) -> Self {
        Self::List(items.into_iter().map(Scalar::Text).collect())
    }
}

/// A flat, denormalized search document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchDocument {
    fields: BTreeMap<String, FieldValue>,
}

impl SearchDocument {
    /// Start a document for a record of the given type
    pub fn new(doc_type: impl Into<String>, item_id: i64) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(TYPE_FIELD.to_string(), FieldValue::from(doc_type.into()));
        fields.insert(ITEM_ID_FIELD.to_string(), FieldValue::from(item_id));
        Self { fields }
    }

    pub fn for_kind(kind: EntityKind, item_id: i64) -> Self {
        Self::new(kind.as_str(), item_id)
    }

    /// Wrap an arbitrary field map; nothing is checked until [`validate`](Self::validate)
    pub fn from_fields(fields: BTreeMap<String, FieldValue>) -> Self {
        Self { fields }
    }

    /// Builder-style setter
    pub fn with(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.set(name, value);
        self
    }

    /// Builder-style setter that skips `None`
    pub fn with_opt<V: Into<FieldValue>>(mut self, name: impl Into<String>, value: Option<V>) -> Self {
        if let Some(value) = value {
            self.set(name, value);
        }
        self
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(name.into(), value.into());
    }

    pub fn remove(&mut self, name: &str) -> Option<FieldValue> {
        self.fields.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn fields(&self) -> &BTreeMap<String, FieldValue> {
        &self.fields
    }

    pub fn into_fields(self) -> BTreeMap<String, FieldValue> {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn doc_type(&self) -> Option<&str> {
        self.get(TYPE_FIELD).and_then(FieldValue::as_str)
    }

    pub fn item_id(&self) -> Option<i64> {
        self.get(ITEM_ID_FIELD).and_then(FieldValue::as_i64)
    }

    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(FieldValue::as_str)
    }

    pub fn set_id(&mut self, id: &DocumentId) {
        self.set(ID_FIELD, id.to_string());
    }

    /// The (type, item_id) key, if both fields are present
    pub fn key(&self) -> Option<DocumentKey> {
        Some(DocumentKey::new(self.doc_type()?, self.item_id()?))
    }

    /// Check the document is safe to hand to an index.
    ///
    /// `type` must be a non-empty string, `item_id` an integer, and every
    /// field name a short identifier so it can appear in field-scoped
    /// queries.
    pub fn validate(&self) -> Result<DocumentKey> {
        let doc_type = match self.get(TYPE_FIELD) {
            Some(FieldValue::Scalar(Scalar::Text(t))) if !t.trim().is_empty() => t.clone(),
            Some(_) => {
                return Err(Error::MalformedDocument(format!(
                    "'{}' must be a non-empty string",
                    TYPE_FIELD
                )))
            }
            None => {
                return Err(Error::MalformedDocument(format!(
                    "missing required field '{}'",
                    TYPE_FIELD
                )))
            }
        };

        let item_id = match self.get(ITEM_ID_FIELD) {
            Some(FieldValue::Scalar(Scalar::Int(i))) => *i,
            Some(_) => {
                return Err(Error::MalformedDocument(format!(
                    "'{}' must be an integer",
                    ITEM_ID_FIELD
                )))
            }
            None => {
                return Err(Error::MalformedDocument(format!(
                    "missing required field '{}'",
                    ITEM_ID_FIELD
                )))
            }
        };

        for name in self.fields.keys() {
            validate_field_name(name)?;
        }

        Ok(DocumentKey::new(doc_type, item_id))
    }

    /// Keep only the named fields
    pub fn project(&self, names: &[String]) -> SearchDocument {
        let fields = self
            .fields
            .iter()
            .filter(|(name, _)| names.iter().any(|n| n == *name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Self { fields }
    }

    /// String values of every non-reserved field, for catch-all text search
    pub fn text_values(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(name, _)| !is_reserved(name))
            .flat_map(|(_, value)| value.scalars())
            .filter_map(Scalar::as_str)
    }
}

/// Whether a field name is one of the reserved document fields
pub fn is_reserved(name: &str) -> bool {
    matches!(name, ID_FIELD | TYPE_FIELD | ITEM_ID_FIELD)
}

/// Field names are ASCII identifiers: letters, digits and underscores
pub fn validate_field_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::MalformedDocument("empty field name".to_string()));
    }
    if name.len() > MAX_FIELD_NAME_LEN {
        return Err(Error::MalformedDocument(format!(
            "field name too long: {} chars (max {})",
            name.len(),
            MAX_FIELD_NAME_LEN
        )));
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(Error::MalformedDocument(format!("invalid field name '{}'", name)));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_sets_reserved_fields() {
        let doc = SearchDocument::new("book", 7).with("title_s", "Charlotte's Web");
        assert_eq!(doc.doc_type(), Some("book"));
        assert_eq!(doc.item_id(), Some(7));
        assert_eq!(doc.id(), None);
        assert_eq!(doc.key(), Some(DocumentKey::new("book", 7)));
    }

    #[test]
    fn test_validate_rejects_missing_item_id() {
        let mut doc = SearchDocument::new("book", 7);
        doc.remove(ITEM_ID_FIELD);
        let err = doc.validate().unwrap_err();
        assert!(matches!(err, Error::MalformedDocument(_)));
    }

    #[test]
    fn test_validate_rejects_textual_item_id_and_bad_names() {
        let doc = SearchDocument::new("book", 1).with(ITEM_ID_FIELD, "1");
        assert!(doc.validate().is_err());

        let doc = SearchDocument::new("book", 1).with("title:s", "x");
        assert!(doc.validate().is_err());

        let doc = SearchDocument::new("  ", 1);
        assert!(doc.validate().is_err());
    }

    #[test]
    fn test_serializes_flat() {
        let doc = SearchDocument::new("snippet", 3)
            .with("tags", vec!["python".to_string(), "cli".to_string()])
            .with("latitude_coordinate", 51.5);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["type"], "snippet");
        assert_eq!(json["item_id"], 3);
        assert_eq!(json["tags"], serde_json::json!(["python", "cli"]));

        let back: SearchDocument = serde_json::from_value(json).unwrap();
        assert_eq!(back, doc);
    }

    #[test]
    fn test_project_and_text_values() {
        let doc = SearchDocument::new("book", 1)
            .with("title_s", "Stuart Little")
            .with("author_s", "White");

        let projected = doc.project(&["title_s".to_string(), "type".to_string()]);
        assert_eq!(projected.len(), 2);
        assert!(projected.get("author_s").is_none());

        let mut text: Vec<&str> = doc.text_values().collect();
        text.sort();
        assert_eq!(text, vec!["Stuart Little", "White"]);
    }
}
