//! Output formatting utilities

use quill_core::{FacetCounts, FieldValue, Record, SearchDocument};
use serde::Serialize;

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

impl From<&str> for OutputFormat {
    fn from(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Table,
        }
    }
}

pub fn to_json<T: Serialize>(data: &T) -> String {
    serde_json::to_string_pretty(data).unwrap_or_else(|_| "{}".to_string())
}

fn render_value(value: &FieldValue) -> String {
    match value {
        FieldValue::Scalar(s) => s.to_text(),
        FieldValue::List(items) => format!(
            "[{}]",
            items.iter().map(|s| s.to_text()).collect::<Vec<_>>().join(", ")
        ),
    }
}

/// One line per document: its key, then every other field
pub fn document_line(doc: &SearchDocument) -> String {
    let key = match doc.key() {
        Some(key) => key.to_string(),
        None => "-".to_string(),
    };
    let fields: Vec<String> = doc
        .fields()
        .iter()
        .filter(|(name, _)| !quill_core::document::is_reserved(name))
        .map(|(name, value)| format!("{}={}", name, render_value(value)))
        .collect();
    if fields.is_empty() {
        key
    } else {
        format!("{}  {}", key, fields.join("  "))
    }
}

pub fn facet_lines(facets: &FacetCounts) -> Vec<String> {
    let mut lines = Vec::new();
    for (field, counts) in facets {
        lines.push(format!("{}:", field));
        if counts.is_empty() {
            lines.push("  (none)".to_string());
        }
        for (value, count) in counts {
            lines.push(format!("  {} ({})", value, count));
        }
    }
    lines
}

pub fn record_line(record: &Record) -> String {
    format!("{} {}  {}", record.kind(), record.item_id(), record.label())
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_core::{Scalar, Tag};

    #[test]
    fn test_document_line() {
        let doc = SearchDocument::new("snippet", 4)
            .with("title", "hello")
            .with("tags", FieldValue::List(vec![Scalar::from("python"), Scalar::from("cli")]));
        assert_eq!(document_line(&doc), "snippet/4  tags=[python, cli]  title=hello");
    }

    #[test]
    fn test_record_line() {
        let mut tag = Tag::new("rust");
        tag.id = 2;
        assert_eq!(record_line(&Record::Tag(tag)), "tag 2  rust");
    }
}
