//! Query types for searching the index

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::document::SearchDocument;

/// Facet field -> (value -> number of documents holding that value)
pub type FacetCounts = BTreeMap<String, BTreeMap<String, u64>>;

/// A search request as received from the query boundary
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text or field-scoped (`field:value`) query
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Restrict returned documents to these fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_fields: Option<Vec<String>>,

    /// Fields to compute facet counts for
    #[serde(default)]
    pub facet_fields: Vec<String>,

    /// Maximum number of documents to return
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<usize>,
}

impl SearchRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Default::default()
        }
    }

    /// A request without query text (facet browsing)
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_return_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.return_fields = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_facet(mut self, field: impl Into<String>) -> Self {
        self.facet_fields.push(field.into());
        self
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = Some(rows);
        self
    }

    /// Trimmed query text; `None` when absent or blank
    pub fn query_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// What the query boundary hands back
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    pub results: Vec<SearchDocument>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<FacetCounts>,

    /// Set when the index could not answer; `results` is then empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SearchResponse {
    pub fn new(results: Vec<SearchDocument>) -> Self {
        Self {
            results,
            ..Default::default()
        }
    }

    pub fn with_facets(mut self, facets: FacetCounts) -> Self {
        self.facets = Some(facets);
        self
    }

    /// Empty results carrying an error indicator
    pub fn degraded(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Default::default()
        }
    }

    pub fn is_degraded(&self) -> bool {
        self.error.is_some()
    }
}

/// Count, per facet field, how many documents hold each distinct value.
///
/// A value repeated inside one document's list counts once for that
/// document. Every requested field is present in the output.
pub fn count_facets<'a, I>(documents: I, fields: &[String]) -> FacetCounts
where
    I: IntoIterator<Item = &'a SearchDocument>,
{
    let mut counts: FacetCounts = fields
        .iter()
        .map(|f| (f.clone(), BTreeMap::new()))
        .collect();

    for doc in documents {
        for field in fields {
            let Some(value) = doc.get(field) else {
                continue;
            };
            let distinct: BTreeSet<String> = value.scalars().iter().map(|s| s.to_text()).collect();
            if let Some(per_value) = counts.get_mut(field) {
                for v in distinct {
                    *per_value.entry(v).or_insert(0) += 1;
                }
            }
        }
    }

    counts
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_text_trims_blank() {
        assert_eq!(SearchRequest::new("  white ").query_text(), Some("white"));
        assert_eq!(SearchRequest::new("   ").query_text(), None);
        assert_eq!(SearchRequest::empty().query_text(), None);
    }

    #[test]
    fn test_request_builder() {
        let request = SearchRequest::new("web")
            .with_return_fields(["title_s", "type"])
            .with_facet("name")
            .with_rows(5);
        assert_eq!(request.return_fields.as_ref().map(Vec::len), Some(2));
        assert_eq!(request.facet_fields, vec!["name".to_string()]);
        assert_eq!(request.rows, Some(5));
    }

    #[test]
    fn test_count_facets() {
        let docs = vec![
            SearchDocument::new("tag", 1).with("name", "python"),
            SearchDocument::new("tag", 2).with("name", "python"),
            SearchDocument::new("tag", 3).with("name", "cli"),
            SearchDocument::new("snippet", 4)
                .with("tags", vec!["cli".to_string(), "cli".to_string()]),
        ];
        let fields = vec!["name".to_string(), "tags".to_string(), "title".to_string()];
        let counts = count_facets(&docs, &fields);

        assert_eq!(counts["name"]["python"], 2);
        assert_eq!(counts["name"]["cli"], 1);
        assert_eq!(counts["tags"]["cli"], 1);
        assert!(counts["title"].is_empty());
    }

    #[test]
    fn test_degraded_response_serializes_error() {
        let json = serde_json::to_value(SearchResponse::degraded("index unavailable")).unwrap();
        assert_eq!(json["results"], serde_json::json!([]));
        assert_eq!(json["error"], "index unavailable");
        assert!(json.get("facets").is_none());
    }
}
