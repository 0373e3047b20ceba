//! Apache Solr backend over HTTP
//!
//! Talks to one Solr core through its JSON request handlers:
//! `/select` for lookups, queries and facets, `/update` for deletes, adds
//! and commits.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

use quill_core::document::{is_reserved, Scalar};
use quill_core::{DocumentKey, FacetCounts, FieldValue, SearchDocument};

use crate::traits::{DeleteQuery, Result, SearchError, SearchIndex};

/// Page size used when collecting every match of a lookup
const FIND_PAGE_SIZE: usize = 500;

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: DocList,
    #[serde(default)]
    facet_counts: Option<FacetBlock>,
}

#[derive(Debug, Deserialize)]
struct DocList {
    #[serde(rename = "numFound")]
    num_found: usize,
    #[serde(default)]
    docs: Vec<serde_json::Map<String, serde_json::Value>>,
}

#[derive(Debug, Deserialize)]
struct FacetBlock {
    #[serde(default)]
    facet_fields: BTreeMap<String, Vec<serde_json::Value>>,
}

/// Search index hosted by a Solr core
pub struct SolrIndex {
    client: reqwest::Client,
    base_url: String,
}

impl SolrIndex {
    /// `base_url` is the core URL, e.g. `http://localhost:8983/solr/quill`
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn select(&self, params: &[(&str, String)]) -> Result<SelectResponse> {
        let response = self
            .client
            .get(format!("{}/select", self.base_url))
            .query(params)
            .query(&[("wt", "json")])
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        response
            .json()
            .await
            .map_err(|e| SearchError::Index(format!("Unexpected Solr response: {}", e)))
    }

    async fn update(&self, body: serde_json::Value) -> Result<()> {
        let response = self
            .client
            .post(format!("{}/update", self.base_url))
            .query(&[("wt", "json")])
            .json(&body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response).await?;
        Ok(())
    }
}

fn transport_error(err: reqwest::Error) -> SearchError {
    SearchError::IndexUnavailable(err.to_string())
}

/// 5xx means the service is unhealthy; 4xx means the request was wrong
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    if status.is_server_error() {
        Err(SearchError::IndexUnavailable(format!("Solr error {}: {}", status, body)))
    } else {
        Err(SearchError::Query(format!("Solr error {}: {}", status, body)))
    }
}

/// Quote a value for use in a Solr field clause
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn key_clauses(key: &DocumentKey) -> (String, String) {
    (format!("type:{}", quote(&key.doc_type)), format!("item_id:{}", key.item_id))
}

fn scalar_from_json(value: &serde_json::Value) -> Option<Scalar> {
    match value {
        serde_json::Value::Bool(b) => Some(Scalar::Bool(*b)),
        serde_json::Value::Number(n) => n.as_i64().map(Scalar::Int).or_else(|| n.as_f64().map(Scalar::Float)),
        serde_json::Value::String(s) => Some(Scalar::Text(s.clone())),
        _ => None,
    }
}

/// Convert a stored Solr document, dropping Solr's internal fields.
///
/// Schemaless cores return most fields as one-element arrays; the reserved
/// fields are unwrapped so the document key survives the trip.
fn document_from_solr(raw: serde_json::Map<String, serde_json::Value>) -> SearchDocument {
    let mut fields = BTreeMap::new();
    for (name, value) in raw {
        if name.starts_with('_') {
            continue;
        }
        let field = match &value {
            serde_json::Value::Array(items) => {
                let scalars: Vec<Scalar> = items.iter().filter_map(scalar_from_json).collect();
                match scalars.as_slice() {
                    [single] if is_reserved(&name) => FieldValue::Scalar(single.clone()),
                    _ => FieldValue::List(scalars),
                }
            }
            other => match scalar_from_json(other) {
                Some(s) => FieldValue::Scalar(s),
                None => continue,
            },
        };
        fields.insert(name, field);
    }
    let mut document = SearchDocument::from_fields(fields);
    if let Some(item_id) = document.item_id() {
        document.set(quill_core::document::ITEM_ID_FIELD, item_id);
    }
    document
}

/// Solr returns facet values as a flat `[value, count, value, count, ...]` list
fn parse_facet_pairs(flat: &[serde_json::Value]) -> BTreeMap<String, u64> {
    flat.chunks(2)
        .filter_map(|pair| match pair {
            [value, count] => {
                let count = count.as_u64()?;
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (count > 0).then_some((value, count))
            }
            _ => None,
        })
        .collect()
}

#[async_trait]
impl SearchIndex for SolrIndex {
    fn name(&self) -> &'static str {
        "solr"
    }

    async fn find(&self, key: &DocumentKey) -> Result<Vec<SearchDocument>> {
        let (type_clause, item_clause) = key_clauses(key);
        let mut documents = Vec::new();
        loop {
            let page = self
                .select(&[
                    ("q", "*:*".to_string()),
                    ("fq", type_clause.clone()),
                    ("fq", item_clause.clone()),
                    ("start", documents.len().to_string()),
                    ("rows", FIND_PAGE_SIZE.to_string()),
                ])
                .await?;
            let fetched = page.response.docs.len();
            documents.extend(page.response.docs.into_iter().map(document_from_solr));
            if fetched == 0 || documents.len() >= page.response.num_found {
                break;
            }
        }
        Ok(documents)
    }

    async fn delete_by_id(&self, id: &str) -> Result<()> {
        self.update(serde_json::json!({ "delete": { "id": id } })).await
    }

    async fn delete_by_query(&self, query: &DeleteQuery) -> Result<()> {
        let q = match query {
            DeleteQuery::All => "*:*".to_string(),
            DeleteQuery::Key(key) => {
                let (type_clause, item_clause) = key_clauses(key);
                format!("{} AND {}", type_clause, item_clause)
            }
        };
        self.update(serde_json::json!({ "delete": { "query": q } })).await
    }

    async fn add(&self, document: &SearchDocument) -> Result<()> {
        document.validate()?;
        if document.id().is_none() {
            return Err(SearchError::MalformedDocument("document has no 'id'".to_string()));
        }
        self.update(serde_json::Value::Array(vec![serde_json::to_value(document)?]))
            .await
    }

    async fn commit(&self) -> Result<()> {
        self.update(serde_json::json!({ "commit": {} })).await
    }

    async fn query(
        &self,
        text: &str,
        return_fields: Option<&[String]>,
        rows: usize,
    ) -> Result<Vec<SearchDocument>> {
        let mut params = vec![("q", text.to_string()), ("rows", rows.to_string())];
        if let Some(fields) = return_fields {
            params.push(("fl", fields.join(",")));
        }
        let response = self.select(&params).await?;
        debug!(query = text, found = response.response.num_found, "Solr query");

        Ok(response
            .response
            .docs
            .into_iter()
            .map(document_from_solr)
            .map(|doc| match return_fields {
                Some(fields) => doc.project(fields),
                None => doc,
            })
            .collect())
    }

    async fn facet_counts(&self, fields: &[String]) -> Result<FacetCounts> {
        let mut params = vec![
            ("q", "*:*".to_string()),
            ("rows", "0".to_string()),
            ("facet", "true".to_string()),
            ("facet.mincount", "1".to_string()),
            ("facet.limit", "-1".to_string()),
        ];
        params.extend(fields.iter().map(|f| ("facet.field", f.clone())));

        let response = self.select(&params).await?;
        let mut returned = response.facet_counts.map(|f| f.facet_fields).unwrap_or_default();

        Ok(fields
            .iter()
            .map(|field| {
                let counts = returned
                    .remove(field)
                    .map(|flat| parse_facet_pairs(&flat))
                    .unwrap_or_default();
                (field.clone(), counts)
            })
            .collect())
    }

    async fn health_check(&self) -> Result<bool> {
        let response = self
            .client
            .get(format!("{}/admin/ping", self.base_url))
            .query(&[("wt", "json")])
            .send()
            .await
            .map_err(transport_error)?;
        let response = check_status(response).await?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| SearchError::Index(format!("Unexpected Solr response: {}", e)))?;
        Ok(body.get("status").and_then(|s| s.as_str()) == Some("OK"))
    }
}
