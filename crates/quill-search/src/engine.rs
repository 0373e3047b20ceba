//! Query engine: free-text search and facets
//!
//! Reads see committed state only, and a commit may take a moment to show
//! up on backends that refresh their readers asynchronously. That lag is
//! accepted; it is not reported as an error.

use quill_core::document::validate_field_name;
use quill_core::{FacetCounts, SearchDocument, SearchRequest, SearchResponse};
use tracing::{debug, warn};

use crate::error::{SearchError, SearchResult};
use crate::gateway::IndexGateway;

/// Rows returned when a request does not say
pub const DEFAULT_ROWS: usize = 10;

/// Upper bound on rows per query, whatever the caller asks for
pub const MAX_ROWS: usize = 1000;

#[derive(Debug, Clone)]
pub struct QueryEngine {
    gateway: IndexGateway,
    rows: usize,
}

fn check_fields(fields: &[String]) -> SearchResult<()> {
    for field in fields {
        validate_field_name(field).map_err(|e| SearchError::Query(e.to_string()))?;
    }
    Ok(())
}

impl QueryEngine {
    pub fn new(gateway: IndexGateway) -> Self {
        Self {
            gateway,
            rows: DEFAULT_ROWS,
        }
    }

    pub fn with_rows(mut self, rows: usize) -> Self {
        self.rows = rows.min(MAX_ROWS);
        self
    }

    pub fn gateway(&self) -> &IndexGateway {
        &self.gateway
    }

    /// Run a query. Blank text returns nothing without contacting the index.
    pub async fn try_search(&self, request: &SearchRequest) -> SearchResult<Vec<SearchDocument>> {
        let Some(text) = request.query_text() else {
            debug!("Empty query, index not contacted");
            return Ok(Vec::new());
        };
        if let Some(fields) = &request.return_fields {
            check_fields(fields)?;
        }

        let rows = request.rows.unwrap_or(self.rows).min(MAX_ROWS);
        self.gateway
            .query(text, request.return_fields.as_deref(), rows)
            .await
    }

    /// Run a query and count facets over the whole index. The facet counts
    /// do not depend on the query text.
    pub async fn try_search_with_facets(
        &self,
        request: &SearchRequest,
    ) -> SearchResult<(Vec<SearchDocument>, FacetCounts)> {
        check_fields(&request.facet_fields)?;
        let results = self.try_search(request).await?;
        let facets = if request.facet_fields.is_empty() {
            FacetCounts::new()
        } else {
            self.gateway.facet_counts(&request.facet_fields).await?
        };
        Ok((results, facets))
    }

    /// Search for the query boundary: index failures come back as an empty
    /// result list carrying the error.
    pub async fn search(&self, text: Option<&str>, return_fields: Option<&[String]>) -> SearchResponse {
        let mut request = SearchRequest {
            text: text.map(str::to_string),
            ..Default::default()
        };
        if let Some(fields) = return_fields {
            request = request.with_return_fields(fields.iter().cloned());
        }
        self.execute(&request).await
    }

    /// Faceted search for the query boundary, degrading like [`search`](Self::search)
    pub async fn search_with_facets(&self, text: Option<&str>, facet_fields: &[String]) -> SearchResponse {
        let request = SearchRequest {
            text: text.map(str::to_string),
            facet_fields: facet_fields.to_vec(),
            ..Default::default()
        };
        self.execute_with_facets(&request).await
    }

    /// Answer a full request without facets
    pub async fn execute(&self, request: &SearchRequest) -> SearchResponse {
        match self.try_search(request).await {
            Ok(results) => SearchResponse::new(results),
            Err(e) => {
                warn!(error = %e, "Search failed");
                SearchResponse::degraded(e.to_string())
            }
        }
    }

    /// Answer a full request including facet counts
    pub async fn execute_with_facets(&self, request: &SearchRequest) -> SearchResponse {
        match self.try_search_with_facets(request).await {
            Ok((results, facets)) => SearchResponse::new(results).with_facets(facets),
            Err(e) => {
                warn!(error = %e, "Faceted search failed");
                SearchResponse::degraded(e.to_string())
            }
        }
    }
}
