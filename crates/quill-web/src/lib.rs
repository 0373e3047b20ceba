//! Quill Web - HTTP query boundary
//!
//! `GET /search?q=…&fl=a,b` and `GET /search/facets?q=…&facets=name,title`
//! answer with the search response as JSON. An index failure still answers
//! 200, with empty `results` and an `error` string. `GET /health` reports
//! the backend and the reconciliation backlog.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, Method},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use quill_core::{SearchRequest, SearchResponse};
use quill_search::{IndexingService, QueryEngine};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;

/// Maximum request body size (64KB); every route is a GET
const MAX_BODY_SIZE: usize = 64 * 1024;

/// Shared handler state
pub struct AppState {
    pub engine: QueryEngine,
    /// Present when this process also writes, for the reconciliation backlog
    pub indexing: Option<IndexingService>,
    /// Facet fields used when a request names none
    pub default_facets: Vec<String>,
}

impl AppState {
    pub fn new(engine: QueryEngine) -> Self {
        Self {
            engine,
            indexing: None,
            default_facets: Vec::new(),
        }
    }

    pub fn with_indexing(mut self, indexing: IndexingService) -> Self {
        self.indexing = Some(indexing);
        self
    }

    pub fn with_default_facets(mut self, fields: Vec<String>) -> Self {
        self.default_facets = fields;
        self
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    /// Comma-separated return fields
    pub fl: Option<String>,
    /// Comma-separated facet fields
    pub facets: Option<String>,
    pub rows: Option<usize>,
}

fn split_list(value: Option<&str>) -> Option<Vec<String>> {
    value.map(|v| {
        v.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
}

impl SearchParams {
    fn to_request(&self) -> SearchRequest {
        SearchRequest {
            text: self.q.clone(),
            return_fields: split_list(self.fl.as_deref()),
            facet_fields: split_list(self.facets.as_deref()).unwrap_or_default(),
            rows: self.rows,
        }
    }
}

/// Create the query router
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin([
            HeaderValue::from_static("http://localhost:3000"),
            HeaderValue::from_static("http://127.0.0.1:3000"),
            HeaderValue::from_static("http://localhost:8080"),
            HeaderValue::from_static("http://127.0.0.1:8080"),
        ])
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/search", get(search_handler))
        .route("/search/facets", get(facets_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

async fn search_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let request = params.to_request();
    Json(state.engine.execute(&request).await)
}

async fn facets_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Json<SearchResponse> {
    let mut request = params.to_request();
    if request.facet_fields.is_empty() {
        request.facet_fields = state.default_facets.clone();
    }
    Json(state.engine.execute_with_facets(&request).await)
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let gateway = state.engine.gateway();
    let (healthy, error) = match gateway.health_check().await {
        Ok(ok) => (ok, None),
        Err(e) => (false, Some(e.to_string())),
    };
    let pending = state.indexing.as_ref().map(IndexingService::pending_count);

    Json(serde_json::json!({
        "status": if healthy { "ok" } else { "degraded" },
        "server": "quill-web",
        "version": env!("CARGO_PKG_VERSION"),
        "backend": gateway.backend(),
        "error": error,
        "pending_reconciliation": pending,
    }))
}

/// Run the HTTP server
pub async fn serve(state: Arc<AppState>, addr: &str) -> anyhow::Result<()> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Quill search server listening on {}", addr);
    tracing::info!("  Search: http://{}/search?q=", addr);
    tracing::info!("  Facets: http://{}/search/facets?facets=name", addr);
    tracing::info!("  Health check: http://{}/health", addr);

    axum::serve(listener, router).await?;

    Ok(())
}
