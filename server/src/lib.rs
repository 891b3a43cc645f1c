use axum::{extract::{Query, State}, http::StatusCode, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use sift_core::report::{top_keywords, REPORT_KEYWORDS};
use sift_crawler::CrawlError;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub mod pipeline;
pub mod query;
pub mod retrieval;

use pipeline::SearchEngine;
use retrieval::{ScoredHit, SearchHit};

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    pub start_url: Option<String>,
    pub max_pages: Option<usize>,
    #[serde(default = "default_k")]
    pub k: usize,
}
fn default_k() -> usize { 10 }

#[derive(Deserialize)]
pub struct PageParams {
    pub url: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub took_s: f64,
    pub total_hits: usize,
    pub results: Vec<ResultItem>,
}

#[derive(Serialize)]
pub struct ResultItem {
    pub url: String,
    pub score: f64,
    pub title: Option<String>,
    pub last_modified: Option<String>,
    pub size_bytes: Option<u64>,
}

impl From<&ScoredHit> for ResultItem {
    fn from(scored: &ScoredHit) -> Self {
        let page = scored.hit.page();
        ResultItem {
            url: scored.hit.url().to_string(),
            score: scored.score,
            title: page.map(|p| p.title.clone()),
            last_modified: page.and_then(|p| p.last_modified.format(&Rfc3339).ok()),
            size_bytes: page.map(|p| p.size_bytes),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<SearchEngine>,
    pub default_start_url: Option<String>,
    pub default_max_pages: usize,
}

pub fn build_app(state: AppState) -> Router {
    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val
                .split(',')
                .filter_map(|s| s.trim().parse().ok())
                .collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/search", get(search_handler))
        .route("/page", get(page_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn status_for(e: &anyhow::Error) -> StatusCode {
    match e.downcast_ref::<CrawlError>() {
        Some(CrawlError::InvalidStartUrl { .. }) => StatusCode::BAD_REQUEST,
        Some(CrawlError::StartPageMissing { .. }) => StatusCode::BAD_GATEWAY,
        None => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>, (StatusCode, String)> {
    let start = std::time::Instant::now();
    let Some(start_url) = params.start_url.or(state.default_start_url) else {
        return Err((StatusCode::BAD_REQUEST, "start_url is required".into()));
    };
    let max_pages = params.max_pages.unwrap_or(state.default_max_pages).max(1);
    let k = params.k.clamp(1, 100);

    let hits = state.engine.search(&params.q, &start_url, max_pages, k).await.map_err(|e| {
        tracing::error!(error = %e, %start_url, "search failed");
        (status_for(&e), e.to_string())
    })?;
    let results: Vec<ResultItem> = hits.iter().map(ResultItem::from).collect();
    Ok(Json(SearchResponse {
        query: params.q,
        took_s: start.elapsed().as_secs_f64(),
        total_hits: results.len(),
        results,
    }))
}

pub async fn page_handler(
    State(state): State<AppState>,
    Query(params): Query<PageParams>,
) -> Result<Json<serde_json::Value>, (StatusCode, Json<serde_json::Value>)> {
    match state.engine.lookup(&params.url).await {
        SearchHit::Page(page) => {
            let keywords = top_keywords(&page, state.engine.analyzer(), REPORT_KEYWORDS);
            Ok(Json(serde_json::json!({
                "url": page.url,
                "title": page.title,
                "last_modified": page.last_modified.format(&Rfc3339).ok(),
                "size_bytes": page.size_bytes,
                "keywords": keywords,
                "parent_links": page.parent_links,
                "child_links": page.child_links,
            })))
        }
        SearchHit::Url(url) => Err((StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not found", "url": url })))),
    }
}
