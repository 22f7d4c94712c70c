use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use prashna_rag::search::{Bm25Index, IndexReceipt, LexicalIndex, SearchRequest, SearchResults};
use prashna_rag::types::ChunkRecord;

use crate::error::{ApiError, ApiResult};

const DEFAULT_TOP_K: usize = 10;

#[derive(Clone)]
pub struct SearchState {
    pub index: Arc<Bm25Index>,
    pub opensearch_url: String,
}

pub fn router(state: SearchState) -> Router {
    Router::new()
        .route("/search", post(search))
        .route("/index", post(index))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn search(
    State(state): State<SearchState>,
    Json(request): Json<SearchRequest>,
) -> ApiResult<Json<SearchResults>> {
    if request.query.trim().is_empty() {
        return Err(ApiError::bad_request("query must not be empty"));
    }

    let hits = state
        .index
        .search(
            &request.query,
            request.top_k.unwrap_or(DEFAULT_TOP_K),
            request.document_ids.as_deref(),
            request.sources.as_deref(),
        )
        .await?;

    Ok(Json(SearchResults {
        total: hits.len(),
        hits,
    }))
}

async fn index(
    State(state): State<SearchState>,
    Json(chunk): Json<ChunkRecord>,
) -> ApiResult<Json<IndexReceipt>> {
    if chunk.document_id.trim().is_empty() {
        return Err(ApiError::bad_request("document_id must not be empty"));
    }
    if chunk.text.trim().is_empty() {
        return Err(ApiError::bad_request("text must not be empty"));
    }

    let receipt = state.index.index(&chunk).await?;
    Ok(Json(receipt))
}

async fn health(State(state): State<SearchState>) -> Json<Value> {
    let reachable = state.index.ping().await;
    Json(json!({
        "status": "ok",
        "index": state.index.index_name(),
        "opensearch": {
            "url": state.opensearch_url,
            "reachable": reachable,
        },
    }))
}
