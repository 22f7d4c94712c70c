use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use prashna_rag::types::Answer;
use prashna_rag::QueryEngine;

use crate::error::ApiResult;

const DEFAULT_TOP_K: usize = 5;

#[derive(Clone)]
pub struct QueryState {
    pub engine: Arc<QueryEngine>,
    pub chat_model: String,
    pub search_service: String,
}

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub question: String,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub model_name: Option<String>,
    #[serde(default)]
    pub document_id: Option<String>,
}

pub fn router(state: QueryState) -> Router {
    Router::new()
        .route("/query", post(query))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn query(
    State(state): State<QueryState>,
    Json(request): Json<QueryRequest>,
) -> ApiResult<Json<Answer>> {
    // Question length and top_k range checks live in the engine and come
    // back as validation errors, which map to 400 here.
    let answer = state
        .engine
        .answer(
            &request.question,
            request.top_k.unwrap_or(DEFAULT_TOP_K),
            request.model_name.as_deref(),
            request.document_id.as_deref(),
        )
        .await?;

    Ok(Json(answer))
}

async fn health(State(state): State<QueryState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "chat_model": state.chat_model,
        "search_service": state.search_service,
    }))
}
