use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use prashna_rag::processing::parse_document;
use prashna_rag::Ingestor;

use crate::error::{ApiError, ApiResult};

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

#[derive(Clone)]
pub struct IngestState {
    pub ingestor: Arc<Ingestor>,
    pub collection: String,
    pub persist_dir: Option<String>,
    pub embedding_model: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub document_id: String,
    pub characters: usize,
    pub chunks: usize,
    pub embedding_dim: usize,
    pub preview: Option<String>,
}

pub fn router(state: IngestState) -> Router {
    Router::new()
        .route("/ingest", post(ingest))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn ingest(
    State(state): State<IngestState>,
    mut multipart: Multipart,
) -> ApiResult<Json<IngestResponse>> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut document_id: Option<String> = None;
    let mut source: Option<String> = None;
    let mut version: Option<String> = None;
    let mut tags: Vec<String> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field
                    .file_name()
                    .map(str::to_string)
                    .unwrap_or_else(|| "upload".to_string());
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
                file = Some((filename, bytes.to_vec()));
            }
            "document_id" => document_id = read_text_field(field).await?,
            "source" => source = read_text_field(field).await?,
            "version" => version = read_text_field(field).await?,
            "tags" => {
                if let Some(raw) = read_text_field(field).await? {
                    tags = raw
                        .split(',')
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .map(str::to_string)
                        .collect();
                }
            }
            _ => {}
        }
    }

    let (filename, bytes) =
        file.ok_or_else(|| ApiError::bad_request("missing required 'file' field"))?;

    let document_id = document_id.unwrap_or_else(|| file_stem(&filename));
    let source = source.unwrap_or_else(|| filename.clone());

    let pages = parse_document(&filename, &bytes)?;
    let outcome = state
        .ingestor
        .ingest(&document_id, &source, version.as_deref(), &tags, &pages)
        .await?;

    Ok(Json(IngestResponse {
        status: "embedded",
        document_id: outcome.document_id,
        characters: outcome.characters,
        chunks: outcome.chunks,
        embedding_dim: outcome.embedding_dim,
        preview: outcome.preview,
    }))
}

async fn health(State(state): State<IngestState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "collection": state.collection,
        "persist_dir": state.persist_dir,
        "embedding_model": state.embedding_model,
    }))
}

async fn read_text_field(field: axum::extract::multipart::Field<'_>) -> ApiResult<Option<String>> {
    let text = field
        .text()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid form field: {}", e)))?;
    let text = text.trim().to_string();
    Ok(if text.is_empty() { None } else { Some(text) })
}

/// Default `document_id`: the uploaded filename without its extension.
fn file_stem(filename: &str) -> String {
    std::path::Path::new(filename)
        .file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or(filename)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_id_defaults_to_the_filename_stem() {
        assert_eq!(file_stem("aws-notes.pdf"), "aws-notes");
        assert_eq!(file_stem("README"), "README");
        assert_eq!(file_stem("archive.tar.gz"), "archive.tar");
    }
}
