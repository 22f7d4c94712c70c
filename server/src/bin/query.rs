use std::sync::Arc;

use prashna_rag::embeddings::EmbeddingClient;
use prashna_rag::llm::ChatClient;
use prashna_rag::search::SearchServiceClient;
use prashna_rag::storage::ChromaStore;
use prashna_rag::{HybridRetriever, QueryEngine, RagConfig};
use prashna_server::query::{router, QueryState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    prashna_server::init_tracing();

    let config = RagConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    let embedder = Arc::new(EmbeddingClient::new(&config.llm, &config.http)?);
    let store = Arc::new(ChromaStore::connect(&config.chroma).await?);
    let lexical = Arc::new(SearchServiceClient::new(
        &config.search_service_url,
        &config.http,
    )?);
    let chat = Arc::new(ChatClient::new(&config.llm, &config.http)?);

    let retriever = HybridRetriever::new(embedder, store, lexical, config.hybrid.clone());
    let engine = QueryEngine::new(retriever, chat, config.hybrid.context_char_budget);

    let state = QueryState {
        engine: Arc::new(engine),
        chat_model: config.llm.model_chat.clone(),
        search_service: config.search_service_url.clone(),
    };

    let port = prashna_server::port_from_env("QUERY_PORT", 8002);
    prashna_server::serve(router(state), port).await
}
