use std::sync::Arc;

use prashna_rag::embeddings::EmbeddingClient;
use prashna_rag::processing::TokenChunker;
use prashna_rag::search::SearchServiceClient;
use prashna_rag::storage::ChromaStore;
use prashna_rag::{Ingestor, RagConfig};
use prashna_server::ingest::{router, IngestState};

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
    let chunker = TokenChunker::new(config.chunking.chunk_size, config.chunking.overlap);

    let state = IngestState {
        ingestor: Arc::new(Ingestor::new(chunker, embedder, store, lexical)),
        collection: config.chroma.collection.clone(),
        persist_dir: config
            .chroma
            .persist_dir
            .as_ref()
            .map(|p| p.display().to_string()),
        embedding_model: config.llm.model_embed.clone(),
    };

    let port = prashna_server::port_from_env("INGEST_PORT", 8001);
    prashna_server::serve(router(state), port).await
}
