use std::sync::Arc;

use prashna_rag::search::Bm25Index;
use prashna_rag::RagConfig;
use prashna_server::search::{router, SearchState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    prashna_server::init_tracing();

    let config = RagConfig::from_env();
    config.validate().map_err(anyhow::Error::msg)?;

    let index = Arc::new(Bm25Index::new(&config.opensearch, &config.http)?);

    // The index is also ensured lazily on every write, so an unreachable
    // cluster at boot only degrades, it does not prevent startup.
    if let Err(e) = index.ensure_index().await {
        tracing::warn!(error = %e, "Could not ensure BM25 index at startup");
    }

    let state = SearchState {
        index,
        opensearch_url: config.opensearch.base_url(),
    };

    let port = prashna_server::port_from_env("SEARCH_PORT", 8081);
    prashna_server::serve(router(state), port).await
}
