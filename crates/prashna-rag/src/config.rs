use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).ok().filter(|v| !v.is_empty()).unwrap_or_else(|| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    pub llm: LlmConfig,
    pub chroma: ChromaConfig,
    pub opensearch: OpenSearchConfig,
    /// Base URL of the search node, used by the ingestion and query nodes.
    pub search_service_url: String,
    pub chunking: ChunkingConfig,
    pub hybrid: HybridConfig,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// OpenAI-compatible API root, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    pub api_key: String,
    pub model_embed: String,
    pub model_chat: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChromaConfig {
    pub url: String,
    pub collection: String,
    /// Where the Chroma server persists the collection. Recorded for health
    /// reporting; the client itself always talks HTTP.
    pub persist_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenSearchConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub user: Option<String>,
    pub password: Option<String>,
    pub index: String,
}

impl OpenSearchConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Window size in whitespace-tokenized units.
    pub chunk_size: usize,
    /// Token overlap with the previous window on the same page.
    pub overlap: usize,
}

/// Tuning knobs of the hybrid retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HybridConfig {
    /// Over-sampled BM25 candidate count.
    pub bm25_chunks: usize,
    /// Maximum number of centers kept after thresholding.
    pub center_k: usize,
    /// ±window of adjacent chunks fetched around each center.
    pub neighbor_window: u32,
    /// Hard cap on chunks entering the prompt.
    pub max_context_chunks: usize,
    /// Weight of dense similarity in score fusion.
    pub fusion_alpha: f32,
    /// Minimum fraction of the top fused score a center must reach.
    pub center_rel_threshold: f32,
    /// Evidence score decay per chunk of distance from its center.
    pub distance_penalty: f32,
    /// Character budget for the assembled prompt context.
    pub context_char_budget: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl RagConfig {
    /// Load the full configuration from the environment, falling back to
    /// defaults for anything unset.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            llm: LlmConfig {
                base_url: env_or("BASE_URL", &defaults.llm.base_url),
                api_key: env_or("OPENAI_API_KEY", ""),
                model_embed: env_or("MODEL_EMBED", &defaults.llm.model_embed),
                model_chat: env_or("MODEL_CHAT", &defaults.llm.model_chat),
            },
            chroma: ChromaConfig {
                url: env_or("CHROMA_URL", &defaults.chroma.url),
                collection: env_or("CHROMA_COLLECTION", &defaults.chroma.collection),
                persist_dir: env_opt("CHROMA_PERSIST_DIR").map(PathBuf::from),
            },
            opensearch: OpenSearchConfig {
                host: env_or("OPENSEARCH_HOST", &defaults.opensearch.host),
                port: env_parse("OPENSEARCH_PORT", defaults.opensearch.port),
                scheme: env_or("OPENSEARCH_SCHEME", &defaults.opensearch.scheme),
                user: env_opt("OPENSEARCH_USER"),
                password: env_opt("OPENSEARCH_PASSWORD"),
                index: env_or("OPENSEARCH_INDEX", &defaults.opensearch.index),
            },
            search_service_url: env_or("SEARCH_SERVICE_URL", &defaults.search_service_url),
            chunking: ChunkingConfig {
                chunk_size: env_parse("CHUNK_SIZE", defaults.chunking.chunk_size),
                overlap: env_parse("CHUNK_OVERLAP", defaults.chunking.overlap),
            },
            hybrid: HybridConfig {
                bm25_chunks: env_parse("HYBRID_BM25_CHUNKS", defaults.hybrid.bm25_chunks),
                center_k: env_parse("HYBRID_CENTER_K", defaults.hybrid.center_k),
                neighbor_window: env_parse("HYBRID_NEIGHBOR_WINDOW", defaults.hybrid.neighbor_window),
                max_context_chunks: env_parse(
                    "HYBRID_MAX_CONTEXT_CHUNKS",
                    defaults.hybrid.max_context_chunks,
                ),
                fusion_alpha: env_parse("HYBRID_FUSION_ALPHA", defaults.hybrid.fusion_alpha),
                center_rel_threshold: env_parse(
                    "HYBRID_CENTER_REL_THRESHOLD",
                    defaults.hybrid.center_rel_threshold,
                ),
                distance_penalty: env_parse(
                    "HYBRID_DISTANCE_PENALTY",
                    defaults.hybrid.distance_penalty,
                ),
                context_char_budget: env_parse(
                    "HYBRID_CONTEXT_CHAR_BUDGET",
                    defaults.hybrid.context_char_budget,
                ),
            },
            http: HttpConfig {
                timeout_secs: env_parse("HTTP_TIMEOUT_SECS", defaults.http.timeout_secs),
                connect_timeout_secs: env_parse(
                    "HTTP_CONNECT_TIMEOUT_SECS",
                    defaults.http.connect_timeout_secs,
                ),
            },
        }
    }

    /// Validate config values, returning errors for clearly broken
    /// configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.chunking.chunk_size == 0 {
            return Err("chunking.chunk_size must be > 0".into());
        }
        if self.chunking.overlap >= self.chunking.chunk_size {
            return Err("chunking.overlap must be < chunk_size".into());
        }
        if self.hybrid.bm25_chunks == 0 {
            return Err("hybrid.bm25_chunks must be > 0".into());
        }
        if self.hybrid.center_k == 0 {
            return Err("hybrid.center_k must be > 0".into());
        }
        if self.hybrid.max_context_chunks == 0 {
            return Err("hybrid.max_context_chunks must be > 0".into());
        }
        if !(0.0..=1.0).contains(&self.hybrid.fusion_alpha) {
            return Err("hybrid.fusion_alpha must be in [0.0, 1.0]".into());
        }
        if !(0.0..=1.0).contains(&self.hybrid.center_rel_threshold)
            || self.hybrid.center_rel_threshold == 0.0
        {
            return Err("hybrid.center_rel_threshold must be in (0.0, 1.0]".into());
        }
        if self.hybrid.distance_penalty < 0.0 {
            return Err("hybrid.distance_penalty must be >= 0.0".into());
        }
        if self.hybrid.context_char_budget == 0 {
            return Err("hybrid.context_char_budget must be > 0".into());
        }
        Ok(())
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                base_url: "https://api.openai.com/v1".to_string(),
                api_key: String::new(),
                model_embed: "text-embedding-3-small".to_string(),
                model_chat: "gpt-4o-mini".to_string(),
            },
            chroma: ChromaConfig {
                url: "http://localhost:8000".to_string(),
                collection: "documents".to_string(),
                persist_dir: None,
            },
            opensearch: OpenSearchConfig {
                host: "localhost".to_string(),
                port: 9200,
                scheme: "http".to_string(),
                user: None,
                password: None,
                index: "docs_bm25".to_string(),
            },
            search_service_url: "http://localhost:8081".to_string(),
            chunking: ChunkingConfig {
                chunk_size: 500,
                overlap: 50,
            },
            hybrid: HybridConfig {
                bm25_chunks: 50,
                center_k: 3,
                neighbor_window: 2,
                max_context_chunks: 30,
                fusion_alpha: 0.6,
                center_rel_threshold: 0.85,
                distance_penalty: 0.02,
                context_char_budget: 12_000,
            },
            http: HttpConfig {
                timeout_secs: 60,
                connect_timeout_secs: 10,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(RagConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_overlap_not_smaller_than_chunk_size() {
        let mut config = RagConfig::default();
        config.chunking.chunk_size = 50;
        config.chunking.overlap = 50;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_out_of_range_fusion_alpha() {
        let mut config = RagConfig::default();
        config.hybrid.fusion_alpha = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_center_threshold() {
        let mut config = RagConfig::default();
        config.hybrid.center_rel_threshold = 0.0;
        assert!(config.validate().is_err());
    }

    // Environment access is process-global, so everything env-related runs
    // in a single test to avoid races with parallel test threads.
    #[test]
    fn from_env_reads_overrides_and_defaults() {
        std::env::set_var("HYBRID_FUSION_ALPHA", "0.4");
        std::env::set_var("HYBRID_NEIGHBOR_WINDOW", "3");
        std::env::set_var("OPENSEARCH_PORT", "9201");
        std::env::set_var("CHROMA_COLLECTION", "corpus");

        let config = RagConfig::from_env();
        assert_eq!(config.hybrid.fusion_alpha, 0.4);
        assert_eq!(config.hybrid.neighbor_window, 3);
        assert_eq!(config.opensearch.port, 9201);
        assert_eq!(config.chroma.collection, "corpus");
        // Untouched knobs keep their defaults.
        assert_eq!(config.hybrid.bm25_chunks, 50);
        assert_eq!(config.hybrid.center_rel_threshold, 0.85);
        assert_eq!(config.opensearch.index, "docs_bm25");

        std::env::remove_var("HYBRID_FUSION_ALPHA");
        std::env::remove_var("HYBRID_NEIGHBOR_WINDOW");
        std::env::remove_var("OPENSEARCH_PORT");
        std::env::remove_var("CHROMA_COLLECTION");
    }
}
