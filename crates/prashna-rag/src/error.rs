use thiserror::Error;

/// Error kinds for the retrieval core. The service layer maps `Validation`
/// and `Parse` to 400 responses; everything else becomes a 500.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("document parse error: {0}")]
    Parse(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("lexical search error: {0}")]
    Search(String),

    #[error("chat completion failed: {0}")]
    Llm(String),
}

impl RagError {
    /// True for errors caused by the caller's input rather than a
    /// downstream dependency.
    pub fn is_client_error(&self) -> bool {
        matches!(self, RagError::Validation(_) | RagError::Parse(_))
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
