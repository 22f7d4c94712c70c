pub mod chat;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

pub use chat::ChatClient;

/// The fixed sentence returned when the context cannot support an answer.
pub const UNKNOWN_ANSWER: &str = "I don't know based on the provided document(s).";

const SYSTEM_PROMPT: &str = "You are a careful assistant answering questions about uploaded \
documents. Answer ONLY from the provided context. Do not use outside knowledge and do not \
speculate. If the context does not contain enough information to answer, reply with exactly: \
I don't know based on the provided document(s).";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChatCompletion {
    pub text: String,
    pub model: String,
}

/// Chat model seam. The production implementation is [`ChatClient`]; tests
/// swap in an in-memory fake.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Run one completion. `model_override` replaces the configured default
    /// model for this call only.
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_override: Option<&str>,
    ) -> Result<ChatCompletion>;

    /// The model used when no override is supplied.
    fn default_model(&self) -> &str;
}

/// Build the fixed two-message answer template from the assembled context.
pub fn build_messages(question: &str, context: &str) -> Vec<ChatMessage> {
    let user = format!(
        "CONTEXT:\n{}\n\nQUESTION:\n{}\n\nINSTRUCTIONS: Answer the question using only the \
         context above. Quote figures and names as they appear. If the context is insufficient, \
         reply with exactly: {}",
        context, question, UNKNOWN_ANSWER
    );
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Parse a response body as JSON, returning a clear error if the server
/// returned HTML (e.g. a gateway error page) instead of valid JSON.
pub(crate) async fn decode_json<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
    endpoint: &str,
) -> std::result::Result<T, String> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| format!("failed to read response body from {}: {}", endpoint, e))?;

    if !status.is_success() {
        let preview: String = body.chars().take(300).collect();
        return Err(format!("{} returned HTTP {}: {}", endpoint, status, preview));
    }

    let trimmed = body.trim_start();
    if trimmed.starts_with('<') {
        let preview: String = trimmed.chars().take(200).collect();
        return Err(format!(
            "{} returned HTML instead of JSON (HTTP {}); the service may be down or misconfigured: {}",
            endpoint, status, preview
        ));
    }

    serde_json::from_str::<T>(&body).map_err(|e| {
        let preview: String = body.chars().take(300).collect();
        format!("failed to parse JSON from {}: {} (body: {})", endpoint, e, preview)
    })
}

/// Build a reqwest client with the configured deadlines. Shared by every
/// outbound HTTP adapter in the core; no retries anywhere. Callers wrap the
/// message in their own error kind.
pub(crate) fn http_client(
    config: &crate::config::HttpConfig,
) -> std::result::Result<reqwest::Client, String> {
    reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
        .timeout(std::time::Duration::from_secs(config.timeout_secs))
        .build()
        .map_err(|e| format!("failed to build HTTP client: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_contains_context_question_and_fallback() {
        let messages = build_messages("what is a vpc?", "[Chunk 1]\nnetworking text");

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, "system");
        assert!(messages[0].content.contains(UNKNOWN_ANSWER));
        assert_eq!(messages[1].role, "user");
        assert!(messages[1].content.starts_with("CONTEXT:\n[Chunk 1]"));
        assert!(messages[1].content.contains("QUESTION:\nwhat is a vpc?"));
        assert!(messages[1].content.contains("INSTRUCTIONS:"));
    }
}
