use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{decode_json, ChatCompletion, ChatMessage, ChatModel};
use crate::config::{HttpConfig, LlmConfig};
use crate::error::{RagError, Result};

/// OpenAI-compatible chat completions client. Point `BASE_URL` at any
/// compatible server (OpenAI, Ollama, vLLM, LM Studio).
pub struct ChatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

impl ChatClient {
    pub fn new(llm: &LlmConfig, http: &HttpConfig) -> Result<Self> {
        Ok(Self {
            http: super::http_client(http).map_err(RagError::Llm)?,
            base_url: llm.base_url.trim_end_matches('/').to_string(),
            api_key: llm.api_key.clone(),
            model: llm.model_chat.clone(),
        })
    }
}

#[async_trait]
impl ChatModel for ChatClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        model_override: Option<&str>,
    ) -> Result<ChatCompletion> {
        let model = model_override.unwrap_or(&self.model);
        let endpoint = format!("{}/chat/completions", self.base_url);

        tracing::debug!(
            endpoint = %endpoint,
            model = %model,
            messages = messages.len(),
            "Sending chat completion request"
        );

        let request = ChatRequest {
            model,
            messages,
            temperature: 0.0,
        };

        let response = self
            .http
            .post(&endpoint)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Llm(format!("request to {} failed: {}", endpoint, e)))?;

        let parsed: ChatResponse = decode_json(response, &endpoint)
            .await
            .map_err(RagError::Llm)?;

        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| RagError::Llm("chat response contained no choices".into()))?;

        Ok(ChatCompletion {
            text,
            model: model.to_string(),
        })
    }

    fn default_model(&self) -> &str {
        &self.model
    }
}
