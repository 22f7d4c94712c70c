use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{RagError, Result};
use crate::llm::{build_messages, ChatModel, UNKNOWN_ANSWER};
use crate::retrieval::{assemble_context, EvidenceChunk, HybridRetriever};
use crate::types::{truncate_chars, Answer, Source};

/// Smallest and largest `top_k` a query may request.
pub const QUERY_TOP_K_RANGE: std::ops::RangeInclusive<usize> = 1..=20;

/// The query node's orchestrator: retrieval, context assembly, the chat
/// call, and citation assembly.
pub struct QueryEngine {
    retriever: HybridRetriever,
    chat: Arc<dyn ChatModel>,
    context_char_budget: usize,
}

impl QueryEngine {
    pub fn new(
        retriever: HybridRetriever,
        chat: Arc<dyn ChatModel>,
        context_char_budget: usize,
    ) -> Self {
        Self {
            retriever,
            chat,
            context_char_budget,
        }
    }

    pub async fn answer(
        &self,
        question: &str,
        top_k: usize,
        model_name: Option<&str>,
        document_id: Option<&str>,
    ) -> Result<Answer> {
        let question = question.trim();
        if question.chars().count() < 3 {
            return Err(RagError::Validation(
                "question must be at least 3 characters".into(),
            ));
        }
        if !QUERY_TOP_K_RANGE.contains(&top_k) {
            return Err(RagError::Validation(format!(
                "top_k must be within [{}, {}]",
                QUERY_TOP_K_RANGE.start(),
                QUERY_TOP_K_RANGE.end()
            )));
        }

        let chunks = self.retriever.retrieve(question, top_k, document_id).await?;

        // Nothing retrieved is not an error: answer with the fixed fallback
        // sentence and never call the model.
        if chunks.is_empty() {
            return Ok(Answer {
                answer: UNKNOWN_ANSWER.to_string(),
                sources: Vec::new(),
                context_used: 0,
                model_used: model_name.unwrap_or(self.chat.default_model()).to_string(),
            });
        }

        let context = assemble_context(&chunks, self.context_char_budget);
        let messages = build_messages(question, &context.text);
        let completion = self.chat.complete(&messages, model_name).await?;

        tracing::info!(
            chunks = chunks.len(),
            in_context = context.chunks_included,
            context_used = context.chars_used,
            model = %completion.model,
            "Answer generated"
        );

        Ok(Answer {
            answer: completion.text,
            sources: assemble_sources(&chunks),
            context_used: context.chars_used,
            model_used: completion.model,
        })
    }
}

/// Walk the ranked evidence set in order, deduplicating by identity, and
/// emit citation records with 200-character snippets.
pub fn assemble_sources(chunks: &[EvidenceChunk]) -> Vec<Source> {
    let mut seen = HashSet::new();
    chunks
        .iter()
        .filter(|chunk| seen.insert((chunk.document_id.clone(), chunk.chunk_id)))
        .map(|chunk| Source {
            document_id: chunk.document_id.clone(),
            chunk_id: chunk.chunk_id.to_string(),
            source: chunk.source.clone(),
            page: chunk.page,
            snippet: truncate_chars(&chunk.text, 200),
        })
        .collect()
}
