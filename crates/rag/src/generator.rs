//! Grounded answer generation.
//!
//! Packs retrieved chunks into a bounded context, renders the answer prompt
//! and calls the generative model once.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use whatsupdoc_core::{AppConfig, AppResult};
use whatsupdoc_llm::{LlmClient, LlmRequest};
use whatsupdoc_prompt::{build_answer_prompt, PromptDefinition};

use crate::types::{RagResponse, SearchResult};

/// Answer when retrieval found nothing.
pub const NO_INFORMATION_ANSWER: &str = "I couldn't find relevant information to answer your question. Please try rephrasing your query or asking about a different topic.";

/// Answer when not even the first source fits the context budget.
pub const TOO_LENGTHY_ANSWER: &str =
    "The available information is too lengthy to process. Please try a more specific question.";

/// Answer when the model returns no text.
pub const EMPTY_GENERATION_ANSWER: &str =
    "I'm having trouble generating a response right now. Please try again.";

/// Answer when the model call fails.
pub const GENERATION_FAILED_ANSWER: &str =
    "I encountered an error while generating an answer. Please try again later.";

static SOURCE_REF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"Source (\d+)").unwrap());

/// Model parameters for answer generation.
#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GeneratorSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            max_output_tokens: config.generation.max_output_tokens,
        }
    }
}

/// Context assembled from the leading results that fit the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    pub text: String,
    /// How many leading results were included
    pub used: usize,
}

/// Format one result as a numbered context block.
pub fn format_source_block(number: usize, result: &SearchResult) -> String {
    let mut block = format!(
        "Source {} (Confidence: {:.1}%):\nTitle: {}\nContent: {}\n",
        number,
        result.confidence_score * 100.0,
        result.title,
        result.content
    );
    if !result.source_uri.is_empty() {
        block.push_str(&format!("URL: {}\n", result.source_uri));
    }
    block.push('\n');
    block
}

/// Greedily add blocks in order while the total stays within `max_chars`.
///
/// Stops at the first block that would overflow; later results are dropped
/// even if they are shorter.
pub fn assemble_context(results: &[SearchResult], max_chars: usize) -> AssembledContext {
    let mut text = String::new();
    let mut length = 0usize;
    let mut used = 0usize;

    for (i, result) in results.iter().enumerate() {
        let block = format_source_block(i + 1, result);
        let block_len = block.chars().count();
        if length + block_len > max_chars {
            break;
        }
        text.push_str(&block);
        length += block_len;
        used += 1;
    }

    AssembledContext { text, used }
}

/// Whether `answer` references `Source k` for some `k` in `1..=used_sources`.
pub fn has_citations(answer: &str, used_sources: usize) -> bool {
    SOURCE_REF.captures_iter(answer).any(|caps| {
        caps[1]
            .parse::<usize>()
            .map(|n| (1..=used_sources).contains(&n))
            .unwrap_or(false)
    })
}

/// Writes grounded answers with the generative model.
pub struct AnswerGenerator {
    llm: Arc<dyn LlmClient>,
    prompt: PromptDefinition,
    settings: GeneratorSettings,
}

impl AnswerGenerator {
    pub fn new(llm: Arc<dyn LlmClient>, prompt: PromptDefinition, settings: GeneratorSettings) -> Self {
        Self {
            llm,
            prompt,
            settings,
        }
    }

    pub fn llm(&self) -> &dyn LlmClient {
        self.llm.as_ref()
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    /// Generate an answer; failures become a fallback response.
    ///
    /// The fallback keeps the used sources and their mean confidence but
    /// never claims citations.
    pub async fn generate(
        &self,
        query: &str,
        results: &[SearchResult],
        max_context_chars: usize,
    ) -> RagResponse {
        match self.try_generate(query, results, max_context_chars).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Error generating RAG response: {}", e);
                let used = assemble_context(results, max_context_chars).used;
                RagResponse::new(GENERATION_FAILED_ANSWER, results[..used].to_vec(), false)
            }
        }
    }

    /// Generate an answer, surfacing model errors to the caller.
    pub async fn try_generate(
        &self,
        query: &str,
        results: &[SearchResult],
        max_context_chars: usize,
    ) -> AppResult<RagResponse> {
        if results.is_empty() {
            return Ok(RagResponse::canned(NO_INFORMATION_ANSWER));
        }

        let context = assemble_context(results, max_context_chars);
        if context.used == 0 {
            tracing::warn!(
                "First source exceeds context budget of {} chars",
                max_context_chars
            );
            return Ok(RagResponse::canned(TOO_LENGTHY_ANSWER));
        }

        let used_sources = results[..context.used].to_vec();
        tracing::debug!(
            "Passing {} of {} sources to the model ({} chars of context)",
            context.used,
            results.len(),
            context.text.chars().count()
        );

        let built = build_answer_prompt(&self.prompt, query, &context.text, context.used)?;
        let mut request = LlmRequest::new(built.user, &self.settings.model)
            .with_temperature(self.settings.temperature)
            .with_max_tokens(self.settings.max_output_tokens);
        if let Some(system) = built.system {
            request = request.with_system(system);
        }

        let response = self.llm.complete(&request).await?;
        let answer = response.content.trim();

        if answer.is_empty() {
            tracing::warn!(
                "Model returned no text (finish reason: {:?})",
                response.finish_reason
            );
            return Ok(RagResponse::new(EMPTY_GENERATION_ANSWER, used_sources, false));
        }

        let cited = has_citations(answer, used_sources.len());
        Ok(RagResponse::new(answer, used_sources, cited))
    }
}
