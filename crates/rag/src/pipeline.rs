//! Request orchestration.
//!
//! One [`RagPipeline::handle`] call takes a raw user message through
//! normalization, rate limiting, retrieval and generation, and delivers the
//! formatted reply through a [`Responder`]. Surfaces without a message
//! channel (the web API) pass no responder and render the returned
//! [`PipelineOutcome`] themselves.

use std::sync::Arc;
use std::time::Duration;

use tracing::Instrument;
use whatsupdoc_core::{retry_with_backoff, AppConfig, AppError, AppResult, RetryPolicy};

use crate::format::slack::{format_answer, format_notice, format_search_results};
use crate::format::{
    error_message, loading_message, no_results_message, rate_limited_message, too_short_message,
    SlackMessage,
};
use crate::generator::AnswerGenerator;
use crate::normalize::{is_too_short, normalize};
use crate::rate_limit::RateLimiter;
use crate::retrieval::RetrievalClient;
use crate::types::{RagResponse, SearchResult};

/// Server-assigned id of a posted message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHandle {
    pub channel: String,
    pub ts: String,
}

/// Delivery channel for replies.
#[async_trait::async_trait]
pub trait Responder: Send + Sync {
    /// Whether posted messages can be edited later.
    fn supports_update(&self) -> bool {
        false
    }

    /// Post a new message, returning its handle when the platform gives one.
    async fn send(&self, message: &SlackMessage) -> AppResult<Option<MessageHandle>>;

    /// Replace a previously posted message.
    async fn update(&self, handle: &MessageHandle, message: &SlackMessage) -> AppResult<()>;
}

/// One incoming question.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub user_id: String,
    pub text: String,
    pub max_results: Option<u32>,
    /// Maximum vector distance for this request
    pub distance_threshold: Option<f64>,
    pub request_id: String,
}

impl QueryRequest {
    pub fn new(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            text: text.into(),
            max_results: None,
            distance_threshold: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = Some(max_results);
        self
    }

    pub fn with_distance_threshold(mut self, threshold: f64) -> Self {
        self.distance_threshold = Some(threshold);
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }
}

/// Terminal state of a request.
#[derive(Debug)]
pub enum PipelineOutcome {
    TooShort,
    RateLimited { limit: u32, window: Duration },
    NoResults { query: String },
    Answered { query: String, response: RagResponse },
    /// Generation is off; results are returned as-is
    SearchOnly { query: String, results: Vec<SearchResult> },
    Failed { query: String, error: AppError },
}

impl PipelineOutcome {
    /// True for the `errored` terminal state.
    pub fn is_error(&self) -> bool {
        matches!(self, PipelineOutcome::Failed { .. })
    }

    /// The reply for chat surfaces.
    pub fn to_slack_message(&self) -> SlackMessage {
        match self {
            PipelineOutcome::TooShort => format_notice(too_short_message()),
            PipelineOutcome::RateLimited { limit, window } => {
                format_notice(rate_limited_message(*limit, *window))
            }
            PipelineOutcome::NoResults { query } => format_notice(no_results_message(query)),
            PipelineOutcome::Answered { query, response } => format_answer(query, response),
            PipelineOutcome::SearchOnly { query, results } => format_search_results(query, results),
            PipelineOutcome::Failed { error, .. } => format_notice(error_message(error)),
        }
    }
}

/// Tunables for one pipeline.
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub max_results: u32,
    pub distance_threshold: f64,
    pub max_context_chars: usize,
    /// Bound on each external call attempt
    pub call_timeout: Duration,
    pub retry: RetryPolicy,
}

impl PipelineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            max_results: config.retrieval.max_results,
            distance_threshold: config.retrieval.distance_threshold,
            max_context_chars: config.generation.max_context_length,
            call_timeout: config.response_timeout(),
            retry: RetryPolicy::default(),
        }
    }

    /// Longest `handle` can spend waiting on retrieval and generation,
    /// each exhausting its retries on timeouts.
    pub fn worst_case(&self) -> Duration {
        self.retry.worst_case(self.call_timeout) * 2
    }
}

/// Normalizer, rate limiter, retrieval and generation wired together.
#[derive(Clone)]
pub struct RagPipeline {
    retrieval: Arc<dyn RetrievalClient>,
    generator: Option<Arc<AnswerGenerator>>,
    limiter: Arc<RateLimiter>,
    settings: PipelineSettings,
}

impl RagPipeline {
    /// `generator` is `None` in search-only mode.
    pub fn new(
        retrieval: Arc<dyn RetrievalClient>,
        generator: Option<Arc<AnswerGenerator>>,
        limiter: Arc<RateLimiter>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            retrieval,
            generator,
            limiter,
            settings,
        }
    }

    /// Same services, different rate limiter.
    pub fn with_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn retrieval(&self) -> &Arc<dyn RetrievalClient> {
        &self.retrieval
    }

    pub fn generator(&self) -> Option<&Arc<AnswerGenerator>> {
        self.generator.as_ref()
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// Handle one request end to end.
    ///
    /// Every outcome, including failures, is delivered to `responder` when
    /// one is given; nothing here returns an error.
    pub async fn handle(
        &self,
        request: QueryRequest,
        responder: Option<&dyn Responder>,
    ) -> PipelineOutcome {
        let span = tracing::info_span!(
            "query",
            user_id = %request.user_id,
            request_id = %request.request_id
        );
        self.handle_inner(request, responder).instrument(span).await
    }

    async fn handle_inner(
        &self,
        request: QueryRequest,
        responder: Option<&dyn Responder>,
    ) -> PipelineOutcome {
        let query = normalize(&request.text);

        if is_too_short(&query) {
            tracing::debug!("Query too short after normalization: {:?}", query);
            return self.finish(PipelineOutcome::TooShort, responder, None).await;
        }

        if !self.limiter.check_and_increment(&request.user_id) {
            tracing::info!("Rate limit exceeded");
            let outcome = PipelineOutcome::RateLimited {
                limit: self.limiter.limit(),
                window: self.limiter.window(),
            };
            return self.finish(outcome, responder, None).await;
        }

        tracing::info!("Processing query: {}", query);
        let placeholder = self.post_placeholder(&query, responder).await;

        let max_results = request.max_results.unwrap_or(self.settings.max_results);
        let threshold = request
            .distance_threshold
            .unwrap_or(self.settings.distance_threshold);

        let results = match self.search(&query, max_results, threshold).await {
            Ok(results) => results,
            Err(error) => {
                tracing::error!("Retrieval failed: {}", error);
                let outcome = PipelineOutcome::Failed { query, error };
                return self.finish(outcome, responder, placeholder).await;
            }
        };

        if results.is_empty() {
            tracing::info!(results = 0, "No relevant documents");
            return self
                .finish(PipelineOutcome::NoResults { query }, responder, placeholder)
                .await;
        }

        let outcome = match &self.generator {
            None => {
                tracing::info!(results = results.len(), "Replying in search-only mode");
                PipelineOutcome::SearchOnly { query, results }
            }
            Some(generator) => match self.generate(generator, &query, &results).await {
                Ok(response) => {
                    tracing::info!(
                        results = results.len(),
                        sources = response.sources.len(),
                        confidence = response.confidence_score,
                        citations = response.has_citations,
                        "Answer generated"
                    );
                    PipelineOutcome::Answered { query, response }
                }
                Err(error) => {
                    tracing::error!("Answer generation failed: {}", error);
                    PipelineOutcome::Failed { query, error }
                }
            },
        };

        self.finish(outcome, responder, placeholder).await
    }

    async fn search(
        &self,
        query: &str,
        max_results: u32,
        threshold: f64,
    ) -> AppResult<Vec<SearchResult>> {
        let timeout = self.settings.call_timeout;
        retry_with_backoff(&self.settings.retry, "Retrieval", move || async move {
            tokio::time::timeout(timeout, self.retrieval.search(query, max_results, threshold))
                .await
                .map_err(|_| AppError::Timeout {
                    service: "retrieval",
                    seconds: timeout.as_secs(),
                })?
        })
        .await
    }

    async fn generate(
        &self,
        generator: &AnswerGenerator,
        query: &str,
        results: &[SearchResult],
    ) -> AppResult<RagResponse> {
        let timeout = self.settings.call_timeout;
        let budget = self.settings.max_context_chars;
        retry_with_backoff(&self.settings.retry, "Generation", move || async move {
            tokio::time::timeout(timeout, generator.try_generate(query, results, budget))
                .await
                .map_err(|_| AppError::Timeout {
                    service: "generation",
                    seconds: timeout.as_secs(),
                })?
        })
        .await
    }

    async fn post_placeholder(
        &self,
        query: &str,
        responder: Option<&dyn Responder>,
    ) -> Option<MessageHandle> {
        let responder = responder.filter(|r| r.supports_update())?;
        match responder.send(&format_notice(loading_message(query))).await {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!("Failed to post placeholder: {}", e);
                None
            }
        }
    }

    async fn finish(
        &self,
        outcome: PipelineOutcome,
        responder: Option<&dyn Responder>,
        placeholder: Option<MessageHandle>,
    ) -> PipelineOutcome {
        if let Some(responder) = responder {
            let message = outcome.to_slack_message();
            deliver(responder, placeholder.as_ref(), &message).await;
        }
        outcome
    }
}

/// Update the placeholder in place, or post a new message.
async fn deliver(responder: &dyn Responder, placeholder: Option<&MessageHandle>, message: &SlackMessage) {
    if let Some(handle) = placeholder {
        match responder.update(handle, message).await {
            Ok(()) => return,
            Err(e) => tracing::warn!("Failed to update placeholder, posting new message: {}", e),
        }
    }
    if let Err(e) = responder.send(message).await {
        tracing::error!("Failed to deliver reply: {}", e);
    }
}
