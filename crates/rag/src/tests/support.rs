//! Test doubles for pipeline and generator tests.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use whatsupdoc_core::{AppError, AppResult, RetryPolicy};
use whatsupdoc_llm::{LlmClient, LlmRequest, LlmResponse, LlmUsage};
use whatsupdoc_prompt::default_prompt;

use crate::format::SlackMessage;
use crate::generator::{AnswerGenerator, GeneratorSettings};
use crate::health::ServiceHealth;
use crate::pipeline::{MessageHandle, PipelineSettings, RagPipeline, Responder};
use crate::rate_limit::RateLimiter;
use crate::retrieval::RetrievalClient;
use crate::types::SearchResult;

/// Retrieval client returning canned results.
pub struct MockRetrieval {
    results: Vec<SearchResult>,
    /// Error text for the first `failures` calls
    failure: Option<(u32, String)>,
    delay: Option<Duration>,
    calls: AtomicU32,
}

impl MockRetrieval {
    pub fn returning(results: Vec<SearchResult>) -> Self {
        Self {
            results,
            failure: None,
            delay: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn failing(times: u32, message: &str) -> Self {
        Self::returning(Vec::new()).with_failures(times, message)
    }

    pub fn with_failures(mut self, times: u32, message: &str) -> Self {
        self.failure = Some((times, message.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RetrievalClient for MockRetrieval {
    async fn search(
        &self,
        _query: &str,
        max_results: u32,
        _distance_threshold: f64,
    ) -> AppResult<Vec<SearchResult>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some((times, message)) = &self.failure {
            if call < *times {
                return Err(AppError::Retrieval(message.clone()));
            }
        }
        Ok(self
            .results
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    async fn health_check(&self) -> ServiceHealth {
        ServiceHealth::Healthy
    }
}

/// Generative model with a fixed reply.
pub struct MockLlm {
    reply: String,
    failure: Option<String>,
    calls: AtomicU32,
    prompts: Mutex<Vec<String>>,
}

impl MockLlm {
    pub fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            failure: None,
            calls: AtomicU32::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let mut llm = Self::replying("");
        llm.failure = Some(message.to_string());
        llm
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.prompts.lock().unwrap().last().cloned()
    }
}

#[async_trait::async_trait]
impl LlmClient for MockLlm {
    fn provider_name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(request.prompt.clone());
        if let Some(message) = &self.failure {
            return Err(AppError::Llm(message.clone()));
        }
        Ok(LlmResponse {
            content: self.reply.clone(),
            model: request.model.clone(),
            usage: LlmUsage::new(10, 5),
            finish_reason: Some("STOP".to_string()),
        })
    }
}

/// Responder that records everything it is asked to deliver.
#[derive(Default)]
pub struct RecordingResponder {
    updatable: bool,
    fail_updates: bool,
    pub sent: Mutex<Vec<SlackMessage>>,
    pub updated: Mutex<Vec<(MessageHandle, SlackMessage)>>,
}

impl RecordingResponder {
    /// A chat surface whose messages can be edited.
    pub fn updatable() -> Self {
        Self {
            updatable: true,
            ..Self::default()
        }
    }

    /// A surface that can only post new messages.
    pub fn send_only() -> Self {
        Self::default()
    }

    pub fn with_failing_updates(mut self) -> Self {
        self.fail_updates = true;
        self
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(SlackMessage::plain_text)
            .collect()
    }

    pub fn updated_texts(&self) -> Vec<String> {
        self.updated
            .lock()
            .unwrap()
            .iter()
            .map(|(_, m)| m.plain_text())
            .collect()
    }
}

#[async_trait::async_trait]
impl Responder for RecordingResponder {
    fn supports_update(&self) -> bool {
        self.updatable
    }

    async fn send(&self, message: &SlackMessage) -> AppResult<Option<MessageHandle>> {
        let mut sent = self.sent.lock().unwrap();
        sent.push(message.clone());
        Ok(Some(MessageHandle {
            channel: "C1".to_string(),
            ts: format!("1700000000.{:06}", sent.len()),
        }))
    }

    async fn update(&self, handle: &MessageHandle, message: &SlackMessage) -> AppResult<()> {
        if self.fail_updates {
            return Err(AppError::Platform("chat.update failed: message_not_found".into()));
        }
        self.updated
            .lock()
            .unwrap()
            .push((handle.clone(), message.clone()));
        Ok(())
    }
}

pub fn result(title: &str, confidence: f64) -> SearchResult {
    SearchResult::new(title, format!("{} content.", title))
        .with_source_uri(format!("gs://docs/{}.pdf", title.to_lowercase()))
        .with_confidence(confidence)
}

pub fn generator(llm: Arc<MockLlm>) -> AnswerGenerator {
    AnswerGenerator::new(
        llm,
        default_prompt().unwrap(),
        GeneratorSettings {
            model: "gemini-2.5-flash-lite".to_string(),
            temperature: 0.1,
            max_output_tokens: 1500,
        },
    )
}

pub fn fast_settings() -> PipelineSettings {
    PipelineSettings {
        max_results: 7,
        distance_threshold: 0.8,
        max_context_chars: 100_000,
        call_timeout: Duration::from_millis(200),
        retry: RetryPolicy::default().with_initial_delay(Duration::from_millis(1)),
    }
}

pub fn pipeline(
    retrieval: Arc<MockRetrieval>,
    llm: Option<Arc<MockLlm>>,
    limit: u32,
) -> RagPipeline {
    RagPipeline::new(
        retrieval,
        llm.map(|llm| Arc::new(generator(llm))),
        Arc::new(RateLimiter::new(limit, Duration::from_secs(60))),
        fast_settings(),
    )
}
