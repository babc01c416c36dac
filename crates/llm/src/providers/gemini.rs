//! Gemini LLM provider implementation.
//!
//! Talks to the `generateContent` REST method either on Vertex AI
//! (OAuth bearer token, project/region scoped) or on the Gemini Developer
//! API (API key). Both endpoints share one request/response schema.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use whatsupdoc_core::{AppError, AppResult};

use crate::auth::AccessTokenProvider;
use crate::client::{LlmClient, LlmRequest, LlmResponse, LlmUsage};

const DEVELOPER_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Where requests are sent and how they authenticate.
enum Backend {
    Vertex {
        project_id: String,
        location: String,
        tokens: Arc<dyn AccessTokenProvider>,
    },
    DeveloperApi {
        api_key: String,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Gemini LLM client.
pub struct GeminiClient {
    backend: Backend,

    /// Overrides the endpoint host, used against local test servers
    base_url: Option<String>,

    /// HTTP client
    client: reqwest::Client,
}

impl GeminiClient {
    /// Client for Gemini on Vertex AI.
    pub fn vertex(
        project_id: impl Into<String>,
        location: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        Self::with_backend(Backend::Vertex {
            project_id: project_id.into(),
            location: location.into(),
            tokens,
        })
    }

    /// Client for the Gemini Developer API.
    pub fn developer_api(api_key: impl Into<String>) -> Self {
        Self::with_backend(Backend::DeveloperApi {
            api_key: api_key.into(),
        })
    }

    fn with_backend(backend: Backend) -> Self {
        Self {
            backend,
            base_url: None,
            client: reqwest::Client::new(),
        }
    }

    /// Bound every HTTP call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Send requests to `base_url` instead of the Google endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    fn endpoint(&self, model: &str) -> String {
        match &self.backend {
            Backend::Vertex {
                project_id,
                location,
                ..
            } => {
                let base = self
                    .base_url
                    .clone()
                    .unwrap_or_else(|| format!("https://{}-aiplatform.googleapis.com/v1", location));
                format!(
                    "{}/projects/{}/locations/{}/publishers/google/models/{}:generateContent",
                    base, project_id, location, model
                )
            }
            Backend::DeveloperApi { .. } => {
                let base = self.base_url.as_deref().unwrap_or(DEVELOPER_API_BASE);
                format!("{}/models/{}:generateContent", base, model)
            }
        }
    }

    fn to_gemini_request(&self, request: &LlmRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![Part {
                    text: Some(request.prompt.clone()),
                }],
            }],
            system_instruction: request.system.as_ref().map(|system| Content {
                role: None,
                parts: vec![Part {
                    text: Some(system.clone()),
                }],
            }),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        }
    }

    /// Convert a Gemini response to LlmResponse.
    ///
    /// A blocked prompt or a candidate without text yields empty content
    /// rather than an error; callers decide how to present that.
    fn convert_response(&self, response: GenerateContentResponse, model: &str) -> LlmResponse {
        if let Some(reason) = response
            .prompt_feedback
            .as_ref()
            .and_then(|f| f.block_reason.as_ref())
        {
            tracing::warn!("Gemini blocked the prompt: {}", reason);
        }

        let candidate = response.candidates.into_iter().next();
        let finish_reason = candidate.as_ref().and_then(|c| c.finish_reason.clone());
        let content = candidate
            .and_then(|c| c.content)
            .map(|c| {
                c.parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        let usage = response
            .usage_metadata
            .map(|u| LlmUsage::new(u.prompt_token_count, u.candidates_token_count))
            .unwrap_or_default();

        LlmResponse {
            content,
            model: response.model_version.unwrap_or_else(|| model.to_string()),
            usage,
            finish_reason,
        }
    }
}

#[async_trait::async_trait]
impl LlmClient for GeminiClient {
    fn provider_name(&self) -> &str {
        match self.backend {
            Backend::Vertex { .. } => "vertex",
            Backend::DeveloperApi { .. } => "gemini-api",
        }
    }

    async fn complete(&self, request: &LlmRequest) -> AppResult<LlmResponse> {
        tracing::info!("Sending completion request to Gemini ({})", request.model);
        tracing::debug!("Prompt length: {} chars", request.prompt.chars().count());

        let body = self.to_gemini_request(request);
        let url = self.endpoint(&request.model);

        let builder = match &self.backend {
            Backend::Vertex { tokens, .. } => {
                let token = tokens.access_token().await?;
                self.client.post(&url).bearer_auth(token)
            }
            Backend::DeveloperApi { api_key } => {
                self.client.post(&url).header("x-goog-api-key", api_key)
            }
        };

        let response = builder.json(&body).send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::Llm(format!("Gemini request timed out: {}", e))
            } else if e.is_connect() {
                AppError::Llm(format!("Connection to Gemini failed: {}", e))
            } else {
                AppError::Llm(format!("Failed to send request to Gemini: {}", e))
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(AppError::Llm(format!(
                "Gemini API error ({}): {}",
                status, error_text
            )));
        }

        let gemini_response: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| AppError::Llm(format!("Failed to parse Gemini response: {}", e)))?;

        let response = self.convert_response(gemini_response, &request.model);
        tracing::info!(
            "Received completion from Gemini ({} tokens)",
            response.usage.total_tokens
        );

        Ok(response)
    }
}
