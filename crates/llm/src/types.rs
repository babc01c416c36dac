//! LLM configuration types.
//!
//! This module defines the configuration structures for the Gemini providers.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use whatsupdoc_core::AppConfig;

/// Resolved settings for building an LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Which Gemini endpoint to call
    pub provider: ProviderType,

    /// Model identifier
    pub model: String,

    /// Sampling temperature (0.0 - 2.0)
    pub temperature: f32,

    /// Maximum tokens to generate
    pub max_output_tokens: u32,

    /// Google Cloud project (Vertex AI only)
    pub project_id: String,

    /// Google Cloud region (Vertex AI only)
    pub location: String,

    /// API key (Developer API only)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// HTTP timeout for a single call
    pub timeout: Duration,
}

impl LlmConfig {
    /// Derive LLM settings from the application configuration.
    pub fn from_app_config(config: &AppConfig) -> Self {
        let provider = if config.generation.use_vertex_ai {
            ProviderType::Vertex
        } else {
            ProviderType::GeminiApi
        };

        Self {
            provider,
            model: config.generation.model.clone(),
            temperature: config.generation.temperature,
            max_output_tokens: config.generation.max_output_tokens,
            project_id: config.gcp.project_id.clone(),
            location: config.gcp.location.clone(),
            api_key: config.generation.api_key.clone(),
            timeout: config.response_timeout(),
        }
    }
}

/// Provider type enum for matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProviderType {
    /// Gemini served from Vertex AI
    Vertex,
    /// Gemini Developer API (generativelanguage.googleapis.com)
    GeminiApi,
}

impl ProviderType {
    /// Parse provider type from string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "vertex" | "vertex-ai" | "vertexai" => Some(Self::Vertex),
            "gemini-api" | "gemini" | "genai" => Some(Self::GeminiApi),
            _ => None,
        }
    }

    /// Get the canonical provider name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vertex => "vertex",
            Self::GeminiApi => "gemini-api",
        }
    }
}
