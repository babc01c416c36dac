//! LLM provider factory.
//!
//! This module creates LLM clients from resolved configuration. It handles
//! provider selection and credential injection.

use crate::auth::AccessTokenProvider;
use crate::client::LlmClient;
use crate::providers::GeminiClient;
use crate::types::{LlmConfig, ProviderType};
use std::sync::Arc;
use whatsupdoc_core::{AppError, AppResult};

/// Create an LLM client for the configured provider.
///
/// Vertex AI authenticates with `tokens`; the Developer API requires an
/// API key in `config`.
///
/// # Errors
/// Returns a configuration error if the Developer API is selected without
/// an API key.
pub fn create_client(
    config: &LlmConfig,
    tokens: Arc<dyn AccessTokenProvider>,
) -> AppResult<Arc<dyn LlmClient>> {
    let client = match config.provider {
        ProviderType::Vertex => {
            GeminiClient::vertex(config.project_id.clone(), config.location.clone(), tokens)
        }
        ProviderType::GeminiApi => {
            let api_key = config
                .api_key
                .as_deref()
                .filter(|k| !k.is_empty())
                .ok_or_else(|| {
                    AppError::Config("Gemini Developer API requires GEMINI_API_KEY".to_string())
                })?;
            GeminiClient::developer_api(api_key)
        }
    };

    tracing::debug!(
        "Created {} client for model {}",
        config.provider.as_str(),
        config.model
    );

    Ok(Arc::new(client.with_timeout(config.timeout)))
}
