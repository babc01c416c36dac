//! Google API access tokens.
//!
//! Both the retrieval service and Gemini on Vertex AI authenticate with an
//! OAuth bearer token. Locally a static token (e.g. from
//! `gcloud auth print-access-token`) is enough; on Cloud Run and GCE the
//! instance metadata server issues short-lived tokens which are cached here.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::Mutex;
use whatsupdoc_core::{AppError, AppResult};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Refresh this long before the reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Source of OAuth bearer tokens for Google APIs.
#[async_trait::async_trait]
pub trait AccessTokenProvider: Send + Sync {
    /// Return a currently valid access token.
    async fn access_token(&self) -> AppResult<String>;
}

/// A fixed token supplied through configuration.
#[derive(Clone)]
pub struct StaticToken {
    token: String,
}

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait::async_trait]
impl AccessTokenProvider for StaticToken {
    async fn access_token(&self) -> AppResult<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// Tokens from the GCE / Cloud Run metadata server, cached until shortly
/// before they expire.
pub struct MetadataServerToken {
    url: String,
    client: reqwest::Client,
    cached: Mutex<Option<CachedToken>>,
}

impl MetadataServerToken {
    pub fn new() -> Self {
        Self::with_url(METADATA_TOKEN_URL)
    }

    /// Use a custom token endpoint.
    pub fn with_url(url: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();

        Self {
            url: url.into(),
            client,
            cached: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> AppResult<MetadataTokenResponse> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| {
                AppError::Config(format!(
                    "Failed to reach metadata server for access token: {}",
                    e
                ))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Config(format!(
                "Metadata server token error ({}): {}",
                status, body
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::Config(format!("Failed to parse metadata token: {}", e)))
    }
}

impl Default for MetadataServerToken {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl AccessTokenProvider for MetadataServerToken {
    async fn access_token(&self) -> AppResult<String> {
        let mut cached = self.cached.lock().await;

        if let Some(entry) = cached.as_ref() {
            if Instant::now() < entry.refresh_at {
                return Ok(entry.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let lifetime = Duration::from_secs(fresh.expires_in).saturating_sub(EXPIRY_MARGIN);
        tracing::debug!("Fetched access token from metadata server, valid for {:?}", lifetime);

        *cached = Some(CachedToken {
            token: fresh.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });

        Ok(fresh.access_token)
    }
}

/// Choose a token provider: a configured static token, else the metadata server.
pub fn create_token_provider(static_token: Option<&str>) -> Arc<dyn AccessTokenProvider> {
    match static_token.filter(|t| !t.is_empty()) {
        Some(token) => Arc::new(StaticToken::new(token)),
        None => Arc::new(MetadataServerToken::new()),
    }
}
