//! Vertex AI RAG Engine client.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use whatsupdoc_core::{AppConfig, AppError, AppResult};
use whatsupdoc_llm::AccessTokenProvider;

use super::{decode_contexts, RetrievalClient};
use crate::health::ServiceHealth;
use crate::types::SearchResult;

const RERANKER_MODEL: &str = "semantic-ranker-default@latest";

/// Result of one `retrieveContexts` call.
#[derive(Debug)]
enum RetrievalOutcome {
    Results(Vec<SearchResult>),
    /// The backend answered "not implemented"
    Unavailable,
}

/// Client for the `retrieveContexts` REST method.
pub struct VertexRagClient {
    project_id: String,
    location: String,
    corpus_name: String,
    base_url: String,
    tokens: Arc<dyn AccessTokenProvider>,
    client: reqwest::Client,
}

impl VertexRagClient {
    /// Create a client for `corpus_name` (a full `projects/.../ragCorpora/...` name).
    pub fn new(
        project_id: impl Into<String>,
        location: impl Into<String>,
        corpus_name: impl Into<String>,
        tokens: Arc<dyn AccessTokenProvider>,
    ) -> Self {
        let location = location.into();
        Self {
            project_id: project_id.into(),
            base_url: format!("https://{}-aiplatform.googleapis.com", location),
            location,
            corpus_name: corpus_name.into(),
            tokens,
            client: reqwest::Client::new(),
        }
    }

    /// Build a client from application configuration.
    pub fn from_config(config: &AppConfig, tokens: Arc<dyn AccessTokenProvider>) -> Self {
        Self::new(
            config.gcp.project_id.clone(),
            config.gcp.location.clone(),
            config.rag_corpus_name(),
            tokens,
        )
        .with_timeout(config.response_timeout())
    }

    /// Bound every HTTP call by `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        self
    }

    /// Send requests to `base_url` instead of the regional endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/v1beta1/projects/{}/locations/{}:retrieveContexts",
            self.base_url, self.project_id, self.location
        )
    }

    fn request_body(&self, query: &str, max_results: u32, distance_threshold: f64) -> Value {
        json!({
            "vertex_rag_store": {
                "rag_resources": [{"rag_corpus": self.corpus_name}],
                "vector_distance_threshold": distance_threshold,
            },
            "query": {
                "text": query,
                "rag_retrieval_config": {
                    "top_k": max_results,
                    "ranking": {
                        "rank_service": {"model_name": RERANKER_MODEL}
                    }
                }
            }
        })
    }

    async fn retrieve(
        &self,
        query: &str,
        max_results: u32,
        distance_threshold: f64,
    ) -> AppResult<RetrievalOutcome> {
        let token = self.tokens.access_token().await?;
        let body = self.request_body(query, max_results, distance_threshold);

        tracing::debug!(
            "Querying RAG corpus {} (top_k={}, max_distance={})",
            self.corpus_name,
            max_results,
            distance_threshold
        );

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Retrieval(format!("Vertex AI RAG request timed out: {}", e))
                } else if e.is_connect() {
                    AppError::Retrieval(format!("Connection to Vertex AI RAG API failed: {}", e))
                } else {
                    AppError::Retrieval(format!("Failed to reach Vertex AI RAG API: {}", e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());

            if status == StatusCode::NOT_IMPLEMENTED
                || error_text.to_lowercase().contains("not implemented")
            {
                tracing::warn!("RAG engine reports retrieval as not implemented");
                return Ok(RetrievalOutcome::Unavailable);
            }

            return Err(AppError::Retrieval(format!(
                "Vertex AI RAG API error ({}): {}",
                status, error_text
            )));
        }

        let payload: Value = response
            .json()
            .await
            .map_err(|e| AppError::Retrieval(format!("Failed to parse RAG response: {}", e)))?;

        Ok(RetrievalOutcome::Results(decode_contexts(payload)))
    }
}

#[async_trait::async_trait]
impl RetrievalClient for VertexRagClient {
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        distance_threshold: f64,
    ) -> AppResult<Vec<SearchResult>> {
        match self.retrieve(query, max_results, distance_threshold).await? {
            RetrievalOutcome::Results(results) => {
                tracing::info!("Retrieved {} chunks", results.len());
                Ok(results)
            }
            RetrievalOutcome::Unavailable => Ok(Vec::new()),
        }
    }

    async fn health_check(&self) -> ServiceHealth {
        match self.retrieve("test", 1, 1.0).await {
            Ok(RetrievalOutcome::Results(_)) => {
                tracing::info!("Vertex AI RAG connection test successful");
                ServiceHealth::Healthy
            }
            Ok(RetrievalOutcome::Unavailable) => {
                tracing::warn!("RAG engine not available, but connection established");
                ServiceHealth::Degraded
            }
            Err(e) => {
                tracing::error!("Vertex AI RAG connection test failed: {}", e);
                ServiceHealth::Unavailable
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as AxumStatus, routing::post, Json, Router};
    use whatsupdoc_llm::StaticToken;

    fn client(base_url: &str) -> VertexRagClient {
        VertexRagClient::new(
            "acme",
            "us-central1",
            "projects/acme/locations/us-central1/ragCorpora/42",
            Arc::new(StaticToken::new("tok")),
        )
        .with_base_url(base_url)
    }

    async fn serve(app: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_request_shape() {
        let body = client("http://x").request_body("PTO?", 7, 0.8);
        assert_eq!(
            body["vertex_rag_store"]["rag_resources"][0]["rag_corpus"],
            "projects/acme/locations/us-central1/ragCorpora/42"
        );
        assert_eq!(body["vertex_rag_store"]["vector_distance_threshold"], 0.8);
        assert_eq!(body["query"]["text"], "PTO?");
        assert_eq!(body["query"]["rag_retrieval_config"]["top_k"], 7);
        assert_eq!(
            body["query"]["rag_retrieval_config"]["ranking"]["rank_service"]["model_name"],
            RERANKER_MODEL
        );
    }

    #[test]
    fn test_endpoint() {
        let client = VertexRagClient::new("p", "europe-west4", "c", Arc::new(StaticToken::new("t")));
        assert_eq!(
            client.endpoint(),
            "https://europe-west4-aiplatform.googleapis.com/v1beta1/projects/p/locations/europe-west4:retrieveContexts"
        );
    }

    #[tokio::test]
    async fn test_search_decodes_results() {
        let app = Router::new().route(
            "/v1beta1/projects/{project}/locations/{location}",
            post(|| async {
                Json(serde_json::json!({
                    "contexts": {"contexts": [{"text": "PTO accrues monthly.", "distance": 0.1}]}
                }))
            }),
        );
        let base = serve(app).await;

        let results = client(&base).search("PTO?", 5, 0.8).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!((results[0].confidence_score - 0.9).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_not_implemented_is_empty_and_degraded() {
        let app = Router::new().route(
            "/v1beta1/projects/{project}/locations/{location}",
            post(|| async { (AxumStatus::NOT_IMPLEMENTED, "Method not implemented") }),
        );
        let base = serve(app).await;
        let client = client(&base);

        let results = client.search("anything", 5, 0.8).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(client.health_check().await, ServiceHealth::Degraded);
    }

    #[tokio::test]
    async fn test_server_error_is_retrieval_error() {
        let app = Router::new().route(
            "/v1beta1/projects/{project}/locations/{location}",
            post(|| async { (AxumStatus::SERVICE_UNAVAILABLE, "backend overloaded") }),
        );
        let base = serve(app).await;
        let client = client(&base);

        let err = client.search("q", 5, 0.8).await.unwrap_err();
        assert!(matches!(err, AppError::Retrieval(_)));
        assert!(err.is_retryable());
        assert_eq!(client.health_check().await, ServiceHealth::Unavailable);
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_unavailable() {
        let client = client("http://127.0.0.1:1");
        assert_eq!(client.health_check().await, ServiceHealth::Unavailable);
    }
}
