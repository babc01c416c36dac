//! `GET /api/health`.

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use whatsupdoc_rag::{HealthReport, ServiceHealth};

use super::WebState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ServiceHealth,
    pub version: String,
    pub timestamp: String,
    pub dependencies: HealthReport,
}

/// Retrieval is probed live; generation status is the one recorded at startup.
pub async fn health(State(state): State<WebState>) -> Json<HealthResponse> {
    let retrieval = match tokio::time::timeout(
        state.health_timeout,
        state.pipeline.retrieval().health_check(),
    )
    .await
    {
        Ok(health) => health,
        Err(_) => {
            tracing::warn!("Retrieval health check timed out after {:?}", state.health_timeout);
            ServiceHealth::Unavailable
        }
    };

    let dependencies = HealthReport {
        retrieval,
        generation: state.generation,
    };

    Json(HealthResponse {
        status: dependencies.overall(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        dependencies,
    })
}
