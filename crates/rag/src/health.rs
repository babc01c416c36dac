//! Dependency health.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use whatsupdoc_llm::LlmClient;

use crate::retrieval::RetrievalClient;

/// State of one external dependency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceHealth {
    /// Reachable and working
    Healthy,
    /// Reachable but a feature is missing (e.g. the RAG engine reports
    /// "not implemented")
    Degraded,
    /// Unreachable or rejecting our credentials
    Unavailable,
    /// Turned off by configuration
    Disabled,
}

impl ServiceHealth {
    /// Reachable at all.
    pub fn is_connected(self) -> bool {
        matches!(self, ServiceHealth::Healthy | ServiceHealth::Degraded)
    }
}

/// Health of both external services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub retrieval: ServiceHealth,
    pub generation: ServiceHealth,
}

impl HealthReport {
    /// Probe both services. `generation` is `None` when generation is disabled.
    pub async fn probe(
        retrieval: &dyn RetrievalClient,
        generation: Option<(&dyn LlmClient, &str)>,
        timeout: Duration,
    ) -> Self {
        let retrieval_health = match tokio::time::timeout(timeout, retrieval.health_check()).await
        {
            Ok(health) => health,
            Err(_) => {
                tracing::warn!("Retrieval health check timed out after {:?}", timeout);
                ServiceHealth::Unavailable
            }
        };

        let generation_health = match generation {
            None => ServiceHealth::Disabled,
            Some((llm, model)) => check_generation(llm, model, timeout).await,
        };

        Self {
            retrieval: retrieval_health,
            generation: generation_health,
        }
    }

    /// Overall status: unavailable without retrieval, degraded if anything
    /// else is less than healthy.
    pub fn overall(&self) -> ServiceHealth {
        if !self.retrieval.is_connected() {
            ServiceHealth::Unavailable
        } else if self.retrieval == ServiceHealth::Healthy
            && matches!(
                self.generation,
                ServiceHealth::Healthy | ServiceHealth::Disabled
            )
        {
            ServiceHealth::Healthy
        } else {
            ServiceHealth::Degraded
        }
    }
}

async fn check_generation(llm: &dyn LlmClient, model: &str, timeout: Duration) -> ServiceHealth {
    match tokio::time::timeout(timeout, llm.health_check(model)).await {
        Ok(Ok(())) => ServiceHealth::Healthy,
        Ok(Err(e)) => {
            tracing::warn!("Generation health check failed: {}", e);
            ServiceHealth::Unavailable
        }
        Err(_) => {
            tracing::warn!("Generation health check timed out after {:?}", timeout);
            ServiceHealth::Unavailable
        }
    }
}
