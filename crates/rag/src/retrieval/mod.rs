//! Retrieval against the managed vector corpus.
//!
//! The threshold passed to [`RetrievalClient::search`] is always a maximum
//! vector distance: lower values are stricter, higher values admit more
//! results. Callers holding a similarity-style confidence convert it with
//! [`distance_from_confidence`].

mod decode;
mod vertex;

pub use decode::decode_contexts;
pub use vertex::VertexRagClient;

use whatsupdoc_core::AppResult;

use crate::health::ServiceHealth;
use crate::types::SearchResult;

/// Similarity search over the document corpus.
#[async_trait::async_trait]
pub trait RetrievalClient: Send + Sync {
    /// One round trip to the backend; results keep the backend's ranking.
    ///
    /// A backend that reports the operation as not implemented yields an
    /// empty list rather than an error.
    async fn search(
        &self,
        query: &str,
        max_results: u32,
        distance_threshold: f64,
    ) -> AppResult<Vec<SearchResult>>;

    /// Connectivity self-check.
    async fn health_check(&self) -> ServiceHealth;
}

/// Convert a minimum confidence in [0, 1] into a maximum distance.
pub fn distance_from_confidence(confidence: f64) -> f64 {
    (1.0 - confidence.clamp(0.0, 1.0)).max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_from_confidence() {
        assert_eq!(distance_from_confidence(1.0), 0.0);
        assert_eq!(distance_from_confidence(0.0), 1.0);
        assert!((distance_from_confidence(0.7) - 0.3).abs() < 1e-9);
        assert_eq!(distance_from_confidence(3.0), 0.0);
    }
}
