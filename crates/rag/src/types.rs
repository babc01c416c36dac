//! RAG data model.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Confidence assigned when the backend reports neither a distance nor a score.
pub const DEFAULT_CONFIDENCE: f64 = 0.8;

/// Lowest confidence a distance can map to.
pub const MIN_DISTANCE_CONFIDENCE: f64 = 0.1;

/// Derive a confidence in [0, 1] from whatever relevance signal is present.
///
/// A distance wins over a score: `clamp(1 - distance, 0.1, 1.0)`. A score is
/// taken as-is but still clamped to [0, 1].
pub fn confidence_from(distance: Option<f64>, score: Option<f64>) -> f64 {
    match (distance.filter(|d| d.is_finite()), score.filter(|s| s.is_finite())) {
        (Some(distance), _) => (1.0 - distance).clamp(MIN_DISTANCE_CONFIDENCE, 1.0),
        (None, Some(score)) => score.clamp(0.0, 1.0),
        (None, None) => DEFAULT_CONFIDENCE,
    }
}

/// One retrieved chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// Label for the source document or chunk
    pub title: String,

    /// Full chunk text used for generation
    pub content: String,

    /// Origin locator, may be empty
    pub source_uri: String,

    /// Relevance in [0, 1]
    pub confidence_score: f64,

    /// Chunk index, length, page span, document id
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    /// Create a result with the default confidence and no source URI.
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            source_uri: String::new(),
            confidence_score: DEFAULT_CONFIDENCE,
            metadata: Map::new(),
        }
    }

    pub fn with_source_uri(mut self, uri: impl Into<String>) -> Self {
        self.source_uri = uri.into();
        self
    }

    /// Set the confidence, clamped to [0, 1].
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence_score = confidence_from(None, Some(confidence));
        self
    }

    pub fn with_metadata(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.to_string(), value.into());
        self
    }

    /// Identifier of the originating document, used to group chunks.
    pub fn document_id(&self) -> &str {
        self.metadata
            .get("document_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(if self.source_uri.is_empty() {
                self.title.as_str()
            } else {
                self.source_uri.as_str()
            })
    }

    /// First and last page of the chunk, when known.
    pub fn page_span(&self) -> Option<(u64, u64)> {
        let start = self.metadata.get("page_start").and_then(Value::as_u64)?;
        let end = self
            .metadata
            .get("page_end")
            .and_then(Value::as_u64)
            .unwrap_or(start);
        Some((start, end.max(start)))
    }
}

/// The generated answer bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagResponse {
    /// Generated text or a canned fallback message
    pub answer: String,

    /// Results actually placed in the context, in order
    pub sources: Vec<SearchResult>,

    /// Mean confidence over `sources`; 0.0 when empty
    pub confidence_score: f64,

    /// Whether the answer references a numbered source
    pub has_citations: bool,
}

impl RagResponse {
    /// Build a response, deriving confidence from `sources`.
    pub fn new(answer: impl Into<String>, sources: Vec<SearchResult>, has_citations: bool) -> Self {
        let confidence_score = mean_confidence(&sources);
        Self {
            answer: answer.into(),
            sources,
            confidence_score,
            has_citations,
        }
    }

    /// A canned message with no sources and zero confidence.
    pub fn canned(answer: impl Into<String>) -> Self {
        Self::new(answer, Vec::new(), false)
    }
}

/// Arithmetic mean of the results' confidence, 0.0 for none.
pub fn mean_confidence(results: &[SearchResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.confidence_score).sum::<f64>() / results.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance_is_clamped() {
        assert_eq!(confidence_from(Some(-5.0), None), 1.0);
        assert_eq!(confidence_from(Some(5.0), None), 0.1);
        assert!((confidence_from(Some(0.25), Some(0.1)) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_score_used_when_no_distance() {
        assert_eq!(confidence_from(None, Some(0.42)), 0.42);
        assert_eq!(confidence_from(None, Some(7.0)), 1.0);
        assert_eq!(confidence_from(None, Some(-1.0)), 0.0);
        assert_eq!(confidence_from(Some(f64::NAN), Some(0.3)), 0.3);
    }

    #[test]
    fn test_default_confidence() {
        assert_eq!(confidence_from(None, None), DEFAULT_CONFIDENCE);
    }

    #[test]
    fn test_mean_confidence() {
        let results = vec![
            SearchResult::new("a", "x").with_confidence(0.9),
            SearchResult::new("b", "y").with_confidence(0.6),
            SearchResult::new("c", "z").with_confidence(0.3),
        ];
        assert!((mean_confidence(&results) - 0.6).abs() < 1e-9);
        assert_eq!(mean_confidence(&[]), 0.0);
    }

    #[test]
    fn test_document_id_fallbacks() {
        let by_title = SearchResult::new("Handbook", "x");
        assert_eq!(by_title.document_id(), "Handbook");

        let by_uri = SearchResult::new("Handbook", "x").with_source_uri("gs://b/handbook.pdf");
        assert_eq!(by_uri.document_id(), "gs://b/handbook.pdf");

        let explicit = by_uri.with_metadata("document_id", "doc-7");
        assert_eq!(explicit.document_id(), "doc-7");
    }

    #[test]
    fn test_page_span() {
        let result = SearchResult::new("t", "c")
            .with_metadata("page_start", 3)
            .with_metadata("page_end", 5);
        assert_eq!(result.page_span(), Some((3, 5)));

        let single = SearchResult::new("t", "c").with_metadata("page_start", 2);
        assert_eq!(single.page_span(), Some((2, 2)));

        assert_eq!(SearchResult::new("t", "c").page_span(), None);
    }
}
