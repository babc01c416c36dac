//! Decoder for `retrieveContexts` response envelopes.
//!
//! The RAG engine has answered in a few shapes over its API versions. Each
//! known shape is an explicit variant; anything else lands in `Unknown`.
//! Records are decoded one at a time so a malformed record never costs the
//! rest of the response.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::types::{confidence_from, SearchResult};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Envelope {
    /// `{"contexts": {"contexts": [...]}}` (v1beta1)
    Nested { contexts: NestedContexts },
    /// `{"contexts": [...]}`
    Flat { contexts: Vec<Value> },
    /// `{"ragChunks": [...]}` (SDK style)
    Chunks {
        #[serde(rename = "ragChunks")]
        rag_chunks: Vec<Value>,
    },
    Unknown(Value),
}

#[derive(Debug, Deserialize)]
struct NestedContexts {
    #[serde(default)]
    contexts: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawContext {
    #[serde(default, deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    content: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    chunk_text: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    source_uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    uri: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    source_display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    display_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    title: Option<String>,
    #[serde(default, deserialize_with = "lenient_f64")]
    distance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    score: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    relevance_score: Option<f64>,
    #[serde(default, deserialize_with = "lenient")]
    chunk: Option<RawChunk>,
    #[serde(default, deserialize_with = "lenient")]
    page_span: Option<PageSpan>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChunk {
    #[serde(default, deserialize_with = "lenient_string")]
    text: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    page_span: Option<PageSpan>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageSpan {
    #[serde(default, alias = "pageStart", deserialize_with = "lenient_u64")]
    first_page: Option<u64>,
    #[serde(default, alias = "pageEnd", deserialize_with = "lenient_u64")]
    last_page: Option<u64>,
}

/// Accept numbers or numeric strings; anything else is treated as absent.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

/// Strings only; a number or object where text belongs is treated as absent.
fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        _ => None,
    })
}

/// Nested objects that fail to decode are treated as absent.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| serde_json::from_value(v).ok()))
}

fn first_non_empty<'a>(candidates: &[&'a Option<String>]) -> Option<&'a str> {
    candidates
        .iter()
        .filter_map(|c| c.as_deref())
        .map(str::trim)
        .find(|s| !s.is_empty())
}

fn file_name(uri: &str) -> Option<&str> {
    uri.trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty() && !name.ends_with(':'))
}

impl RawContext {
    fn into_result(self, index: usize) -> SearchResult {
        let chunk_text = self.chunk.as_ref().and_then(|c| c.text.clone());
        let content = first_non_empty(&[&self.text, &self.content, &self.chunk_text, &chunk_text])
            .unwrap_or("")
            .to_string();

        let source_uri = first_non_empty(&[&self.source_uri, &self.uri])
            .unwrap_or("")
            .to_string();

        let title = first_non_empty(&[&self.source_display_name, &self.display_name, &self.title])
            .map(str::to_string)
            .or_else(|| file_name(&source_uri).map(str::to_string))
            .unwrap_or_else(|| format!("Document {}", index + 1));

        let score = self.score.or(self.relevance_score);
        let confidence = confidence_from(self.distance, score);

        let page_span = self
            .chunk
            .as_ref()
            .and_then(|c| c.page_span)
            .or(self.page_span);

        let mut metadata = Map::new();
        metadata.insert("chunk_index".into(), index.into());
        metadata.insert("chunk_length".into(), content.chars().count().into());
        if let Some(span) = page_span {
            if let Some(start) = span.first_page {
                metadata.insert("page_start".into(), start.into());
                metadata.insert("page_end".into(), span.last_page.unwrap_or(start).into());
            }
        }
        let document_id = if source_uri.is_empty() {
            title.clone()
        } else {
            source_uri.clone()
        };
        metadata.insert("document_id".into(), document_id.into());

        SearchResult {
            title,
            content,
            source_uri,
            confidence_score: confidence,
            metadata,
        }
    }
}

/// Map a raw response body to search results, in backend order.
pub fn decode_contexts(body: Value) -> Vec<SearchResult> {
    let contexts = match serde_json::from_value::<Envelope>(body) {
        Ok(Envelope::Nested { contexts }) => contexts.contexts,
        Ok(Envelope::Flat { contexts }) => contexts,
        Ok(Envelope::Chunks { rag_chunks }) => rag_chunks,
        Ok(Envelope::Unknown(value)) => {
            let empty = match &value {
                Value::Object(map) => map.is_empty(),
                Value::Null => true,
                _ => false,
            };
            if !empty {
                tracing::warn!("Unrecognized retrieval response shape; treating as no results");
                tracing::debug!("Unrecognized response: {}", value);
            }
            Vec::new()
        }
        Err(e) => {
            tracing::warn!("Failed to decode retrieval response: {}", e);
            Vec::new()
        }
    };

    contexts
        .into_iter()
        .enumerate()
        .filter_map(|(i, record)| match serde_json::from_value::<RawContext>(record) {
            Ok(raw) => Some(raw.into_result(i)),
            Err(e) => {
                tracing::warn!("Skipping unreadable retrieval record {}: {}", i, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_envelope() {
        let results = decode_contexts(json!({
            "contexts": {"contexts": [
                {
                    "sourceUri": "gs://docs/handbook.pdf",
                    "sourceDisplayName": "Employee Handbook",
                    "text": "PTO accrues monthly.",
                    "distance": 0.2,
                    "chunk": {"text": "ignored", "pageSpan": {"firstPage": 4, "lastPage": 5}}
                },
                {"text": "Second", "score": 0.55}
            ]}
        }));

        assert_eq!(results.len(), 2);
        let first = &results[0];
        assert_eq!(first.title, "Employee Handbook");
        assert_eq!(first.content, "PTO accrues monthly.");
        assert_eq!(first.source_uri, "gs://docs/handbook.pdf");
        assert!((first.confidence_score - 0.8).abs() < 1e-9);
        assert_eq!(first.page_span(), Some((4, 5)));
        assert_eq!(first.metadata["chunk_index"], 0);
        assert_eq!(first.document_id(), "gs://docs/handbook.pdf");

        let second = &results[1];
        assert_eq!(second.title, "Document 2");
        assert_eq!(second.confidence_score, 0.55);
    }

    #[test]
    fn test_flat_envelope_with_fallback_fields() {
        let results = decode_contexts(json!({
            "contexts": [
                {"content": "", "chunkText": "Body", "uri": "gs://b/policies/travel.pdf", "relevanceScore": "0.9"}
            ]
        }));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].content, "Body");
        assert_eq!(results[0].title, "travel.pdf");
        assert_eq!(results[0].confidence_score, 0.9);
    }

    #[test]
    fn test_rag_chunks_envelope() {
        let results = decode_contexts(json!({
            "ragChunks": [{"text": "x", "pageSpan": {"pageStart": 2, "pageEnd": 2}}]
        }));

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].confidence_score, 0.8);
        assert_eq!(results[0].page_span(), Some((2, 2)));
    }

    #[test]
    fn test_empty_and_unknown_shapes() {
        assert!(decode_contexts(json!({})).is_empty());
        assert!(decode_contexts(json!({"contexts": {}})).is_empty());
        assert!(decode_contexts(json!({"something": "else"})).is_empty());
        assert!(decode_contexts(json!([1, 2, 3])).is_empty());
    }

    #[test]
    fn test_wrong_typed_fields_spare_the_other_records() {
        let results = decode_contexts(json!({
            "contexts": {"contexts": [
                {"text": "good chunk", "distance": 0.2},
                {"text": "other", "sourceDisplayName": 42},
                {"text": "paged", "uri": "gs://b/guide.pdf", "pageSpan": {"firstPage": "3", "lastPage": [9]}},
                {"text": "bad span", "chunk": "not an object", "distance": {"x": 1}},
                "not a record"
            ]}
        }));

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].content, "good chunk");
        assert_eq!(results[1].content, "other");
        assert_eq!(results[1].title, "Document 2");
        assert_eq!(results[2].title, "guide.pdf");
        assert_eq!(results[2].page_span(), Some((3, 3)));
        assert_eq!(results[3].content, "bad span");
        assert_eq!(results[3].page_span(), None);
        assert_eq!(results[3].confidence_score, 0.8);
    }

    #[test]
    fn test_extreme_distances_are_clamped() {
        let results = decode_contexts(json!({
            "contexts": [{"text": "a", "distance": -5}, {"text": "b", "distance": 5}]
        }));
        assert_eq!(results[0].confidence_score, 1.0);
        assert_eq!(results[1].confidence_score, 0.1);
    }
}
