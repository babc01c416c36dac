//! JSON rendering for the web chat API.

use serde::{Deserialize, Serialize};

use super::truncate_chars;
use crate::generator::NO_INFORMATION_ANSWER;
use crate::types::{mean_confidence, RagResponse, SearchResult};

const EXCERPT_MAX_CHARS: usize = 300;

/// Label shown for one source: the title plus its page span, if any.
pub fn source_label(result: &SearchResult) -> String {
    match result.page_span() {
        Some((start, end)) if start == end => format!("{} (page {})", result.title, start),
        Some((start, end)) => format!("{} (pages {}-{})", result.title, start, end),
        None => result.title.clone(),
    }
}

/// Distinct labels in order.
fn labels(sources: &[SearchResult]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for source in sources {
        let label = source_label(source);
        if !labels.contains(&label) {
            labels.push(label);
        }
    }
    labels
}

/// Answer payload of the chat endpoint, before request bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebAnswer {
    pub answer: String,
    pub confidence: f64,
    pub sources: Vec<String>,
}

impl WebAnswer {
    pub fn from_response(response: &RagResponse) -> Self {
        Self {
            answer: response.answer.clone(),
            confidence: response.confidence_score,
            sources: labels(&response.sources),
        }
    }

    /// Excerpt listing for search-only mode.
    pub fn from_search_results(results: &[SearchResult]) -> Self {
        let mut answer = String::from("Here are the most relevant excerpts I found:\n");
        for (i, result) in results.iter().enumerate() {
            answer.push_str(&format!(
                "\n{}. {}: {}\n",
                i + 1,
                source_label(result),
                truncate_chars(result.content.trim(), EXCERPT_MAX_CHARS)
            ));
        }
        Self {
            answer,
            confidence: mean_confidence(results),
            sources: labels(results),
        }
    }

    pub fn no_results() -> Self {
        Self {
            answer: NO_INFORMATION_ANSWER.to_string(),
            confidence: 0.0,
            sources: Vec::new(),
        }
    }
}
