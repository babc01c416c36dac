//! Response formatting.
//!
//! Pure presentation over [`RagResponse`](crate::RagResponse) and
//! [`PipelineOutcome`](crate::PipelineOutcome). Nothing here recomputes
//! confidence or mutates a response.

pub mod slack;
pub mod web;

pub use slack::{Block, SlackMessage, TextObject};
pub use web::{source_label, WebAnswer};

use std::time::Duration;

use whatsupdoc_core::{AppError, ErrorKind};

/// Longest query echoed back inside a notice.
const QUERY_ECHO_MAX_CHARS: usize = 200;

/// Confidence indicator tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceTier {
    High,
    Medium,
    Low,
}

impl ConfidenceTier {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            ConfidenceTier::High
        } else if score >= 0.4 {
            ConfidenceTier::Medium
        } else {
            ConfidenceTier::Low
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            ConfidenceTier::High => "🟢",
            ConfidenceTier::Medium => "🟡",
            ConfidenceTier::Low => "🔴",
        }
    }
}

/// Score as a whole percentage.
pub fn percent(score: f64) -> String {
    format!("{:.0}%", score * 100.0)
}

pub fn too_short_message() -> String {
    "Please provide a research question. For example: 'What is our parental leave policy?'"
        .to_string()
}

/// "minute", "5 minutes", "90 seconds".
fn window_phrase(window: Duration) -> String {
    let secs = window.as_secs().max(1);
    match secs {
        60 => "minute".to_string(),
        1 => "second".to_string(),
        s if s % 3600 == 0 && s > 3600 => format!("{} hours", s / 3600),
        3600 => "hour".to_string(),
        s if s % 60 == 0 => format!("{} minutes", s / 60),
        s => format!("{} seconds", s),
    }
}

pub fn rate_limited_message(limit: u32, window: Duration) -> String {
    format!(
        "⚠️ Rate limit exceeded. You can ask up to {} questions per {}. Please wait a moment and try again.",
        limit,
        window_phrase(window)
    )
}

pub fn loading_message(query: &str) -> String {
    format!(
        "🔍 Searching and analyzing documents for: `{}`...",
        truncate_chars(query, QUERY_ECHO_MAX_CHARS)
    )
}

pub fn no_results_message(query: &str) -> String {
    format!(
        "🤔 No relevant documents found for: `{}`. Try rephrasing your question or using different keywords.",
        truncate_chars(query, QUERY_ECHO_MAX_CHARS)
    )
}

/// User-facing text for a failed request, chosen by error kind.
pub fn error_message(error: &AppError) -> String {
    match error.kind() {
        ErrorKind::Capacity => "⚠️ Service capacity reached. Please try again in a few minutes.",
        ErrorKind::Timeout => "⏱️ Search timed out. Please try a more specific question.",
        ErrorKind::Authentication => "🔒 Authentication issue. Please contact support.",
        ErrorKind::Transient | ErrorKind::Unavailable => {
            "❌ Search service unavailable. Please try again later."
        }
        ErrorKind::InvalidInput | ErrorKind::Internal => {
            "❌ Sorry, I encountered a technical issue. Please try again later."
        }
    }
    .to_string()
}

/// Truncate to at most `max_chars` characters, ending with `...` when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_tiers() {
        assert_eq!(ConfidenceTier::from_score(0.7), ConfidenceTier::High);
        assert_eq!(ConfidenceTier::from_score(0.69), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.4), ConfidenceTier::Medium);
        assert_eq!(ConfidenceTier::from_score(0.39), ConfidenceTier::Low);
        assert_eq!(ConfidenceTier::High.emoji(), "🟢");
    }

    #[test]
    fn test_error_messages_by_kind() {
        let quota = AppError::Llm("429 quota exceeded".into());
        assert!(error_message(&quota).contains("capacity"));

        let auth = AppError::Retrieval("401 Unauthorized".into());
        assert!(error_message(&auth).contains("Authentication"));

        let timeout = AppError::Timeout {
            service: "retrieval",
            seconds: 30,
        };
        assert!(error_message(&timeout).contains("timed out"));

        let other = AppError::Other("boom".into());
        assert!(error_message(&other).contains("technical issue"));
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("abcdefghij", 8), "abcde...");
        assert_eq!(truncate_chars("ééééé", 4), "é...");
    }

    #[test]
    fn test_rate_limit_message_names_the_window() {
        let minute = rate_limited_message(10, Duration::from_secs(60));
        assert!(minute.contains("up to 10 questions per minute."));
        assert!(rate_limited_message(3, Duration::from_secs(300)).contains("per 5 minutes."));
        assert!(rate_limited_message(3, Duration::from_secs(90)).contains("per 90 seconds."));
        assert!(rate_limited_message(3, Duration::from_secs(3600)).contains("per hour."));
    }

    #[test]
    fn test_long_queries_are_cut_in_notices() {
        let query = "x".repeat(3500);
        let message = no_results_message(&query);
        assert!(message.contains(&format!("`{}...`", "x".repeat(QUERY_ECHO_MAX_CHARS - 3))));
        assert!(message.chars().count() < 400);
        assert!(loading_message(&query).chars().count() < 300);
        assert_eq!(
            loading_message("PTO policy"),
            "🔍 Searching and analyzing documents for: `PTO policy`..."
        );
    }

    #[test]
    fn test_percent() {
        assert_eq!(percent(0.6), "60%");
        assert_eq!(percent(1.0), "100%");
    }
}
