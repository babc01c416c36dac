//! Slack Block Kit rendering.

use serde::{Deserialize, Serialize};

use super::{percent, truncate_chars, ConfidenceTier};
use crate::types::{RagResponse, SearchResult};

/// Slack caps header text at 150 characters.
const HEADER_MAX_CHARS: usize = 150;

/// Slack caps section text at 3000 characters.
const SECTION_MAX_CHARS: usize = 3000;

/// Document names listed in the attribution line.
const TOP_DOCUMENTS: usize = 3;

/// Preview length for the most relevant excerpt.
const PREVIEW_MAX_CHARS: usize = 300;

/// Results listed in search-only replies.
const SEARCH_RESULTS_SHOWN: usize = 5;

const ANSWER_TIP: &str = "💡 *Tip:* This answer was generated from your company documents. For follow-up questions, try asking for more details or clarification on specific points.";

const SEARCH_ONLY_TIP: &str = "💡 *Tip:* AI answers are currently unavailable, so these are the closest matching excerpts from your company documents.";

/// Text object inside a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextObject {
    PlainText { text: String, emoji: bool },
    Mrkdwn { text: String },
}

impl TextObject {
    pub fn plain(text: impl Into<String>) -> Self {
        TextObject::PlainText {
            text: text.into(),
            emoji: true,
        }
    }

    pub fn mrkdwn(text: impl Into<String>) -> Self {
        TextObject::Mrkdwn { text: text.into() }
    }

    pub fn text(&self) -> &str {
        match self {
            TextObject::PlainText { text, .. } | TextObject::Mrkdwn { text } => text,
        }
    }
}

/// The subset of Block Kit the bot emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Header { text: TextObject },
    Section { text: TextObject },
    Context { elements: Vec<TextObject> },
    Divider,
}

impl Block {
    fn header(text: &str) -> Self {
        Block::Header {
            text: TextObject::plain(truncate_chars(text, HEADER_MAX_CHARS)),
        }
    }

    fn section(text: impl Into<String>) -> Self {
        Block::Section {
            text: TextObject::mrkdwn(text),
        }
    }

    fn context(text: impl Into<String>) -> Self {
        Block::Context {
            elements: vec![TextObject::mrkdwn(text)],
        }
    }
}

/// A message ready for `chat.postMessage`, `chat.update` or a `response_url`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlackMessage {
    /// Notification fallback text
    pub text: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocks: Vec<Block>,
}

impl SlackMessage {
    /// Concatenated text of every block, for console output and tests.
    pub fn plain_text(&self) -> String {
        if self.blocks.is_empty() {
            return self.text.clone();
        }
        let mut lines = Vec::new();
        for block in &self.blocks {
            match block {
                Block::Header { text } | Block::Section { text } => {
                    lines.push(text.text().to_string())
                }
                Block::Context { elements } => {
                    lines.extend(elements.iter().map(|e| e.text().to_string()))
                }
                Block::Divider => lines.push("---".to_string()),
            }
        }
        lines.join("\n")
    }
}

/// A single-section message, used for placeholders and canned replies.
pub fn format_notice(text: impl Into<String>) -> SlackMessage {
    let text = truncate_chars(&text.into(), SECTION_MAX_CHARS);
    SlackMessage {
        blocks: vec![Block::section(text.clone())],
        text,
    }
}

/// Split text into pieces of at most `max_chars`, preferring line breaks.
fn split_sections(text: &str, max_chars: usize) -> Vec<String> {
    let mut sections = Vec::new();
    let mut rest: Vec<char> = text.chars().collect();

    while rest.len() > max_chars {
        let window = &rest[..max_chars];
        let cut = window
            .iter()
            .rposition(|&c| c == '\n')
            .filter(|&i| i > 0)
            .unwrap_or(max_chars);
        sections.push(rest[..cut].iter().collect::<String>());
        let skip = if cut < rest.len() && rest[cut] == '\n' {
            cut + 1
        } else {
            cut
        };
        rest.drain(..skip);
    }
    if !rest.is_empty() || sections.is_empty() {
        sections.push(rest.into_iter().collect());
    }
    sections
}

/// Distinct document names in first-seen order.
fn document_names(sources: &[SearchResult]) -> Vec<&str> {
    let mut seen = Vec::new();
    let mut names = Vec::new();
    for source in sources {
        let id = source.document_id();
        if !seen.contains(&id) {
            seen.push(id);
            names.push(source.title.as_str());
        }
    }
    names
}

fn attribution_blocks(sources: &[SearchResult]) -> Vec<Block> {
    let names = document_names(sources);
    let mut listed = names
        .iter()
        .take(TOP_DOCUMENTS)
        .map(|n| format!("• {}", n))
        .collect::<Vec<_>>()
        .join("\n");
    if names.len() > TOP_DOCUMENTS {
        listed.push_str(&format!("\n_+{} more_", names.len() - TOP_DOCUMENTS));
    }

    let mut blocks = vec![Block::section(format!("📚 *Sources*\n{}", listed))];

    let best = sources.iter().fold(None::<&SearchResult>, |best, s| match best {
        Some(b) if b.confidence_score >= s.confidence_score => Some(b),
        _ => Some(s),
    });
    if let Some(best) = best {
        blocks.push(Block::context(format!(
            "*Most relevant excerpt* ({}):\n> {}",
            best.title,
            truncate_chars(best.content.trim(), PREVIEW_MAX_CHARS).replace('\n', " ")
        )));
    }
    blocks
}

/// Render a generated answer.
pub fn format_answer(query: &str, response: &RagResponse) -> SlackMessage {
    let tier = ConfidenceTier::from_score(response.confidence_score);
    let mut blocks = vec![
        Block::header(&format!("🤖 Answer: {}", query)),
        Block::context(format!(
            "{} Confidence: {} • Sources: {} documents",
            tier.emoji(),
            percent(response.confidence_score),
            response.sources.len()
        )),
        Block::Divider,
    ];

    blocks.extend(
        split_sections(&response.answer, SECTION_MAX_CHARS)
            .into_iter()
            .map(Block::section),
    );

    if !response.sources.is_empty() {
        blocks.push(Block::Divider);
        blocks.extend(attribution_blocks(&response.sources));
    }

    blocks.push(Block::Divider);
    blocks.push(Block::context(ANSWER_TIP));

    SlackMessage {
        text: truncate_chars(&response.answer, SECTION_MAX_CHARS),
        blocks,
    }
}

/// Render raw retrieval results when generation is unavailable.
pub fn format_search_results(query: &str, results: &[SearchResult]) -> SlackMessage {
    let mut blocks = vec![
        Block::header(&format!("🔍 Search results: {}", query)),
        Block::context(format!("Found {} relevant excerpts", results.len())),
        Block::Divider,
    ];

    for (i, result) in results.iter().take(SEARCH_RESULTS_SHOWN).enumerate() {
        let tier = ConfidenceTier::from_score(result.confidence_score);
        let mut text = format!(
            "*{}. {}* {} {}\n{}",
            i + 1,
            result.title,
            tier.emoji(),
            percent(result.confidence_score),
            truncate_chars(result.content.trim(), PREVIEW_MAX_CHARS)
        );
        if !result.source_uri.is_empty() {
            text.push_str(&format!("\n<{}>", result.source_uri));
        }
        blocks.push(Block::section(truncate_chars(&text, SECTION_MAX_CHARS)));
    }

    if results.len() > SEARCH_RESULTS_SHOWN {
        blocks.push(Block::context(format!(
            "_+{} more results_",
            results.len() - SEARCH_RESULTS_SHOWN
        )));
    }

    blocks.push(Block::Divider);
    blocks.push(Block::context(SEARCH_ONLY_TIP));

    SlackMessage {
        text: format!("Found {} relevant excerpts for: {}", results.len(), query),
        blocks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(title: &str, uri: &str, confidence: f64) -> SearchResult {
        SearchResult::new(title, format!("Content of {}", title))
            .with_source_uri(uri)
            .with_confidence(confidence)
    }

    #[test]
    fn test_block_serialization() {
        let json = serde_json::to_value(Block::header("Hi")).unwrap();
        assert_eq!(json["type"], "header");
        assert_eq!(json["text"]["type"], "plain_text");
        assert_eq!(json["text"]["emoji"], true);

        let json = serde_json::to_value(Block::Divider).unwrap();
        assert_eq!(json, serde_json::json!({"type": "divider"}));

        let json = serde_json::to_value(Block::context("c")).unwrap();
        assert_eq!(json["elements"][0]["type"], "mrkdwn");
    }

    #[test]
    fn test_answer_layout() {
        let response = RagResponse::new(
            "Employees get 20 days (Source 1).",
            vec![
                source("Handbook", "gs://b/handbook.pdf", 0.9),
                source("Handbook", "gs://b/handbook.pdf", 0.8),
                source("Policy", "gs://b/policy.pdf", 0.7),
            ],
            true,
        );
        let message = format_answer("How much PTO?", &response);

        assert!(matches!(&message.blocks[0], Block::Header { text } if text.text() == "🤖 Answer: How much PTO?"));
        let summary = match &message.blocks[1] {
            Block::Context { elements } => elements[0].text().to_string(),
            other => panic!("unexpected block {:?}", other),
        };
        assert_eq!(summary, "🟢 Confidence: 80% • Sources: 3 documents");

        let text = message.plain_text();
        assert!(text.contains("• Handbook\n• Policy"));
        assert!(!text.contains("more_"));
        assert!(text.contains("Most relevant excerpt* (Handbook)"));
        assert!(text.ends_with(ANSWER_TIP));
    }

    #[test]
    fn test_attribution_caps_document_names() {
        let sources: Vec<_> = (0..5)
            .map(|i| source(&format!("Doc {}", i), &format!("gs://b/{}.pdf", i), 0.5))
            .collect();
        let message = format_answer("q", &RagResponse::new("a", sources, false));
        let text = message.plain_text();
        assert!(text.contains("• Doc 2"));
        assert!(!text.contains("• Doc 3"));
        assert!(text.contains("_+2 more_"));
    }

    #[test]
    fn test_no_sources_has_no_attribution_but_keeps_tip() {
        let message = format_answer("q", &RagResponse::canned("Nothing found."));
        let text = message.plain_text();
        assert!(!text.contains("Sources*"));
        assert!(text.contains("🔴 Confidence: 0%"));
        assert!(text.ends_with(ANSWER_TIP));
    }

    #[test]
    fn test_preview_is_truncated() {
        let long = SearchResult::new("Long", "w".repeat(1000)).with_confidence(0.9);
        let message = format_answer("q", &RagResponse::new("a", vec![long], false));
        let excerpt = message
            .plain_text()
            .lines()
            .find(|l| l.starts_with("> "))
            .unwrap()
            .to_string();
        assert_eq!(excerpt.chars().count(), 2 + PREVIEW_MAX_CHARS);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_long_answers_split_into_sections() {
        let answer = format!("{}\n{}", "a".repeat(2500), "b".repeat(2500));
        let message = format_answer("q", &RagResponse::canned(answer));
        let sections: Vec<_> = message
            .blocks
            .iter()
            .filter_map(|b| match b {
                Block::Section { text } => Some(text.text().chars().count()),
                _ => None,
            })
            .collect();
        assert_eq!(sections, vec![2500, 2500]);

        let unbroken = split_sections(&"x".repeat(7000), SECTION_MAX_CHARS);
        assert_eq!(unbroken.len(), 3);
        assert!(unbroken.iter().all(|s| s.chars().count() <= SECTION_MAX_CHARS));
    }

    #[test]
    fn test_header_is_truncated() {
        let message = format_answer(&"q".repeat(400), &RagResponse::canned("a"));
        match &message.blocks[0] {
            Block::Header { text } => assert_eq!(text.text().chars().count(), HEADER_MAX_CHARS),
            other => panic!("unexpected block {:?}", other),
        }
    }

    #[test]
    fn test_search_results_listing() {
        let results: Vec<_> = (0..7)
            .map(|i| source(&format!("Doc {}", i), "", 0.45))
            .collect();
        let message = format_search_results("travel policy", &results);
        let text = message.plain_text();
        assert!(text.contains("*1. Doc 0* 🟡 45%"));
        assert!(!text.contains("Doc 5"));
        assert!(text.contains("_+2 more results_"));
        assert_eq!(message.text, "Found 7 relevant excerpts for: travel policy");
    }

    #[test]
    fn test_notice() {
        let message = format_notice("hello");
        assert_eq!(message.text, "hello");
        assert_eq!(message.blocks.len(), 1);
    }

    #[test]
    fn test_long_notice_fits_in_one_section() {
        let message = format_notice("y".repeat(3500));
        match &message.blocks[0] {
            Block::Section { text } => {
                assert_eq!(text.text().chars().count(), SECTION_MAX_CHARS);
                assert!(text.text().ends_with("..."));
            }
            other => panic!("unexpected block {:?}", other),
        }
        assert_eq!(message.text.chars().count(), SECTION_MAX_CHARS);
    }
}
