//! Query normalization.
//!
//! Strips Slack decoration from raw user text so that only the question
//! reaches retrieval.

use regex::Regex;
use std::sync::LazyLock;

/// Queries shorter than this (non-whitespace characters) are rejected.
pub const MIN_QUERY_CHARS: usize = 3;

static MENTION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<@[A-Z0-9]+>").unwrap());

static LEADING_COMMAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^/[A-Za-z][\w-]*(?:\s+|$)").unwrap());

/// Remove user mentions and a leading slash command, then trim.
///
/// Applied until nothing changes, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    let mut current = raw.trim().to_string();
    loop {
        let next = normalize_once(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_once(text: &str) -> String {
    let without_mentions = MENTION.replace_all(text, "");
    let trimmed = without_mentions.trim();
    LEADING_COMMAND.replace(trimmed, "").trim().to_string()
}

/// Whether a normalized query is too short to search for.
pub fn is_too_short(query: &str) -> bool {
    query.chars().filter(|c| !c.is_whitespace()).count() < MIN_QUERY_CHARS
}
