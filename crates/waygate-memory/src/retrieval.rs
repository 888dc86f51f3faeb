// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;
use std::sync::OnceLock;

use regex::Regex;

use crate::record::Memory;

const STOP_WORDS: &[&str] = &[
    "the", "and", "for", "are", "but", "not", "you", "all", "can", "had", "her", "was",
    "one", "our", "out", "day", "get", "has", "him", "his", "how", "man", "new", "now",
    "old", "see", "two", "way", "who", "boy", "did", "its", "let", "put", "say", "she",
    "too", "use", "with", "this", "that", "have", "from", "they", "will", "what", "when",
    "your", "about",
];

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\w+").unwrap())
}

fn stop_words() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

/// Splits on Unicode word boundaries, lowercases, and drops tokens shorter
/// than 3 characters or present in the stop-word set.
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    token_pattern()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .filter(|t| t.chars().count() >= 3 && !stop_words().contains(t.as_str()))
        .collect()
}

/// score = (query tokens substring-matching the lowercased content) +
/// 0.5 × (tags whose lowercased form is a substring of the lowercased
/// query), multiplied by `(1 + importance)` when set.
pub fn score(query_tokens: &[String], query_lower: &str, memory: &Memory) -> f64 {
    let content_lower = memory.content.to_lowercase();
    let content_hits = query_tokens.iter().filter(|t| content_lower.contains(t.as_str())).count() as f64;

    let tag_hits = memory
        .tags
        .iter()
        .filter(|tag| query_lower.contains(&tag.to_lowercase()))
        .count() as f64;

    let base = content_hits + 0.5 * tag_hits;
    base * (1.0 + memory.importance.unwrap_or(0.0))
}
