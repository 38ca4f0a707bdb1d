//! Quality gate for sanitized replies.
//!
//! A rejected reply is not an error: the generator swaps in the department's
//! fallback template.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

/// Replies shorter than this (in characters, ignoring surrounding whitespace)
/// are rejected.
pub const MIN_REPLY_CHARS: usize = 12;

/// A word occurring this many times anywhere in the reply rejects it.
pub const MAX_TOKEN_OCCURRENCES: usize = 5;

/// Apology phrases, matched on word boundaries against the case-folded text.
static FORBIDDEN_PHRASES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\bi['’]?m sorry\b",
        r"\bsorry\b",
        r"\bi apologize\b",
        r"\bapologize\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("forbidden phrase pattern is valid"))
    .collect()
});

static WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\w+").expect("word pattern is valid"));

/// Why a reply was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    TooShort,
    Apology,
    Repetition,
}

/// `true` when the reply must be replaced by the fallback template.
pub fn is_low_quality(text: &str) -> bool {
    check(text).is_some()
}

/// Run the gate and report the first failing rule.
pub fn check(text: &str) -> Option<Rejection> {
    if text.trim().chars().count() < MIN_REPLY_CHARS {
        return Some(Rejection::TooShort);
    }

    let lower = text.to_lowercase();
    if contains_forbidden_phrase(&lower) {
        return Some(Rejection::Apology);
    }

    // Counts every occurrence, adjacent or not.
    if has_excessive_repetition(&lower) {
        return Some(Rejection::Repetition);
    }

    None
}

fn contains_forbidden_phrase(lower: &str) -> bool {
    FORBIDDEN_PHRASES.iter().any(|re| re.is_match(lower))
}

fn has_excessive_repetition(lower: &str) -> bool {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for word in WORD.find_iter(lower) {
        let count = counts.entry(word.as_str()).or_insert(0);
        *count += 1;
        if *count >= MAX_TOKEN_OCCURRENCES {
            return true;
        }
    }
    false
}
