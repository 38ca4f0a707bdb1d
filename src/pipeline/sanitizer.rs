//! Reply sanitizer: normalizes and scrubs raw generated text.
//!
//! Three deterministic passes, in order:
//! 1. whitespace collapse + trim
//! 2. runs of 3+ repeated tokens collapse to the first occurrence
//! 3. truncation at the first closing/signature marker

use std::sync::LazyLock;

use regex::Regex;

/// Minimum length of a repeated-token run that gets collapsed.
const MIN_REPEAT_RUN: usize = 3;

/// Closing phrases and model meta-talk. Everything from the match onward is dropped.
static SIGNATURE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:best\s+regards|sincerely|assistant|ai\s+model)")
        .expect("signature marker pattern is valid")
});

/// Sanitize raw model output.
///
/// Never fails; the result may be empty. Each pass can expose new matches for
/// another (truncation can leave a fresh repeated run at the tail), so the
/// passes are repeated until the text stops changing. That keeps
/// `sanitize(sanitize(x)) == sanitize(x)`.
pub fn sanitize(raw_text: &str) -> String {
    let mut current = sanitize_pass(raw_text);
    loop {
        let next = sanitize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn sanitize_pass(text: &str) -> String {
    let normalized = normalize_whitespace(text);
    let deduped = collapse_repeated_runs(&normalized);
    truncate_at_signature(&deduped)
}

/// Collapse any whitespace run to a single space and trim both ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Replace every maximal run of `MIN_REPEAT_RUN`+ equal tokens with its first token.
///
/// Tokens are whitespace-separated; two tokens are equal when their word
/// characters match case-insensitively, so `thanks, thanks thanks.` is one run.
/// Punctuation-only tokens compare by their full text.
pub fn collapse_repeated_runs(text: &str) -> String {
    let tokens: Vec<&str> = text.split(' ').filter(|t| !t.is_empty()).collect();
    let mut out: Vec<&str> = Vec::with_capacity(tokens.len());

    let mut i = 0;
    while i < tokens.len() {
        let key = token_key(tokens[i]);
        let mut end = i + 1;
        while end < tokens.len() && token_key(tokens[end]) == key {
            end += 1;
        }
        let run = end - i;
        if run >= MIN_REPEAT_RUN {
            out.push(tokens[i]);
        } else {
            out.extend_from_slice(&tokens[i..end]);
        }
        i = end;
    }

    out.join(" ")
}

fn token_key(token: &str) -> String {
    let core: String = token
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect();
    if core.is_empty() {
        token.to_string()
    } else {
        core
    }
}

/// Drop everything from the first signature marker onward, then re-trim.
pub fn truncate_at_signature(text: &str) -> String {
    match SIGNATURE_MARKER.find(text) {
        Some(m) => text[..m.start()].trim().to_string(),
        None => text.trim().to_string(),
    }
}
