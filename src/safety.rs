//! Crisis-language screen.
//!
//! A fixed list of case-insensitive patterns (suicide, self-harm and
//! hopelessness idioms). No model, no I/O: the same text always yields the
//! same [`SafetyResult`].

use once_cell::sync::Lazy;
use regex::Regex;

use crate::models::SafetyResult;

pub const CRISIS_REASON: &str = "Detected crisis-related language.";

static CRISIS_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(suicid(e|al)|kill myself|end my life)\b",
        r"(?i)\b(self[-\s]?harm|hurt myself)\b",
        r"(?i)\b(no reason to live|want to die|can['\u{2019}]?t go on)\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("crisis pattern"))
    .collect()
});

pub fn detect_crisis(text: &str) -> SafetyResult {
    if CRISIS_PATTERNS.iter().any(|re| re.is_match(text)) {
        SafetyResult::crisis(CRISIS_REASON)
    } else {
        SafetyResult::safe()
    }
}

/// Screens several texts; the first crisis hit wins.
pub fn detect_crisis_any<'a, I>(texts: I) -> SafetyResult
where
    I: IntoIterator<Item = &'a str>,
{
    texts
        .into_iter()
        .map(detect_crisis)
        .find(|r| r.crisis)
        .unwrap_or_default()
}
