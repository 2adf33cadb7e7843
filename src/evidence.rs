//! Evidence selection: which entries justify a prompt, plan or theme, and
//! how their text is excerpted.
//!
//! Selection never re-ranks. Callers hand over an already-ordered sequence
//! and get the first `limit` distinct entries back; variety comes from the
//! upstream ordering.

use std::collections::{HashMap, HashSet};

use crate::models::{Entry, EvidenceCard, Theme};
use crate::text::collapse_whitespace;

/// Snippet length for prompts, plans and weekly cards.
pub const CARD_SNIPPET_LIMIT: usize = 140;
/// Snippet length for theme members.
pub const THEME_SNIPPET_LIMIT: usize = 160;

/// Whitespace-collapsed excerpt of at most `limit` characters, with `...`
/// appended (after trimming trailing whitespace) when the text was cut.
pub fn snippet(text: &str, limit: usize) -> String {
    let cleaned = collapse_whitespace(text);
    if cleaned.chars().count() <= limit {
        return cleaned;
    }
    let cut: String = cleaned.chars().take(limit).collect();
    format!("{}...", cut.trim_end())
}

/// Concatenate two entry lists, keeping the first occurrence of each
/// `entry_id` in merge order.
pub fn merge_entries<'a>(first: &'a [Entry], second: &'a [Entry]) -> Vec<&'a Entry> {
    let mut seen = HashSet::new();
    first
        .iter()
        .chain(second.iter())
        .filter(|e| seen.insert(e.entry_id.as_str()))
        .collect()
}

/// Cards for the first `limit` distinct entries of `entries`.
pub fn select_evidence<'a, I>(entries: I, limit: usize, reason: &str) -> Vec<EvidenceCard>
where
    I: IntoIterator<Item = &'a Entry>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|e| seen.insert(e.entry_id.as_str()))
        .take(limit)
        .map(|e| EvidenceCard {
            entry_id: Some(e.entry_id.clone()),
            snippet: snippet(&e.text, CARD_SNIPPET_LIMIT),
            reason: reason.to_string(),
        })
        .collect()
}

/// Theme-linked cards: first 3 themes, first 2 members each, one card per
/// entry. Members whose entry is not among `entries` are skipped so no card
/// points outside the request. Card snippets come from the entry text at the
/// card limit; a member only contributes its id and reason.
pub fn select_theme_evidence(themes: &[Theme], entries: &[Entry]) -> Vec<EvidenceCard> {
    let by_id: HashMap<&str, &Entry> = entries.iter().map(|e| (e.entry_id.as_str(), e)).collect();
    let mut seen = HashSet::new();
    let mut cards = Vec::new();

    for theme in themes.iter().take(3) {
        for member in theme.members.iter().take(2) {
            let id = member.entry_id.as_str();
            if id.is_empty() || seen.contains(id) {
                continue;
            }
            let Some(entry) = by_id.get(id) else {
                continue;
            };
            // always excerpted from the entry itself, never the member's copy
            let snippet = snippet(&entry.text, CARD_SNIPPET_LIMIT);
            if snippet.is_empty() {
                continue;
            }
            let reason = if member.reason.trim().is_empty() {
                let label = if theme.label.is_empty() {
                    "a theme"
                } else {
                    theme.label.as_str()
                };
                format!("Connected to {label}.")
            } else {
                member.reason.clone()
            };
            cards.push(EvidenceCard {
                entry_id: Some(id.to_string()),
                snippet,
                reason,
            });
            seen.insert(id);
        }
    }

    cards
}
