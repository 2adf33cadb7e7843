// src/weekly.rs
//! Weekly reflection: three summary blocks, evidence cards and next-week
//! prompts for one week of entries.

use std::cmp::Ordering;
use tracing::debug;

use crate::evidence::{snippet, select_theme_evidence, CARD_SNIPPET_LIMIT};
use crate::models::{
    Entry, EvidenceCard, SafetyResult, Theme, WeeklyReflection, WeeklySummaryBlock,
};
use crate::prompts::{theme_labels, weekly_prompts};

const TOP_THEMES: usize = 3;
const FALLBACK_EVIDENCE: usize = 3;
const FALLBACK_REASON: &str = "Notable emotional signal this week.";

pub fn compose_weekly(entries: &[Entry], themes: &[Theme], safety: &SafetyResult) -> WeeklyReflection {
    if safety.crisis {
        return WeeklyReflection {
            summary_blocks: vec![WeeklySummaryBlock {
                title: "You're not alone".to_string(),
                text: "If you're feeling overwhelmed, consider reaching out to someone you trust."
                    .to_string(),
                evidence: Vec::new(),
            }],
            evidence_cards: Vec::new(),
            prompts_next_week: Vec::new(),
            safety: safety.clone(),
        };
    }
    if entries.is_empty() {
        return WeeklyReflection {
            summary_blocks: Vec::new(),
            evidence_cards: Vec::new(),
            prompts_next_week: Vec::new(),
            safety: safety.clone(),
        };
    }

    let avg = average_sentiment(entries);
    let mut labels = theme_labels(themes);
    labels.truncate(TOP_THEMES);

    let mut evidence_cards = select_theme_evidence(themes, entries);
    if evidence_cards.is_empty() {
        evidence_cards = strongest_signal_cards(entries);
    }
    let ids = |range: std::ops::Range<usize>| -> Vec<String> {
        evidence_cards
            .iter()
            .skip(range.start)
            .take(range.end - range.start)
            .filter_map(|c| c.entry_id.clone())
            .collect()
    };

    let revisited = if labels.is_empty() {
        "a few steady ideas".to_string()
    } else {
        labels.join(", ")
    };
    let top_theme = labels
        .first()
        .map(|l| l.to_lowercase())
        .unwrap_or_else(|| "steady rhythms".to_string());

    let summary_blocks = vec![
        WeeklySummaryBlock {
            title: "Themes you returned to".to_string(),
            text: format!("You revisited {revisited}."),
            evidence: ids(0..2),
        },
        WeeklySummaryBlock {
            title: "What helped".to_string(),
            text: "You created space for small resets and steady habits.".to_string(),
            evidence: ids(1..3),
        },
        WeeklySummaryBlock {
            title: "Gentle experiment".to_string(),
            text: format!("Try a tiny ritual that supports {top_theme}."),
            evidence: Vec::new(),
        },
    ];

    let last_mood = entries.last().and_then(|e| e.mood.as_deref());
    let prompts_next_week = weekly_prompts(&labels, avg, last_mood);

    debug!(
        target: "weekly",
        entries = entries.len(),
        themes = labels.len(),
        evidence = evidence_cards.len(),
        avg_sentiment = avg,
        "weekly reflection composed"
    );

    WeeklyReflection {
        summary_blocks,
        evidence_cards,
        prompts_next_week,
        safety: safety.clone(),
    }
}

/// Mean of the scores that are present; 0.0 when none are.
pub fn average_sentiment(entries: &[Entry]) -> f32 {
    let scores: Vec<f32> = entries.iter().filter_map(Entry::sentiment_score).collect();
    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f32>() / scores.len() as f32
    }
}

/// Up to three entries with the largest |sentiment|, input order on ties.
fn strongest_signal_cards(entries: &[Entry]) -> Vec<EvidenceCard> {
    let strength = |e: &Entry| e.sentiment_score().unwrap_or(0.0).abs();
    let mut ranked: Vec<&Entry> = entries.iter().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| strength(b).partial_cmp(&strength(a)).unwrap_or(Ordering::Equal));
    ranked
        .into_iter()
        .take(FALLBACK_EVIDENCE)
        .map(|e| EvidenceCard {
            entry_id: Some(e.entry_id.clone()),
            snippet: snippet(&e.text, CARD_SNIPPET_LIMIT),
            reason: FALLBACK_REASON.to_string(),
        })
        .collect()
}
