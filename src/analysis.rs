// src/analysis.rs
//! Per-entry analysis: every signal for one journal entry in one call.

use serde::Serialize;
use tracing::debug;

use crate::models::{mood_to_numeric, SafetyResult, Sentiment};
use crate::safety::detect_crisis;
use crate::signals::{Embedder, KeyphraseExtractor, SentimentClassifier};
use crate::text::anon_hash;

pub const ENTRY_KEYPHRASES: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryAnalysis {
    pub entry_id: String,
    pub sentiment: Sentiment,
    pub keyphrases: Vec<String>,
    pub embedding: Vec<f32>,
    pub safety: SafetyResult,
    /// Numeric mood (1..=5) when the mood is one of the known labels.
    pub mood_score: Option<u8>,
}

pub fn analyze_entry<S>(entry_id: &str, text: &str, mood: Option<&str>, signals: &S) -> EntryAnalysis
where
    S: Embedder + SentimentClassifier + KeyphraseExtractor + ?Sized,
{
    let analysis = EntryAnalysis {
        entry_id: entry_id.to_string(),
        sentiment: signals.classify_sentiment(text),
        keyphrases: signals.extract_keyphrases(text, ENTRY_KEYPHRASES),
        embedding: signals.embed(text),
        safety: detect_crisis(text),
        mood_score: mood_to_numeric(mood),
    };
    debug!(
        target: "analysis",
        id = %anon_hash(text),
        len = text.len(),
        keyphrases = analysis.keyphrases.len(),
        crisis = analysis.safety.crisis,
        "entry analyzed"
    );
    analysis
}
