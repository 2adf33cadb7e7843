// src/signals/emotion.rs
use super::sentiment::is_negator;
use super::EmotionClassifier;
use crate::config::{EmotionKind, SignalsConfig};
use crate::text::tokenize;

/// Cue words per emotion. Order matters: ties go to the earlier row.
const CUES: &[(&str, &[&str])] = &[
    (
        "joy",
        &[
            "happy", "happier", "joy", "joyful", "glad", "grateful", "gratitude", "excited",
            "delighted", "proud", "laughed", "laugh", "love", "loved", "fun", "calm", "peaceful",
            "relieved", "content",
        ],
    ),
    (
        "sadness",
        &[
            "sad", "down", "lonely", "alone", "cried", "cry", "crying", "tears", "grief",
            "grieving", "miss", "missed", "empty", "hopeless", "heartbroken", "disappointed",
            "loss",
        ],
    ),
    (
        "anger",
        &[
            "angry", "anger", "furious", "mad", "annoyed", "irritated", "frustrated",
            "frustrating", "resentful", "rage", "fight", "argument", "unfair",
        ],
    ),
    (
        "fear",
        &[
            "afraid", "scared", "anxious", "anxiety", "worried", "worry", "nervous", "panic",
            "dread", "fear", "terrified", "overwhelmed", "stressed", "uneasy",
        ],
    ),
    (
        "surprise",
        &["surprised", "surprising", "unexpected", "shocked", "suddenly", "amazed", "wow"],
    ),
];

#[derive(Debug, Clone, Copy)]
pub enum EmotionBackend {
    Keyword(KeywordEmotion),
    /// Always `"neutral"`.
    Neutral,
}

impl EmotionBackend {
    pub fn from_config(cfg: &SignalsConfig) -> Self {
        match cfg.emotion {
            EmotionKind::Keyword => Self::Keyword(KeywordEmotion),
            EmotionKind::Neutral => Self::Neutral,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Keyword(_) => "keyword",
            Self::Neutral => "neutral",
        }
    }
}

impl EmotionClassifier for EmotionBackend {
    fn classify_emotion(&self, text: &str) -> String {
        match self {
            Self::Keyword(k) => k.classify(text).to_string(),
            Self::Neutral => "neutral".to_string(),
        }
    }
}

/// Counts cue-word hits per emotion and returns the emotion with the most.
/// A cue with a negator in the previous three tokens does not count.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordEmotion;

impl KeywordEmotion {
    pub fn classify(&self, text: &str) -> &'static str {
        let tokens = tokenize(text);
        let mut best = ("neutral", 0usize);
        for &(label, cues) in CUES {
            let hits = tokens
                .iter()
                .enumerate()
                .filter(|(i, t)| cues.contains(&t.as_str()) && !negated(&tokens, *i))
                .count();
            if hits > best.1 {
                best = (label, hits);
            }
        }
        best.0
    }
}

fn negated(tokens: &[String], i: usize) -> bool {
    (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()))
}
