use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::warn;

use super::{SentimentClassifier, SignalError};
use crate::config::{SentimentKind, SignalsConfig};
use crate::models::{Sentiment, SentimentLabel};
use crate::text::tokenize;

static LEXICON: Lazy<Arc<HashMap<String, i32>>> = Lazy::new(|| {
    let raw = include_str!("../../sentiment_lexicon.json");
    Arc::new(serde_json::from_str::<HashMap<String, i32>>(raw).expect("valid sentiment lexicon"))
});

/// Label cut-offs on the normalised score.
const POSITIVE_MIN: f32 = 0.2;
const NEGATIVE_MAX: f32 = -0.2;
/// Squash constant: `x / sqrt(x² + ALPHA)` maps a raw sum into (-1, 1).
const ALPHA: f32 = 15.0;

#[derive(Debug, Clone)]
pub enum SentimentBackend {
    Lexicon(SentimentAnalyzer),
    /// Always neutral, score 0.0.
    Disabled,
}

impl SentimentBackend {
    /// A custom lexicon that fails to load degrades to the built-in one.
    pub fn from_config(cfg: &SignalsConfig) -> Self {
        match cfg.sentiment {
            SentimentKind::Disabled => Self::Disabled,
            SentimentKind::Lexicon => match &cfg.sentiment_lexicon_path {
                Some(path) => match SentimentAnalyzer::from_path(path) {
                    Ok(a) => Self::Lexicon(a),
                    Err(err) => {
                        warn!(target: "signals", %err, "custom lexicon unavailable, using built-in");
                        super::record_fallback("sentiment");
                        Self::Lexicon(SentimentAnalyzer::new())
                    }
                },
                None => Self::Lexicon(SentimentAnalyzer::new()),
            },
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Lexicon(_) => "lexicon",
            Self::Disabled => "disabled",
        }
    }
}

impl SentimentClassifier for SentimentBackend {
    fn classify_sentiment(&self, text: &str) -> Sentiment {
        match self {
            Self::Lexicon(a) => a.classify(text),
            Self::Disabled => Sentiment::neutral(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SentimentAnalyzer {
    lexicon: Arc<HashMap<String, i32>>,
}

impl SentimentAnalyzer {
    pub fn new() -> Self {
        Self {
            lexicon: LEXICON.clone(),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, SignalError> {
        let lexicon_err = |message: String| SignalError::Lexicon {
            path: path.display().to_string(),
            message,
        };
        let raw = fs::read_to_string(path).map_err(|e| lexicon_err(e.to_string()))?;
        let map: HashMap<String, i32> =
            serde_json::from_str(&raw).map_err(|e| lexicon_err(e.to_string()))?;
        let lexicon = map
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect::<HashMap<_, _>>();
        Ok(Self {
            lexicon: Arc::new(lexicon),
        })
    }

    /// Lexicon score for a word (0 if not in the lexicon).
    #[inline]
    fn word_score(&self, w: &str) -> i32 {
        *self.lexicon.get(w).unwrap_or(&0)
    }

    /// Returns (raw score, token count).
    /// Negation: a negator within the previous 1..=3 tokens flips the sign
    /// of the word's lexicon score.
    pub fn score_text(&self, text: &str) -> (i32, usize) {
        let tokens = tokenize(text);
        let mut score: i32 = 0;

        for (i, w) in tokens.iter().enumerate() {
            let base = self.word_score(w);
            if base == 0 {
                continue;
            }
            let negated = (1..=3).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            score += if negated { -base } else { base };
        }

        (score, tokens.len())
    }

    pub fn classify(&self, text: &str) -> Sentiment {
        let (raw, _) = self.score_text(text);
        let score = normalize_score(raw);
        let label = if score >= POSITIVE_MIN {
            SentimentLabel::Positive
        } else if score <= NEGATIVE_MAX {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };
        Sentiment { label, score }
    }
}

impl Default for SentimentAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn normalize_score(raw: i32) -> f32 {
    let x = raw as f32;
    (x / (x * x + ALPHA).sqrt()).clamp(-1.0, 1.0)
}

/// Single-token negators ("no longer" is already covered by "no").
pub(crate) fn is_negator(tok: &str) -> bool {
    matches!(
        tok,
        "not"
            | "no"
            | "never"
            | "isn't"
            | "wasn't"
            | "aren't"
            | "won't"
            | "can't"
            | "cannot"
            | "don't"
            | "didn't"
            | "doesn't"
            | "without"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_and_negative_text() {
        let a = SentimentAnalyzer::new();
        let pos = a.classify("I felt calm and grateful after a long walk.");
        assert_eq!(pos.label, SentimentLabel::Positive);
        assert!(pos.score > 0.2 && pos.score <= 1.0);

        let neg = a.classify("Stressed, exhausted and overwhelmed by everything.");
        assert_eq!(neg.label, SentimentLabel::Negative);
        assert!(neg.score < -0.2 && neg.score >= -1.0);
    }

    #[test]
    fn negation_flips_sign() {
        let a = SentimentAnalyzer::new();
        let (plain, _) = a.score_text("I am happy");
        let (negated, _) = a.score_text("I am not really happy");
        assert!(plain > 0);
        assert_eq!(negated, -plain);
    }

    #[test]
    fn no_lexicon_words_is_neutral() {
        let s = SentimentAnalyzer::new().classify("The bus arrived at nine.");
        assert_eq!(s.label, SentimentLabel::Neutral);
        assert_eq!(s.score, 0.0);
    }

    #[test]
    fn missing_custom_lexicon_degrades_to_builtin() {
        let cfg = SignalsConfig {
            sentiment_lexicon_path: Some("does/not/exist.json".into()),
            ..Default::default()
        };
        let backend = SentimentBackend::from_config(&cfg);
        assert_eq!(backend.name(), "lexicon");
        assert_eq!(
            backend.classify_sentiment("so happy").label,
            SentimentLabel::Positive
        );
    }
}
