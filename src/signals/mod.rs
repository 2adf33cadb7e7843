// src/signals/mod.rs
//! Signal extractors: embedding, sentiment, emotion and keyphrases.
//!
//! Each signal is a capability trait with a tagged backend enum behind it.
//! The backend is picked once, when [`Signals`] is built from config, and a
//! backend that cannot initialise is replaced by that signal's fallback
//! variant. Composers only ever see the traits; none of them ask whether a
//! model is loaded.
//!
//! Calls never fail. A primary backend that errors on a particular input
//! answers with its fallback for that call and bumps
//! `nlp_signal_fallback_total{signal=...}`.

pub mod embedding;
pub mod emotion;
pub mod keyphrase;
pub mod sentiment;

use metrics::counter;
use tracing::info;

use crate::config::SignalsConfig;
use crate::models::Sentiment;

pub use embedding::{fallback_embedding, EmbeddingBackend, FeatureHashEmbedder};
pub use emotion::{EmotionBackend, KeywordEmotion};
pub use keyphrase::{KeyphraseBackend, StatisticalKeyphrases};
pub use sentiment::{SentimentAnalyzer, SentimentBackend};

pub trait Embedder: Send + Sync {
    /// Fixed-dimension vector; same text, same vector.
    fn embed(&self, text: &str) -> Vec<f32>;
    fn dimension(&self) -> usize;
}

pub trait SentimentClassifier: Send + Sync {
    fn classify_sentiment(&self, text: &str) -> Sentiment;
}

pub trait EmotionClassifier: Send + Sync {
    /// Lower-case emotion label; `"neutral"` when nothing stands out.
    fn classify_emotion(&self, text: &str) -> String;
}

pub trait KeyphraseExtractor: Send + Sync {
    /// Up to `top_n` phrases, best first. Empty text → empty list.
    fn extract_keyphrases(&self, text: &str, top_n: usize) -> Vec<String>;
}

#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    #[error("input has no usable tokens")]
    EmptyInput,
    #[error("failed to load lexicon from {path}: {message}")]
    Lexicon { path: String, message: String },
}

pub(crate) fn record_fallback(signal: &'static str) {
    counter!("nlp_signal_fallback_total", "signal" => signal).increment(1);
}

/// Process-wide, read-only bundle of signal backends. Built once at startup
/// and shared behind an `Arc`.
#[derive(Debug)]
pub struct Signals {
    pub embedding: EmbeddingBackend,
    pub sentiment: SentimentBackend,
    pub emotion: EmotionBackend,
    pub keyphrases: KeyphraseBackend,
}

impl Signals {
    pub fn from_config(cfg: &SignalsConfig) -> Self {
        let signals = Self {
            embedding: EmbeddingBackend::from_config(cfg),
            sentiment: SentimentBackend::from_config(cfg),
            emotion: EmotionBackend::from_config(cfg),
            keyphrases: KeyphraseBackend::from_config(cfg),
        };
        info!(
            target: "signals",
            embedding = signals.embedding.name(),
            sentiment = signals.sentiment.name(),
            emotion = signals.emotion.name(),
            keyphrases = signals.keyphrases.name(),
            dim = signals.embedding.dimension(),
            "signal backends ready"
        );
        signals
    }

    /// Every signal on its fallback variant.
    pub fn fallback(embedding_dim: usize) -> Self {
        Self {
            embedding: EmbeddingBackend::pseudo_random(embedding_dim),
            sentiment: SentimentBackend::Disabled,
            emotion: EmotionBackend::Neutral,
            keyphrases: KeyphraseBackend::Disabled,
        }
    }
}

impl Default for Signals {
    fn default() -> Self {
        Self::from_config(&SignalsConfig::default())
    }
}

impl Embedder for Signals {
    fn embed(&self, text: &str) -> Vec<f32> {
        self.embedding.embed(text)
    }
    fn dimension(&self) -> usize {
        self.embedding.dimension()
    }
}

impl SentimentClassifier for Signals {
    fn classify_sentiment(&self, text: &str) -> Sentiment {
        self.sentiment.classify_sentiment(text)
    }
}

impl EmotionClassifier for Signals {
    fn classify_emotion(&self, text: &str) -> String {
        self.emotion.classify_emotion(text)
    }
}

impl KeyphraseExtractor for Signals {
    fn extract_keyphrases(&self, text: &str, top_n: usize) -> Vec<String> {
        self.keyphrases.extract_keyphrases(text, top_n)
    }
}
