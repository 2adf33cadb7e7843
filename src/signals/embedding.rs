// src/signals/embedding.rs
//! Embedding backends.
//!
//! * `FeatureHash`: bag-of-words feature hashing (signed, SHA-256 bucketed,
//!   L2-normalised). Texts sharing content words land close together, which
//!   is all theme clustering needs.
//! * `PseudoRandom`: unit vector drawn from an RNG seeded with the text's
//!   SHA-256. Deterministic, carries no meaning, never fails.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::debug;

use super::{record_fallback, Embedder, SignalError};
use crate::config::{EmbeddingKind, SignalsConfig};
use crate::text::{anon_hash, is_stopword, stable_seed, tokenize};

#[derive(Debug, Clone)]
pub enum EmbeddingBackend {
    FeatureHash(FeatureHashEmbedder),
    PseudoRandom { dim: usize },
}

impl EmbeddingBackend {
    pub fn from_config(cfg: &SignalsConfig) -> Self {
        let dim = cfg.embedding_dim.max(1);
        match cfg.embedding {
            EmbeddingKind::FeatureHash => Self::FeatureHash(FeatureHashEmbedder::new(dim)),
            EmbeddingKind::PseudoRandom => Self::pseudo_random(dim),
        }
    }

    pub fn pseudo_random(dim: usize) -> Self {
        Self::PseudoRandom { dim: dim.max(1) }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::FeatureHash(_) => "feature-hash",
            Self::PseudoRandom { .. } => "pseudo-random",
        }
    }
}

impl Embedder for EmbeddingBackend {
    fn embed(&self, text: &str) -> Vec<f32> {
        match self {
            Self::FeatureHash(e) => match e.try_embed(text) {
                Ok(v) => v,
                Err(err) => {
                    debug!(target: "signals", id = %anon_hash(text), %err, "feature hash fell back");
                    record_fallback("embedding");
                    fallback_embedding(text, e.dim)
                }
            },
            Self::PseudoRandom { dim } => fallback_embedding(text, *dim),
        }
    }

    fn dimension(&self) -> usize {
        match self {
            Self::FeatureHash(e) => e.dim,
            Self::PseudoRandom { dim } => *dim,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FeatureHashEmbedder {
    dim: usize,
}

impl FeatureHashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    /// Hash each content token into a signed bucket; adjacent content-token
    /// pairs add a half-weight bigram feature.
    pub fn try_embed(&self, text: &str) -> Result<Vec<f32>, SignalError> {
        let tokens: Vec<String> = tokenize(text)
            .into_iter()
            .filter(|t| !is_stopword(t))
            .collect();
        if tokens.is_empty() {
            return Err(SignalError::EmptyInput);
        }

        let mut v = vec![0.0f32; self.dim];
        for t in &tokens {
            self.add_feature(&mut v, t, 1.0);
        }
        for pair in tokens.windows(2) {
            self.add_feature(&mut v, &format!("{} {}", pair[0], pair[1]), 0.5);
        }

        normalize(&mut v);
        Ok(v)
    }

    fn add_feature(&self, v: &mut [f32], feature: &str, weight: f32) {
        let digest = Sha256::digest(feature.as_bytes());
        let mut idx_bytes = [0u8; 8];
        idx_bytes.copy_from_slice(&digest[..8]);
        let idx = (u64::from_be_bytes(idx_bytes) % self.dim as u64) as usize;
        let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
        v[idx] += sign * weight;
    }
}

/// Deterministic stand-in vector: standard-normal components from an RNG
/// seeded with the text's SHA-256, scaled to unit length.
pub fn fallback_embedding(text: &str, dim: usize) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(stable_seed(text));
    let mut v: Vec<f32> = (0..dim.max(1))
        .map(|_| {
            // Box–Muller; 1 - u keeps the log argument in (0, 1]
            let u1: f64 = 1.0 - rng.random::<f64>();
            let u2: f64 = rng.random::<f64>();
            ((-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()) as f32
        })
        .collect();
    normalize(&mut v);
    v
}

fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 && norm.is_finite() {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}
