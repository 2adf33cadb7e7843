// src/config/mod.rs
//! Service configuration: a TOML file with every knob defaulted, plus a few
//! environment overrides that deployments set without touching the file.
//!
//! Resolution order:
//! 1) `$NLP_CONFIG_PATH`, else `config/nlp.toml` (missing file → defaults)
//! 2) env overrides (`ENABLE_ENHANCED_LANGUAGE`, `OPENAI_*`, `CORS_ORIGINS`, `EMBEDDING_DIM`,
//!    `MAX_ENTRIES`)

pub mod rewrite;

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub use rewrite::RewriteConfig;

pub const DEFAULT_NLP_CONFIG_PATH: &str = "config/nlp.toml";
pub const ENV_NLP_CONFIG_PATH: &str = "NLP_CONFIG_PATH";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct NlpConfig {
    pub clustering: ClusteringConfig,
    pub signals: SignalsConfig,
    pub rewrite: RewriteConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Entry count at which the density method takes over from k-means.
    pub density_threshold: usize,
    pub kmeans_max_k: usize,
    pub kmeans_seed: u64,
    pub kmeans_n_init: usize,
    pub kmeans_max_iter: usize,
    pub hdbscan_min_cluster_size: usize,
    pub hdbscan_min_samples: usize,
    /// Switching a method off makes the clusterer treat it as unavailable.
    pub enable_kmeans: bool,
    pub enable_hdbscan: bool,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            density_threshold: 20,
            kmeans_max_k: 5,
            kmeans_seed: 42,
            kmeans_n_init: 10,
            kmeans_max_iter: 300,
            hdbscan_min_cluster_size: 3,
            hdbscan_min_samples: 2,
            enable_kmeans: true,
            enable_hdbscan: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmbeddingKind {
    FeatureHash,
    PseudoRandom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SentimentKind {
    Lexicon,
    Disabled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EmotionKind {
    Keyword,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum KeyphraseKind {
    Statistical,
    Disabled,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SignalsConfig {
    pub embedding: EmbeddingKind,
    pub embedding_dim: usize,
    pub sentiment: SentimentKind,
    /// Optional JSON lexicon (`{"word": score}`) replacing the built-in one.
    pub sentiment_lexicon_path: Option<PathBuf>,
    pub emotion: EmotionKind,
    pub keyphrases: KeyphraseKind,
}

impl Default for SignalsConfig {
    fn default() -> Self {
        Self {
            embedding: EmbeddingKind::FeatureHash,
            embedding_dim: 384,
            sentiment: SentimentKind::Lexicon,
            sentiment_lexicon_path: None,
            emotion: EmotionKind::Keyword,
            keyphrases: KeyphraseKind::Statistical,
        }
    }
}

pub const DEFAULT_MAX_ENTRIES: usize = 200;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Empty list → permissive CORS.
    pub cors_origins: Vec<String>,
    /// Upper bound on entries per request list. Clustering memory grows
    /// with the square of this.
    pub max_entries: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            cors_origins: Vec::new(),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl NlpConfig {
    /// Load from `$NLP_CONFIG_PATH` (or the default path), then apply env overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = std::env::var(ENV_NLP_CONFIG_PATH)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_NLP_CONFIG_PATH));
        let mut cfg = Self::load_from_file(&path)?;
        cfg.apply_env_overrides_with(|k| std::env::var(k).ok());
        Ok(cfg)
    }

    /// A missing file yields defaults; an unreadable or malformed one is an error.
    pub fn load_from_file(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            info!(target: "config", path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| {
            anyhow::anyhow!("Failed to read NLP config at {}: {}", path.display(), e)
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(toml_str: &str) -> anyhow::Result<Self> {
        let mut cfg: NlpConfig = toml::from_str(toml_str)?;
        cfg.sanitize();
        Ok(cfg)
    }

    /// Env overrides via an injectable lookup so tests don't have to touch
    /// the process environment.
    pub fn apply_env_overrides_with<F>(&mut self, get: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = get("ENABLE_ENHANCED_LANGUAGE") {
            self.rewrite.enabled = parse_flag(&v);
        }
        if let Some(v) = get("OPENAI_MODEL").filter(|v| !v.trim().is_empty()) {
            self.rewrite.model = v.trim().to_string();
        }
        if let Some(t) = get("OPENAI_TEMPERATURE").and_then(|v| v.trim().parse::<f32>().ok()) {
            self.rewrite.temperature = t;
        }
        if let Some(n) = get("OPENAI_MAX_TOKENS").and_then(|v| v.trim().parse::<u32>().ok()) {
            self.rewrite.max_tokens = n;
        }
        if let Some(v) = get("CORS_ORIGINS") {
            self.server.cors_origins = v
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(d) = get("EMBEDDING_DIM").and_then(|v| v.trim().parse::<usize>().ok()) {
            self.signals.embedding_dim = d;
        }
        if let Some(n) = get("MAX_ENTRIES").and_then(|v| v.trim().parse::<usize>().ok()) {
            self.server.max_entries = n;
        }
        self.rewrite.resolve_api_key(&get);
        self.sanitize();
    }

    fn sanitize(&mut self) {
        let c = &mut self.clustering;
        c.kmeans_max_k = c.kmeans_max_k.max(2);
        c.kmeans_n_init = c.kmeans_n_init.max(1);
        c.kmeans_max_iter = c.kmeans_max_iter.max(1);
        c.hdbscan_min_cluster_size = c.hdbscan_min_cluster_size.max(2);
        c.hdbscan_min_samples = c.hdbscan_min_samples.max(1);
        if self.server.max_entries == 0 {
            self.server.max_entries = DEFAULT_MAX_ENTRIES;
        }
        if self.signals.embedding_dim == 0 {
            self.signals.embedding_dim = SignalsConfig::default().embedding_dim;
        }
        self.rewrite.sanitize();
    }
}

fn parse_flag(v: &str) -> bool {
    matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes")
}
