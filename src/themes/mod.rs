// src/themes/mod.rs
//! Theme clustering over entry embeddings.
//!
//! Method choice is by entry count: below the density threshold the centroid
//! method (k-means) runs, at or above it the density method (HDBSCAN). If the
//! chosen method errors or is switched off, the other one runs instead. Only
//! when both fail does the caller get an error; too few entries is not an
//! error, it just yields no themes.

pub mod hdbscan;
pub mod kmeans;

use metrics::counter;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::ClusteringConfig;
use crate::evidence::{snippet, THEME_SNIPPET_LIMIT};
use crate::models::{Entry, Theme, ThemeMember};
use crate::signals::KeyphraseExtractor;
use crate::text::title_case;

pub use hdbscan::Hdbscan;
pub use kmeans::KMeans;

/// Entry count at which the density method takes over.
pub const DENSITY_THRESHOLD: usize = 20;

const KEYPHRASES_PER_MEMBER: usize = 5;
const MAX_KEYWORDS: usize = 5;
const MAX_MEMBERS: usize = 3;
const DEFAULT_MEMBER_SCORE: f32 = 0.5;
const MEMBER_REASON: &str = "Frequently linked to this theme.";
const UNLABELED: &str = "Unlabeled theme";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClusterMethod {
    KMeans,
    Hdbscan,
}

impl ClusterMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KMeans => "kmeans",
            Self::Hdbscan => "hdbscan",
        }
    }

    fn other(self) -> Self {
        match self {
            Self::KMeans => Self::Hdbscan,
            Self::Hdbscan => Self::KMeans,
        }
    }
}

impl std::fmt::Display for ClusterMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `n < 20` → k-means, otherwise HDBSCAN.
pub fn choose_cluster_method(n: usize) -> ClusterMethod {
    choose_with_threshold(n, DENSITY_THRESHOLD)
}

fn choose_with_threshold(n: usize, threshold: usize) -> ClusterMethod {
    if n < threshold {
        ClusterMethod::KMeans
    } else {
        ClusterMethod::Hdbscan
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    #[error("{0} clustering is disabled")]
    Unavailable(ClusterMethod),
    #[error("point {index} has dimension {found}, expected {expected}")]
    DimensionMismatch {
        index: usize,
        expected: usize,
        found: usize,
    },
    #[error("point {index} has an empty or non-finite embedding")]
    NonFinite { index: usize },
    #[error("{count} points is too few (need {required})")]
    TooFewPoints { count: usize, required: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum ThemeError {
    #[error("entry {entry_id} has no embedding")]
    MissingEmbedding { entry_id: String },
    #[error("invalid embeddings: {0}")]
    InvalidEmbeddings(ClusterError),
    #[error("no clustering backend available ({primary}: {primary_error}; {fallback}: {fallback_error})")]
    NoBackendAvailable {
        primary: ClusterMethod,
        primary_error: ClusterError,
        fallback: ClusterMethod,
        fallback_error: ClusterError,
    },
}

/// One clustering method. Labels are per input point; `None` is noise.
pub trait ClusterBackend: Send + Sync {
    fn method(&self) -> ClusterMethod;
    fn fit_predict(&self, points: &[Vec<f32>]) -> Result<Vec<Option<usize>>, ClusterError>;
}

/// Non-empty, equal-length, finite vectors.
pub(crate) fn validate_points(points: &[Vec<f32>]) -> Result<(), ClusterError> {
    let Some(first) = points.first() else {
        return Ok(());
    };
    let expected = first.len();
    for (index, p) in points.iter().enumerate() {
        if p.len() != expected {
            return Err(ClusterError::DimensionMismatch {
                index,
                expected,
                found: p.len(),
            });
        }
        if p.is_empty() || p.iter().any(|x| !x.is_finite()) {
            return Err(ClusterError::NonFinite { index });
        }
    }
    Ok(())
}

/// Outcome of one recompute, with which method produced it.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeRun {
    pub method: Option<ClusterMethod>,
    pub fallback_used: bool,
    pub themes: Vec<Theme>,
}

impl ThemeRun {
    fn empty() -> Self {
        Self {
            method: None,
            fallback_used: false,
            themes: Vec::new(),
        }
    }
}

/// Read-only after construction; shared across requests.
#[derive(Debug, Clone)]
pub struct ThemeClusterer {
    density_threshold: usize,
    kmeans: Option<KMeans>,
    hdbscan: Option<Hdbscan>,
}

impl Default for ThemeClusterer {
    fn default() -> Self {
        Self::from_config(&ClusteringConfig::default())
    }
}

impl ThemeClusterer {
    pub fn from_config(cfg: &ClusteringConfig) -> Self {
        Self {
            density_threshold: cfg.density_threshold,
            kmeans: cfg.enable_kmeans.then(|| KMeans {
                max_k: cfg.kmeans_max_k,
                seed: cfg.kmeans_seed,
                n_init: cfg.kmeans_n_init,
                max_iter: cfg.kmeans_max_iter,
            }),
            hdbscan: cfg.enable_hdbscan.then(|| Hdbscan {
                min_cluster_size: cfg.hdbscan_min_cluster_size,
                min_samples: cfg.hdbscan_min_samples,
            }),
        }
    }

    pub fn choose(&self, n: usize) -> ClusterMethod {
        choose_with_threshold(n, self.density_threshold)
    }

    fn backend(&self, method: ClusterMethod) -> Option<&dyn ClusterBackend> {
        match method {
            ClusterMethod::KMeans => self.kmeans.as_ref().map(|k| k as &dyn ClusterBackend),
            ClusterMethod::Hdbscan => self.hdbscan.as_ref().map(|h| h as &dyn ClusterBackend),
        }
    }

    fn run(&self, method: ClusterMethod, points: &[Vec<f32>]) -> Result<Vec<Option<usize>>, ClusterError> {
        match self.backend(method) {
            Some(b) => b.fit_predict(points),
            None => Err(ClusterError::Unavailable(method)),
        }
    }

    /// Cluster `entries` (all must carry embeddings) into themes.
    pub fn recompute<K>(&self, entries: &[Entry], keyphrases: &K) -> Result<ThemeRun, ThemeError>
    where
        K: KeyphraseExtractor + ?Sized,
    {
        if entries.len() < 2 {
            return Ok(ThemeRun::empty());
        }

        let points = entries
            .iter()
            .map(|e| {
                e.embedding.clone().ok_or_else(|| ThemeError::MissingEmbedding {
                    entry_id: e.entry_id.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        validate_points(&points).map_err(ThemeError::InvalidEmbeddings)?;

        let primary = self.choose(points.len());
        let (method, fallback_used, labels) = match self.run(primary, &points) {
            Ok(labels) => (primary, false, labels),
            Err(primary_error) => {
                let fallback = primary.other();
                warn!(target: "themes", %primary, %fallback, error = %primary_error, "clustering method failed, falling back");
                counter!("nlp_theme_fallback_total", "from" => primary.as_str()).increment(1);
                match self.run(fallback, &points) {
                    Ok(labels) => (fallback, true, labels),
                    Err(fallback_error) => {
                        return Err(ThemeError::NoBackendAvailable {
                            primary,
                            primary_error,
                            fallback,
                            fallback_error,
                        })
                    }
                }
            }
        };

        let themes = build_themes(entries, &labels, keyphrases);
        info!(
            target: "themes",
            entries = entries.len(),
            themes = themes.len(),
            method = %method,
            fallback_used,
            "themes recomputed"
        );
        Ok(ThemeRun {
            method: Some(method),
            fallback_used,
            themes,
        })
    }
}

/// Themes with the default clustering settings.
pub fn cluster_themes<K>(entries: &[Entry], keyphrases: &K) -> Result<Vec<Theme>, ThemeError>
where
    K: KeyphraseExtractor + ?Sized,
{
    ThemeClusterer::default()
        .recompute(entries, keyphrases)
        .map(|run| run.themes)
}

fn build_themes<K>(entries: &[Entry], labels: &[Option<usize>], keyphrases: &K) -> Vec<Theme>
where
    K: KeyphraseExtractor + ?Sized,
{
    let mut ids: Vec<usize> = labels.iter().flatten().copied().collect();
    ids.sort_unstable();
    ids.dedup();

    let total = entries.len() as f32;
    ids.into_iter()
        .filter_map(|label| {
            let members: Vec<&Entry> = entries
                .iter()
                .zip(labels)
                .filter(|(_, l)| **l == Some(label))
                .map(|(e, _)| e)
                .collect();
            if members.is_empty() {
                return None;
            }
            let keywords = cluster_keywords(&members, keyphrases);
            debug!(target: "themes", label, size = members.len(), keywords = keywords.len(), "theme built");
            Some(Theme {
                id: Uuid::new_v4().to_string(),
                label: label_from_keywords(&keywords),
                strength: round3(members.len() as f32 / total),
                members: members
                    .iter()
                    .take(MAX_MEMBERS)
                    .map(|e| ThemeMember {
                        entry_id: e.entry_id.clone(),
                        score: e.score.unwrap_or(DEFAULT_MEMBER_SCORE),
                        snippet: snippet(&e.text, THEME_SNIPPET_LIMIT),
                        reason: MEMBER_REASON.to_string(),
                    })
                    .collect(),
                keywords,
            })
        })
        .collect()
}

/// Count each member's top keyphrases; most frequent first, ties by first sighting.
fn cluster_keywords<K>(members: &[&Entry], keyphrases: &K) -> Vec<String>
where
    K: KeyphraseExtractor + ?Sized,
{
    let mut order: Vec<String> = Vec::new();
    let mut counts: HashMap<String, usize> = HashMap::new();
    for e in members {
        for phrase in keyphrases.extract_keyphrases(&e.text, KEYPHRASES_PER_MEMBER) {
            let c = counts.entry(phrase.clone()).or_insert(0);
            if *c == 0 {
                order.push(phrase);
            }
            *c += 1;
        }
    }
    // stable sort keeps first-seen order among equal counts
    order.sort_by(|a, b| counts[b].cmp(&counts[a]));
    order.truncate(MAX_KEYWORDS);
    order
}

pub fn label_from_keywords(keywords: &[String]) -> String {
    match keywords {
        [] => UNLABELED.to_string(),
        [only] => title_case(only),
        [first, second, ..] => format!("{} & {}", title_case(first), title_case(second)),
    }
}

fn round3(x: f32) -> f32 {
    (x * 1000.0).round() / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{KeyphraseBackend, StatisticalKeyphrases};

    fn kp() -> KeyphraseBackend {
        KeyphraseBackend::Statistical(StatisticalKeyphrases)
    }

    fn entry(id: &str, text: &str, v: Vec<f32>) -> Entry {
        Entry::new(id, text).with_embedding(v)
    }

    fn two_group_entries() -> Vec<Entry> {
        vec![
            entry("1", "Long walk by the river.", vec![0.0, 0.0]),
            entry("2", "Deadline stress at work.", vec![10.0, 10.0]),
            entry("3", "Another river walk at dusk.", vec![0.1, 0.1]),
            entry("4", "Work deadline again, late night.", vec![10.1, 9.9]),
        ]
    }

    #[test]
    fn method_threshold() {
        assert_eq!(choose_cluster_method(19), ClusterMethod::KMeans);
        assert_eq!(choose_cluster_method(20), ClusterMethod::Hdbscan);
    }

    #[test]
    fn fewer_than_two_entries_is_empty() {
        assert!(cluster_themes(&[], &kp()).unwrap().is_empty());
        let one = vec![entry("1", "alone", vec![1.0])];
        assert!(cluster_themes(&one, &kp()).unwrap().is_empty());
    }

    #[test]
    fn labels_and_strength() {
        let themes = cluster_themes(&two_group_entries(), &kp()).unwrap();
        assert_eq!(themes.len(), 2);
        let river = &themes[0];
        assert_eq!(
            river.members.iter().map(|m| m.entry_id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"]
        );
        assert!(river.keywords.len() <= 5);
        assert!(river.keywords.contains(&"river".to_string()));
        assert!((river.strength - 0.5).abs() < 1e-6);
        assert_eq!(river.members[0].reason, "Frequently linked to this theme.");
        assert!((river.members[0].score - 0.5).abs() < 1e-6);
        let sum: f32 = themes.iter().map(|t| t.strength).sum();
        assert!(sum <= 1.0 + 1e-6);
    }

    /// Comma-separated phrases, in text order.
    struct ListedPhrases;

    impl KeyphraseExtractor for ListedPhrases {
        fn extract_keyphrases(&self, text: &str, top_n: usize) -> Vec<String> {
            text.split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .take(top_n)
                .map(str::to_string)
                .collect()
        }
    }

    #[test]
    fn keyword_ties_keep_first_seen_order() {
        let a = Entry::new("1", "sleep, tea, river");
        let b = Entry::new("2", "walk, river, book");
        let c = Entry::new("3", "music, tea, garden");
        let members = vec![&a, &b, &c];
        // tea and river seen twice; the rest once, in sighting order
        assert_eq!(
            cluster_keywords(&members, &ListedPhrases),
            vec!["tea", "river", "sleep", "walk", "book"]
        );
    }

    #[test]
    fn label_shapes() {
        assert_eq!(label_from_keywords(&[]), "Unlabeled theme");
        assert_eq!(label_from_keywords(&["sleep".into()]), "Sleep");
        assert_eq!(
            label_from_keywords(&["long walk".into(), "river".into(), "dusk".into()]),
            "Long Walk & River"
        );
    }

    #[test]
    fn disabled_primary_falls_back() {
        let cfg = ClusteringConfig {
            enable_kmeans: false,
            hdbscan_min_cluster_size: 2,
            ..Default::default()
        };
        let run = ThemeClusterer::from_config(&cfg)
            .recompute(&two_group_entries(), &kp())
            .unwrap();
        assert_eq!(run.method, Some(ClusterMethod::Hdbscan));
        assert!(run.fallback_used);
    }

    #[test]
    fn both_methods_off_is_an_error() {
        let cfg = ClusteringConfig {
            enable_kmeans: false,
            enable_hdbscan: false,
            ..Default::default()
        };
        let err = ThemeClusterer::from_config(&cfg)
            .recompute(&two_group_entries(), &kp())
            .unwrap_err();
        assert!(matches!(err, ThemeError::NoBackendAvailable { .. }));
    }

    #[test]
    fn missing_embedding_is_reported() {
        let entries = vec![entry("1", "a", vec![0.0]), Entry::new("2", "b")];
        let err = cluster_themes(&entries, &kp()).unwrap_err();
        assert!(matches!(err, ThemeError::MissingEmbedding { entry_id } if entry_id == "2"));
    }
}
