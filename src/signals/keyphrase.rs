// src/signals/keyphrase.rs
use std::collections::HashMap;

use super::KeyphraseExtractor;
use crate::config::{KeyphraseKind, SignalsConfig};
use crate::text::{is_stopword, tokenize};

const BIGRAM_WEIGHT: f32 = 1.5;
const MIN_TOKEN_CHARS: usize = 3;

#[derive(Debug, Clone, Copy)]
pub enum KeyphraseBackend {
    Statistical(StatisticalKeyphrases),
    /// Always empty.
    Disabled,
}

impl KeyphraseBackend {
    pub fn from_config(cfg: &SignalsConfig) -> Self {
        match cfg.keyphrases {
            KeyphraseKind::Statistical => Self::Statistical(StatisticalKeyphrases),
            KeyphraseKind::Disabled => Self::Disabled,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Statistical(_) => "statistical",
            Self::Disabled => "disabled",
        }
    }
}

impl KeyphraseExtractor for KeyphraseBackend {
    fn extract_keyphrases(&self, text: &str, top_n: usize) -> Vec<String> {
        match self {
            Self::Statistical(s) => s.extract(text, top_n),
            Self::Disabled => Vec::new(),
        }
    }
}

/// Candidate phrases are runs of content words inside a clause: every word of
/// a run, and every adjacent pair. Score is frequency (pairs weighted up) plus
/// a small bonus for appearing early. A single word already covered by a
/// higher-ranked pair is dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatisticalKeyphrases;

#[derive(Debug)]
struct Candidate {
    freq: usize,
    first: usize,
    words: usize,
}

impl StatisticalKeyphrases {
    pub fn extract(&self, text: &str, top_n: usize) -> Vec<String> {
        if top_n == 0 {
            return Vec::new();
        }

        let mut candidates: HashMap<String, Candidate> = HashMap::new();
        let mut position = 0usize;
        let mut note = |phrase: String, words: usize, at: usize| {
            candidates
                .entry(phrase)
                .and_modify(|c| c.freq += 1)
                .or_insert(Candidate {
                    freq: 1,
                    first: at,
                    words,
                });
        };

        for clause in text.split(|c: char| ".,;:!?()\"\n".contains(c)) {
            let mut run: Vec<String> = Vec::new();
            for tok in tokenize(clause) {
                position += 1;
                if is_content_word(&tok) {
                    if let Some(prev) = run.last() {
                        note(format!("{prev} {tok}"), 2, position - 1);
                    }
                    note(tok.clone(), 1, position);
                    run.push(tok);
                } else {
                    run.clear();
                }
            }
        }

        let total = position.max(1) as f32;
        let mut ranked: Vec<(String, f32, usize)> = candidates
            .into_iter()
            .map(|(phrase, c)| {
                let weight = if c.words > 1 { BIGRAM_WEIGHT } else { 1.0 };
                let early = 0.5 * (1.0 - c.first as f32 / total);
                (phrase, c.freq as f32 * weight + early, c.first)
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.2.cmp(&b.2)));

        let mut out: Vec<String> = Vec::with_capacity(top_n);
        for (phrase, _, _) in ranked {
            let covered = !phrase.contains(' ')
                && out
                    .iter()
                    .any(|p| p.split(' ').any(|w| w == phrase.as_str()));
            if covered {
                continue;
            }
            out.push(phrase);
            if out.len() == top_n {
                break;
            }
        }
        out
    }
}

fn is_content_word(tok: &str) -> bool {
    tok.chars().count() >= MIN_TOKEN_CHARS
        && tok.chars().all(|c| c.is_alphabetic() || c == '\'')
        && !is_stopword(tok)
}
