// src/prompts.rs
//! Journaling prompt composer.
//!
//! Topics come from the caller's theme labels and from keyphrases of the
//! recent and similar entries. Each topic gets one template from a pool that
//! is shuffled with an RNG seeded from (user, mood, time budget), so a given
//! request always produces the same prompts while different users and moods
//! see different phrasings.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::collections::HashSet;
use tracing::debug;

use crate::evidence::{merge_entries, select_evidence};
use crate::models::{Entry, PromptItem, Theme, Tone};
use crate::signals::KeyphraseExtractor;
use crate::text::stable_seed;

pub const MAX_PROMPTS: usize = 4;
const MIN_TOPIC_PROMPTS: usize = 3;
const MAX_TOPICS: usize = 6;
const KEYPHRASES_PER_ENTRY: usize = 3;
const EVIDENCE_PER_PROMPT: usize = 2;

const TEMPLATES: [&str; 6] = [
    "When {topic} shows up, what do you wish you could tell yourself?",
    "What moment from today connects with {topic}?",
    "With {minutes} minutes, what feels most important to name about {topic}?",
    "How did {topic} influence how you felt {mood_hint}?",
    "What helped you move through {topic}, even in a small way?",
    "What do you want to remember about {topic} before the day ends?",
];

const BRIEF_REASON: &str = "Grounded in your recent reflections.";
const STARTER_REASON: &str = "Starter prompt to help you begin.";
const EVIDENCE_REASON: &str = "Related to a recent entry.";

/// Inputs for [`compose_prompts`].
#[derive(Debug, Clone, Copy)]
pub struct PromptRequest<'a> {
    pub user_id: &'a str,
    pub recent: &'a [Entry],
    pub similar: &'a [Entry],
    /// Theme labels, highest priority first.
    pub themes: &'a [String],
    pub mood: Option<&'a str>,
    /// Minutes the user has.
    pub time_budget: u32,
}

/// At most four prompts. With no entries at all, or no topics, the result is
/// exactly the starter set.
pub fn compose_prompts<K>(req: &PromptRequest<'_>, keyphrases: &K) -> Vec<PromptItem>
where
    K: KeyphraseExtractor + ?Sized,
{
    let merged = merge_entries(req.recent, req.similar);
    if merged.is_empty() {
        return starter_prompts(req.mood, req.time_budget);
    }

    let topics = collect_topics(req.themes, &merged, keyphrases);
    if topics.is_empty() {
        return starter_prompts(req.mood, req.time_budget);
    }

    let tone = Tone::from_budget(req.time_budget);
    let mood_hint = match req.mood {
        Some(m) => format!("feeling {}", m.to_lowercase()),
        None => "right now".to_string(),
    };

    let mut templates = TEMPLATES;
    let seed_key = format!("{}{}{}", req.user_id, req.mood.unwrap_or(""), req.time_budget);
    let mut rng = StdRng::seed_from_u64(stable_seed(&seed_key));
    templates.shuffle(&mut rng);

    let evidence = select_evidence(merged.iter().copied(), EVIDENCE_PER_PROMPT, EVIDENCE_REASON);
    let minutes = req.time_budget.to_string();
    let mut prompts: Vec<PromptItem> = topics
        .iter()
        .take(MAX_PROMPTS)
        .enumerate()
        .map(|(i, topic)| PromptItem {
            id: format!("prompt_{}", i + 1),
            text: fill_template(
                templates[i % templates.len()],
                &[
                    ("{topic}", topic.as_str()),
                    ("{minutes}", minutes.as_str()),
                    ("{mood_hint}", mood_hint.as_str()),
                ],
            ),
            reason: match tone {
                Tone::Brief => BRIEF_REASON.to_string(),
                Tone::Deep => format!("Based on recent patterns around {topic}."),
            },
            evidence: evidence.clone(),
        })
        .collect();

    if prompts.len() < MIN_TOPIC_PROMPTS {
        prompts.extend(starter_prompts(req.mood, req.time_budget));
    }
    prompts.truncate(MAX_PROMPTS);

    debug!(
        target: "prompts",
        topics = topics.len(),
        prompts = prompts.len(),
        entries = merged.len(),
        "prompts composed"
    );
    prompts
}

/// Single left-to-right pass over `template`; substituted values are never
/// scanned again, so a topic containing `{mood_hint}` stays literal.
fn fill_template(template: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len() + 32);
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(key, _)| tail.starts_with(key)) {
            Some((key, value)) => {
                out.push_str(value);
                rest = &tail[key.len()..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Caller themes first, then each merged entry's top keyphrases; first
/// occurrence wins, at most six.
fn collect_topics<K>(themes: &[String], merged: &[&Entry], keyphrases: &K) -> Vec<String>
where
    K: KeyphraseExtractor + ?Sized,
{
    let mut seen = HashSet::new();
    themes
        .iter()
        .cloned()
        .chain(
            merged
                .iter()
                .flat_map(|e| keyphrases.extract_keyphrases(&e.text, KEYPHRASES_PER_ENTRY)),
        )
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.clone()))
        .take(MAX_TOPICS)
        .collect()
}

/// Topic-free prompts parameterised by mood and time budget only.
pub fn starter_prompts(mood: Option<&str>, time_budget: u32) -> Vec<PromptItem> {
    let moment = match mood {
        Some(m) => format!("What moment while feeling {} stands out?", m.to_lowercase()),
        None => "What moment from today stands out?".to_string(),
    };
    [
        format!("With {time_budget} minutes, what feels most important to name right now?"),
        moment,
        "What do you want to release before the day ends?".to_string(),
        "What small win do you want to remember?".to_string(),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, text)| PromptItem {
        id: format!("starter_{}", i + 1),
        text,
        reason: STARTER_REASON.to_string(),
        evidence: Vec::new(),
    })
    .collect()
}

/// Theme labels of a theme list, in order.
pub fn theme_labels(themes: &[Theme]) -> Vec<String> {
    themes
        .iter()
        .map(|t| t.label.trim())
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect()
}

/// Next-week prompts from the week's themes, average sentiment and last mood.
pub fn weekly_prompts(themes: &[String], sentiment_avg: f32, last_mood: Option<&str>) -> Vec<String> {
    let mut prompts: Vec<String> = Vec::with_capacity(MAX_PROMPTS);

    let opener = if sentiment_avg <= -0.2 {
        "What felt heaviest this week, and what helped you move through it?"
    } else if sentiment_avg >= 0.2 {
        "What moments brought you the most ease, and why do they matter?"
    } else {
        "What felt most steady this week, even in small ways?"
    };
    prompts.push(opener.to_string());

    if let Some(theme) = themes.first() {
        prompts.push(format!(
            "When {} showed up, what did you need most?",
            theme.to_lowercase()
        ));
    }
    if let Some(mood) = last_mood.filter(|m| !m.trim().is_empty()) {
        prompts.push(format!(
            "Looking back on feeling {}, what would you tell yourself now?",
            mood.to_lowercase()
        ));
    }

    for item in [
        "What is one small intention you want to carry into tomorrow?",
        "Where did you show yourself care this week?",
        "What would a gentler next step look like?",
    ] {
        if prompts.len() >= MAX_PROMPTS {
            break;
        }
        if !prompts.iter().any(|p| p == item) {
            prompts.push(item.to_string());
        }
    }
    prompts.truncate(MAX_PROMPTS);
    prompts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::{KeyphraseBackend, StatisticalKeyphrases};

    fn kp() -> KeyphraseBackend {
        KeyphraseBackend::Statistical(StatisticalKeyphrases)
    }

    fn req<'a>(recent: &'a [Entry], themes: &'a [String], time_budget: u32) -> PromptRequest<'a> {
        PromptRequest {
            user_id: "user-1",
            recent,
            similar: &[],
            themes,
            mood: Some("Calm"),
            time_budget,
        }
    }

    #[test]
    fn placeholders_in_topics_stay_literal() {
        let filled = fill_template(
            "What helped you move through {topic}, {mood_hint}?",
            &[("{topic}", "{mood_hint}"), ("{mood_hint}", "feeling calm")],
        );
        assert_eq!(filled, "What helped you move through {mood_hint}, feeling calm?");
        assert_eq!(fill_template("no {slots} here", &[("{topic}", "x")]), "no {slots} here");

        let recent = vec![Entry::new("1", "A quiet evening.")];
        let themes = vec!["{mood_hint}".to_string(), "{minutes}".to_string(), "rest".to_string()];
        let out = compose_prompts(&req(&recent, &themes, 5), &kp());
        assert!(out[0].text.contains("{mood_hint}"), "got {:?}", out[0].text);
        assert!(out[1].text.contains("{minutes}"), "got {:?}", out[1].text);
    }

    #[test]
    fn no_entries_gives_starter_set() {
        let themes = vec!["sleep".to_string()];
        let out = compose_prompts(&req(&[], &themes, 10), &kp());
        assert_eq!(out, starter_prompts(Some("Calm"), 10));
        assert_eq!(out.len(), 4);
        assert!(out.iter().all(|p| p.id.starts_with("starter_")));
        assert_eq!(out[0].text, "With 10 minutes, what feels most important to name right now?");
    }

    #[test]
    fn topics_are_themes_then_keyphrases() {
        let entries = vec![Entry::new("1", "Long walk by the river.")];
        let themes = vec!["calm".to_string(), "calm".to_string()];
        let merged = merge_entries(&entries, &[]);
        let topics = collect_topics(&themes, &merged, &kp());
        assert_eq!(topics[0], "calm");
        assert_eq!(topics.iter().filter(|t| *t == "calm").count(), 1);
        assert!(topics.contains(&"long walk".to_string()));
        assert!(topics.len() <= 6);
    }

    #[test]
    fn tone_sets_reason() {
        let entries = vec![Entry::new("1", "Long walk by the river.")];
        let themes = vec!["calm".to_string()];
        let brief = compose_prompts(&req(&entries, &themes, 5), &kp());
        assert_eq!(brief[0].reason, "Grounded in your recent reflections.");
        let deep = compose_prompts(&req(&entries, &themes, 15), &kp());
        assert_eq!(deep[0].reason, "Based on recent patterns around calm.");
    }

    #[test]
    fn few_topics_are_padded_with_starters() {
        let entries = vec![Entry::new("1", "and the")];
        let themes = vec!["calm".to_string()];
        let out = compose_prompts(&req(&entries, &themes, 5), &kp());
        assert_eq!(out.len(), 4);
        assert_eq!(out[0].id, "prompt_1");
        assert_eq!(out[1].id, "starter_1");
        assert_eq!(out[0].evidence.len(), 1);
        assert!(out[1].evidence.is_empty());
    }

    #[test]
    fn weekly_prompts_follow_sentiment_theme_and_mood() {
        let out = weekly_prompts(&["Stress".to_string()], -0.4, Some("Sad"));
        assert_eq!(out.len(), 4);
        assert_eq!(out[0], "What felt heaviest this week, and what helped you move through it?");
        assert_eq!(out[1], "When stress showed up, what did you need most?");
        assert_eq!(out[2], "Looking back on feeling sad, what would you tell yourself now?");

        let plain = weekly_prompts(&[], 0.0, None);
        assert_eq!(plain[0], "What felt most steady this week, even in small ways?");
        assert_eq!(plain.len(), 4);

        let bright = weekly_prompts(&[], 0.5, None);
        assert!(bright[0].starts_with("What moments brought you the most ease"));
    }
}
