//! models.rs: request-scoped value types shared by the composers.
//!
//! Entries arrive from the journaling app and are only ever read here.
//! Themes, prompts, plans and evidence cards are built per request and handed
//! back to the caller, who owns persistence.

use serde::{Deserialize, Deserializer, Serialize};

/// Coarse polarity bucket returned next to the numeric sentiment score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Signed score in `[-1.0, 1.0]`. Caller-supplied values are clamped.
    #[serde(deserialize_with = "clamped_score")]
    pub score: f32,
}

/// Out-of-range scores are clamped; non-finite ones read as 0.0.
fn clamped_score<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = f32::deserialize(deserializer)?;
    Ok(if raw.is_finite() {
        raw.clamp(-1.0, 1.0)
    } else {
        0.0
    })
}

impl Sentiment {
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
        }
    }
}

/// A journal entry as supplied by the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub entry_id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<Sentiment>,
    /// Retrieval similarity, when the caller has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

impl Entry {
    pub fn new(entry_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            entry_id: entry_id.into(),
            text: text.into(),
            created_at: None,
            mood: None,
            embedding: None,
            sentiment: None,
            score: None,
        }
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    pub fn with_sentiment(mut self, label: SentimentLabel, score: f32) -> Self {
        self.sentiment = Some(Sentiment {
            label,
            score: score.clamp(-1.0, 1.0),
        });
        self
    }

    pub fn with_mood(mut self, mood: impl Into<String>) -> Self {
        self.mood = Some(mood.into());
        self
    }

    pub fn sentiment_score(&self) -> Option<f32> {
        self.sentiment.as_ref().map(|s| s.score)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyResult {
    pub crisis: bool,
    pub reason: Option<String>,
}

impl SafetyResult {
    pub fn safe() -> Self {
        Self {
            crisis: false,
            reason: None,
        }
    }

    pub fn crisis(reason: impl Into<String>) -> Self {
        Self {
            crisis: true,
            reason: Some(reason.into()),
        }
    }
}

impl Default for SafetyResult {
    fn default() -> Self {
        Self::safe()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeMember {
    pub entry_id: String,
    pub score: f32,
    pub snippet: String,
    pub reason: String,
}

/// A cluster of related entries. `id` is only unique within one computation.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    #[serde(rename = "temp_theme_id")]
    pub id: String,
    pub label: String,
    pub keywords: Vec<String>,
    /// Share of the input entries that landed in this theme, in `[0.0, 1.0]`.
    pub strength: f32,
    pub members: Vec<ThemeMember>,
}

/// Excerpt + justification linking generated text back to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceCard {
    #[serde(default)]
    pub entry_id: Option<String>,
    pub snippet: String,
    pub reason: String,
}

/// Prompts carry the same card shape as plans.
pub type PromptEvidence = EvidenceCard;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromptItem {
    pub id: String,
    pub text: String,
    pub reason: String,
    #[serde(default)]
    pub evidence: Vec<PromptEvidence>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Phrasing depth picked from the caller's time budget (minutes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    Brief,
    Deep,
}

impl Tone {
    pub fn from_budget(time_budget: u32) -> Self {
        if time_budget <= 5 {
            Tone::Brief
        } else {
            Tone::Deep
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanSection {
    pub text: String,
}

impl PlanSection {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternConnection {
    pub text: String,
    #[serde(default)]
    pub references: Vec<String>,
}

/// Policy flags asserted on every plan. Never computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanConstraints {
    pub no_medical_claims: bool,
    pub no_diagnosis: bool,
    pub journaling_only: bool,
    pub no_advice: bool,
}

impl PlanConstraints {
    pub const FIXED: Self = Self {
        no_medical_claims: true,
        no_diagnosis: true,
        journaling_only: true,
        no_advice: true,
    };
}

impl Default for PlanConstraints {
    fn default() -> Self {
        Self::FIXED
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionPlan {
    pub validation: PlanSection,
    pub reflection: PlanSection,
    pub pattern_connection: PatternConnection,
    pub gentle_nudge: PlanSection,
    pub follow_up_question: PlanSection,
    #[serde(default)]
    pub evidence_cards: Vec<EvidenceCard>,
    pub safety: SafetyResult,
    #[serde(default)]
    pub constraints: PlanConstraints,
}

/// Flat five-part message the UI renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderedMessage {
    pub validation: String,
    pub reflection: String,
    pub pattern_connection: String,
    pub gentle_nudge: String,
    pub follow_up_question: String,
}

impl RenderedMessage {
    pub fn sections(&self) -> [&str; 5] {
        [
            &self.validation,
            &self.reflection,
            &self.pattern_connection,
            &self.gentle_nudge,
            &self.follow_up_question,
        ]
    }

    /// Everything but the follow-up question, as one paragraph.
    pub fn body(&self) -> String {
        self.sections()[..4]
            .iter()
            .filter(|s| !s.trim().is_empty())
            .copied()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklySummaryBlock {
    pub title: String,
    pub text: String,
    pub evidence: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeeklyReflection {
    pub summary_blocks: Vec<WeeklySummaryBlock>,
    pub evidence_cards: Vec<EvidenceCard>,
    pub prompts_next_week: Vec<String>,
    pub safety: SafetyResult,
}

/// Numeric mood scale used by the dashboard charts.
pub fn mood_to_numeric(mood: Option<&str>) -> Option<u8> {
    match mood? {
        "Sad" => Some(1),
        "Stressed" => Some(2),
        "Neutral" => Some(3),
        "Calm" => Some(4),
        "Happy" => Some(5),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn constraints_default_to_all_true() {
        let c = PlanConstraints::default();
        assert!(c.no_medical_claims && c.no_diagnosis && c.journaling_only && c.no_advice);
    }

    #[test]
    fn tone_boundary_is_five_minutes() {
        assert_eq!(Tone::from_budget(5), Tone::Brief);
        assert_eq!(Tone::from_budget(6), Tone::Deep);
    }

    #[test]
    fn theme_serializes_with_temp_id() {
        let t = Theme {
            id: "abc".into(),
            label: "Calm".into(),
            ..Default::default()
        };
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["temp_theme_id"], json!("abc"));
    }

    #[test]
    fn incoming_sentiment_scores_are_clamped() {
        let e: Entry = serde_json::from_value(json!({
            "entry_id": "1",
            "text": "x",
            "sentiment": {"label": "positive", "score": 7.5}
        }))
        .unwrap();
        assert_eq!(e.sentiment_score(), Some(1.0));

        let s: Sentiment = serde_json::from_value(json!({"label": "negative", "score": -3})).unwrap();
        assert_eq!(s.score, -1.0);
        let s: Sentiment = serde_json::from_value(json!({"label": "neutral", "score": 0.25})).unwrap();
        assert!((s.score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn unknown_roles_deserialize_as_other() {
        let m: ChatMessage = serde_json::from_value(json!({"role": "tool", "content": "x"})).unwrap();
        assert_eq!(m.role, Role::Other);
    }

    #[test]
    fn mood_scale() {
        assert_eq!(mood_to_numeric(Some("Calm")), Some(4));
        assert_eq!(mood_to_numeric(Some("Elated")), None);
        assert_eq!(mood_to_numeric(None), None);
    }
}
