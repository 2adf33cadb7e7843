// src/companion.rs
//! Reflection plan composer and chat turn.
//!
//! A plan is one of two states, picked only by the safety result:
//! - crisis: a fixed supportive message with no evidence; nothing from the
//!   conversation flows into it
//! - normal: five sections built from the emotion and keyphrases of the
//!   recent user messages, phrased brief or deep by time budget
//!
//! Plans always carry the fixed [`PlanConstraints`].

use metrics::counter;
use serde::Serialize;
use tracing::{debug, info};

use crate::evidence::select_evidence;
use crate::models::{
    ChatMessage, Entry, PatternConnection, PlanConstraints, PlanSection, ReflectionPlan,
    RenderedMessage, Role, SafetyResult, Sentiment, Tone,
};
use crate::rewrite::Rewriter;
use crate::safety::detect_crisis;
use crate::signals::{EmotionClassifier, KeyphraseExtractor, SentimentClassifier};
use crate::text::anon_hash;

const CONTEXT_HISTORY: usize = 2;
const CONTEXT_KEYPHRASES: usize = 3;
const PLAN_EVIDENCE: usize = 2;
const EVIDENCE_REASON: &str = "Related to a past entry.";
const DEFAULT_TOPIC: &str = "what feels most important";

/// Inputs for [`compose_plan`].
#[derive(Debug, Clone, Copy)]
pub struct PlanRequest<'a> {
    pub user_id: &'a str,
    pub selected_prompt: &'a str,
    pub latest_message: &'a str,
    /// Already ranked by the caller; the first two become evidence.
    pub retrieved_entries: &'a [Entry],
    pub time_budget: u32,
    pub mood: Option<&'a str>,
    pub safety: &'a SafetyResult,
    pub history: &'a [ChatMessage],
}

/// Signals read from the conversation context.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSignals {
    pub text: String,
    pub emotion: String,
    pub keyphrases: Vec<String>,
}

/// Last two non-empty user messages from `history`, then `latest`.
pub fn context_text(history: &[ChatMessage], latest: &str) -> String {
    let user_msgs: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::User && !m.content.trim().is_empty())
        .map(|m| m.content.as_str())
        .collect();
    let start = user_msgs.len().saturating_sub(CONTEXT_HISTORY);
    user_msgs[start..]
        .iter()
        .copied()
        .chain(std::iter::once(latest))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn read_context<S>(history: &[ChatMessage], latest: &str, signals: &S) -> ContextSignals
where
    S: EmotionClassifier + KeyphraseExtractor + ?Sized,
{
    let text = context_text(history, latest);
    ContextSignals {
        emotion: signals.classify_emotion(&text),
        keyphrases: signals.extract_keyphrases(&text, CONTEXT_KEYPHRASES),
        text,
    }
}

pub fn compose_plan<S>(req: &PlanRequest<'_>, signals: &S) -> ReflectionPlan
where
    S: EmotionClassifier + KeyphraseExtractor + ?Sized,
{
    if req.safety.crisis {
        return crisis_plan(req.safety);
    }
    let ctx = read_context(req.history, req.latest_message, signals);
    plan_from_context(req, &ctx)
}

/// Fixed plan for the crisis state. Content-independent.
pub fn crisis_plan(safety: &SafetyResult) -> ReflectionPlan {
    counter!("nlp_crisis_overrides_total").increment(1);
    ReflectionPlan {
        validation: PlanSection::new("I'm really sorry you're feeling this way. You deserve support."),
        reflection: PlanSection::new(
            "If you're in immediate danger, please contact your local emergency number.",
        ),
        pattern_connection: PatternConnection {
            text: "Reaching out to someone you trust can be a helpful next step.".to_string(),
            references: Vec::new(),
        },
        gentle_nudge: PlanSection::new("You don't have to carry this alone."),
        follow_up_question: PlanSection::new("Are you safe right now?"),
        evidence_cards: Vec::new(),
        safety: safety.clone(),
        constraints: PlanConstraints::FIXED,
    }
}

/// Normal-state plan from already extracted context signals.
pub fn plan_from_context(req: &PlanRequest<'_>, ctx: &ContextSignals) -> ReflectionPlan {
    if req.safety.crisis {
        return crisis_plan(req.safety);
    }

    let topic = pick_topic(&ctx.keyphrases, req.selected_prompt);
    let adjective = emotion_adjective(&ctx.emotion);
    let mood_hint = match req.mood {
        Some(m) => format!("while feeling {}", m.to_lowercase()),
        None => "right now".to_string(),
    };

    let evidence_cards = select_evidence(req.retrieved_entries, PLAN_EVIDENCE, EVIDENCE_REASON);
    let references: Vec<String> = evidence_cards
        .iter()
        .filter_map(|c| c.entry_id.clone())
        .collect();
    let has_evidence = !evidence_cards.is_empty();

    // Both tones open with the same validation line.
    let validation = format!("Thanks for sharing. That sounds {adjective}.");
    let present = format!("It seems {topic} is really present for you {mood_hint}.");
    let tone = Tone::from_budget(req.time_budget);
    let (reflection, pattern, nudge, question) = match tone {
        Tone::Brief => (
            present,
            if has_evidence {
                format!("You've mentioned {topic} before.")
            } else {
                "It can help to notice what keeps returning.".to_string()
            },
            format!("If it helps, name one small detail about {topic}."),
            "What feels most important to explore next?".to_string(),
        ),
        Tone::Deep => (
            format!("{present} Small details can reveal what you need most."),
            if has_evidence {
                format!("You've touched on {topic} before.")
            } else {
                "If a pattern is forming, it's okay to name it gently.".to_string()
            },
            format!("If it helps, notice what supported you around {topic}, even a little."),
            format!("What feels most important to explore about {topic} next?"),
        ),
    };

    debug!(
        target: "companion",
        user = %anon_hash(req.user_id),
        ?tone,
        emotion = %ctx.emotion,
        evidence = evidence_cards.len(),
        "plan composed"
    );

    ReflectionPlan {
        validation: PlanSection::new(validation),
        reflection: PlanSection::new(reflection),
        pattern_connection: PatternConnection {
            text: pattern,
            references,
        },
        gentle_nudge: PlanSection::new(nudge),
        follow_up_question: PlanSection::new(question),
        evidence_cards,
        safety: req.safety.clone(),
        constraints: PlanConstraints::FIXED,
    }
}

fn pick_topic(keyphrases: &[String], selected_prompt: &str) -> String {
    if let Some(k) = keyphrases.iter().find(|k| !k.trim().is_empty()) {
        return k.clone();
    }
    let from_prompt = selected_prompt.replace('?', "");
    let from_prompt = from_prompt.trim();
    if from_prompt.is_empty() {
        DEFAULT_TOPIC.to_string()
    } else {
        from_prompt.to_string()
    }
}

pub fn emotion_adjective(emotion: &str) -> &'static str {
    match emotion.to_lowercase().as_str() {
        "sadness" => "heavy",
        "anger" => "frustrating",
        "fear" => "anxious",
        "joy" => "uplifting",
        "surprise" => "unexpected",
        "neutral" => "steady",
        _ => "present",
    }
}

/// Flat five-string projection of a plan.
pub fn render_plan(plan: &ReflectionPlan) -> RenderedMessage {
    RenderedMessage {
        validation: plan.validation.text.clone(),
        reflection: plan.reflection.text.clone(),
        pattern_connection: plan.pattern_connection.text.clone(),
        gentle_nudge: plan.gentle_nudge.text.clone(),
        follow_up_question: plan.follow_up_question.text.clone(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseMode {
    Deterministic,
    Enhanced,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedSignals {
    pub sentiment: Sentiment,
    pub emotions: Vec<String>,
    pub keyphrases: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    pub plan: ReflectionPlan,
    pub assistant_message: RenderedMessage,
    pub safety: SafetyResult,
    pub mode: ResponseMode,
    pub extracted: ExtractedSignals,
}

/// Inputs for [`chat_turn`]. Safety is screened here, not supplied.
#[derive(Debug, Clone, Copy)]
pub struct ChatTurnRequest<'a> {
    pub user_id: &'a str,
    pub selected_prompt: &'a str,
    pub message: &'a str,
    pub retrieved_entries: &'a [Entry],
    pub time_budget: u32,
    pub mood: Option<&'a str>,
    pub history: &'a [ChatMessage],
}

/// Screen, compose, render and optionally rewrite one companion reply.
pub async fn chat_turn<S>(req: &ChatTurnRequest<'_>, signals: &S, rewriter: &Rewriter) -> ChatTurn
where
    S: SentimentClassifier + EmotionClassifier + KeyphraseExtractor + ?Sized,
{
    let safety = detect_crisis(req.message);
    let ctx = read_context(req.history, req.message, signals);
    let plan_req = PlanRequest {
        user_id: req.user_id,
        selected_prompt: req.selected_prompt,
        latest_message: req.message,
        retrieved_entries: req.retrieved_entries,
        time_budget: req.time_budget,
        mood: req.mood,
        safety: &safety,
        history: req.history,
    };
    let plan = plan_from_context(&plan_req, &ctx);
    let rendered = render_plan(&plan);

    let (assistant_message, mode) = match rewriter.rewrite(&plan, &rendered).await {
        Some(rewritten) => (rewritten, ResponseMode::Enhanced),
        None => (rendered, ResponseMode::Deterministic),
    };

    info!(
        target: "companion",
        user = %anon_hash(req.user_id),
        msg_len = req.message.len(),
        crisis = safety.crisis,
        ?mode,
        "chat turn"
    );

    ChatTurn {
        extracted: ExtractedSignals {
            sentiment: signals.classify_sentiment(&ctx.text),
            emotions: vec![ctx.emotion],
            keyphrases: ctx.keyphrases,
        },
        plan,
        assistant_message,
        safety,
        mode,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signals::Signals;

    fn req<'a>(
        safety: &'a SafetyResult,
        entries: &'a [Entry],
        history: &'a [ChatMessage],
        time_budget: u32,
    ) -> PlanRequest<'a> {
        PlanRequest {
            user_id: "user-1",
            selected_prompt: "What felt heavy today?",
            latest_message: "I keep thinking about the deadline at work.",
            retrieved_entries: entries,
            time_budget,
            mood: Some("Stressed"),
            safety,
            history,
        }
    }

    #[test]
    fn context_uses_last_two_user_messages() {
        let history = vec![
            ChatMessage::user("one"),
            ChatMessage::assistant("reply"),
            ChatMessage::user("two"),
            ChatMessage::user("   "),
            ChatMessage::user("three"),
        ];
        assert_eq!(context_text(&history, "latest"), "two three latest");
        assert_eq!(context_text(&[], "latest"), "latest");
    }

    #[test]
    fn topic_fallbacks() {
        assert_eq!(pick_topic(&["river walk".into()], "x?"), "river walk");
        assert_eq!(pick_topic(&[], "What felt heavy today?"), "What felt heavy today");
        assert_eq!(pick_topic(&[], " ? "), "what feels most important");
    }

    #[test]
    fn adjectives() {
        assert_eq!(emotion_adjective("sadness"), "heavy");
        assert_eq!(emotion_adjective("Joy"), "uplifting");
        assert_eq!(emotion_adjective("boredom"), "present");
    }

    #[test]
    fn brief_plan_with_evidence() {
        let safety = SafetyResult::safe();
        let entries = vec![Entry::new("e1", "Deadline again."), Entry::new("e2", "Late night.")];
        let plan = compose_plan(&req(&safety, &entries, &[], 5), &Signals::default());

        assert!(plan.validation.text.starts_with("Thanks for sharing. That sounds "));
        assert!(plan.reflection.text.ends_with("while feeling stressed."));
        assert!(plan.pattern_connection.text.starts_with("You've mentioned "));
        assert_eq!(plan.pattern_connection.references, vec!["e1", "e2"]);
        assert_eq!(plan.follow_up_question.text, "What feels most important to explore next?");
        assert_eq!(plan.evidence_cards[0].reason, "Related to a past entry.");
        assert_eq!(plan.constraints, PlanConstraints::FIXED);
    }

    #[test]
    fn deep_plan_without_evidence() {
        let safety = SafetyResult::safe();
        let plan = compose_plan(&req(&safety, &[], &[], 20), &Signals::default());
        assert!(plan.reflection.text.ends_with("Small details can reveal what you need most."));
        assert_eq!(
            plan.pattern_connection.text,
            "If a pattern is forming, it's okay to name it gently."
        );
        assert!(plan.pattern_connection.references.is_empty());
        assert!(plan.follow_up_question.text.starts_with("What feels most important to explore about "));
    }

    #[test]
    fn crisis_plan_ignores_content() {
        let safety = SafetyResult::crisis("Detected crisis-related language.");
        let entries = vec![Entry::new("e1", "Deadline again.")];
        let plan = compose_plan(&req(&safety, &entries, &[], 5), &Signals::default());
        assert_eq!(plan, crisis_plan(&safety));
        assert!(plan.reflection.text.contains("emergency"));
        assert!(plan.evidence_cards.is_empty());
        assert!(plan.pattern_connection.references.is_empty());
        assert!(plan.constraints.no_medical_claims);
    }

    #[test]
    fn render_is_lossless() {
        let safety = SafetyResult::safe();
        let plan = compose_plan(&req(&safety, &[], &[], 5), &Signals::default());
        let msg = render_plan(&plan);
        assert_eq!(msg.validation, plan.validation.text);
        assert_eq!(msg.pattern_connection, plan.pattern_connection.text);
        assert_eq!(msg.follow_up_question, plan.follow_up_question.text);
    }

    #[tokio::test]
    async fn chat_turn_screens_latest_message() {
        let signals = Signals::default();
        let turn = chat_turn(
            &ChatTurnRequest {
                user_id: "user-1",
                selected_prompt: "",
                message: "I want to die",
                retrieved_entries: &[],
                time_budget: 5,
                mood: None,
                history: &[],
            },
            &signals,
            &Rewriter::disabled(),
        )
        .await;
        assert!(turn.safety.crisis);
        assert_eq!(turn.mode, ResponseMode::Deterministic);
        assert_eq!(turn.assistant_message.follow_up_question, "Are you safe right now?");
    }
}
