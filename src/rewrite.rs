// src/rewrite.rs
//! Optional LLM rewrite of a rendered reflection plan.
//!
//! The provider only ever sees the deterministic plan and its evidence
//! snippets. Whatever comes back has to pass three gates before it replaces
//! the deterministic message:
//! 1) a JSON object carrying all five sections, non-empty
//! 2) none of the disallowed clinical/directive phrases
//! 3) enough token overlap with the plan + evidence (no new content)
//!
//! Any failure keeps the deterministic message. Crisis plans never reach
//! the provider.

use async_trait::async_trait;
use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::RewriteConfig;
use crate::models::{ReflectionPlan, RenderedMessage};

const SYSTEM_PROMPT: &str = "You rewrite journaling companion responses. \
Keep meaning identical, do not add new facts or advice. \
Return JSON only with keys validation, reflection, pattern_connection, gentle_nudge, follow_up_question.";

static DISALLOWED: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bdiagnos(e|is)\b",
        r"(?i)\bmedical advice\b",
        r"(?i)\btherapy\b",
        r"(?i)\bmedication\b",
        r"(?i)\bprescrib(e|ing)\b",
        r"(?i)\bpsychiatrist\b",
        r"(?i)\byou should\b",
        r"(?i)\byou must\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("disallowed pattern"))
    .collect()
});

static JSON_OBJECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("json object regex"));
static WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[a-zA-Z']+").expect("word regex"));

/// Function words ignored by the overlap check.
static OVERLAP_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the", "and", "a", "an", "to", "of", "in", "on", "for", "with", "that", "this", "is",
        "it", "are", "was", "were", "be", "as", "at", "by", "or", "from", "you", "your", "we",
        "our", "they", "their",
    ]
    .into_iter()
    .collect()
});

#[derive(Debug, thiserror::Error)]
pub enum RewriteRejection {
    #[error("crisis plans are not rewritten")]
    Crisis,
    #[error("provider error: {0}")]
    Provider(String),
    #[error("output is not a JSON object")]
    InvalidJson,
    #[error("section `{0}` is missing or empty")]
    Schema(&'static str),
    #[error("disallowed phrase matched `{0}`")]
    Policy(String),
    #[error("overlap {ratio:.2} below minimum {min:.2}")]
    Overlap { ratio: f32, min: f32 },
}

impl RewriteRejection {
    /// Metric label.
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::Crisis => "crisis",
            Self::Provider(_) => "provider_error",
            Self::InvalidJson => "invalid_json",
            Self::Schema(_) => "schema_validation",
            Self::Policy(_) => "policy_violation",
            Self::Overlap { .. } => "overlap_check",
        }
    }
}

/// A chat-completion style backend returning raw model text.
#[async_trait]
pub trait RewriteProvider: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RewriteRejection>;
    fn name(&self) -> &'static str;
}

/// OpenAI Chat Completions.
pub struct OpenAiProvider {
    http: reqwest::Client,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiProvider {
    pub fn new(cfg: &RewriteConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent("dearme-nlp/0.1")
            .connect_timeout(Duration::from_secs(4))
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
        })
    }
}

#[async_trait]
impl RewriteProvider for OpenAiProvider {
    async fn complete(&self, system: &str, user: &str) -> Result<String, RewriteRejection> {
        #[derive(Serialize)]
        struct Msg<'a> {
            role: &'a str,
            content: &'a str,
        }
        #[derive(Serialize)]
        struct Req<'a> {
            model: &'a str,
            messages: Vec<Msg<'a>>,
            temperature: f32,
            max_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Resp {
            choices: Vec<Choice>,
        }
        #[derive(Deserialize)]
        struct Choice {
            message: ChoiceMsg,
        }
        #[derive(Deserialize)]
        struct ChoiceMsg {
            content: Option<String>,
        }

        let req = Req {
            model: &self.model,
            messages: vec![
                Msg {
                    role: "system",
                    content: system,
                },
                Msg {
                    role: "user",
                    content: user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post("https://api.openai.com/v1/chat/completions")
            .bearer_auth(&self.api_key)
            .json(&req)
            .send()
            .await
            .map_err(|e| RewriteRejection::Provider(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(RewriteRejection::Provider(format!("status {}", resp.status())));
        }
        let body: Resp = resp
            .json()
            .await
            .map_err(|e| RewriteRejection::Provider(e.to_string()))?;
        Ok(body
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Offline provider. With no fixed reply it echoes the plan sections it was
/// sent, which always passes validation.
#[derive(Debug, Clone, Default)]
pub struct MockProvider {
    pub fixed: Option<String>,
}

#[async_trait]
impl RewriteProvider for MockProvider {
    async fn complete(&self, _system: &str, user: &str) -> Result<String, RewriteRejection> {
        if let Some(out) = &self.fixed {
            return Ok(out.clone());
        }
        let payload: Value =
            serde_json::from_str(user).map_err(|e| RewriteRejection::Provider(e.to_string()))?;
        Ok(payload["plan"].to_string())
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

/// Shared, read-only rewrite gate. Disabled unless configured with a usable
/// provider.
#[derive(Clone)]
pub struct Rewriter {
    provider: Option<Arc<dyn RewriteProvider>>,
    min_overlap: f32,
}

impl std::fmt::Debug for Rewriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rewriter")
            .field("provider", &self.provider_name())
            .field("min_overlap", &self.min_overlap)
            .finish()
    }
}

impl Default for Rewriter {
    fn default() -> Self {
        Self::disabled()
    }
}

impl Rewriter {
    pub fn disabled() -> Self {
        Self {
            provider: None,
            min_overlap: RewriteConfig::default().min_overlap,
        }
    }

    pub fn with_provider(provider: Arc<dyn RewriteProvider>, min_overlap: f32) -> Self {
        Self {
            provider: Some(provider),
            min_overlap,
        }
    }

    pub fn from_config(cfg: &RewriteConfig) -> anyhow::Result<Self> {
        if !cfg.is_usable() {
            info!(target: "rewrite", enabled = cfg.enabled, "enhanced language off");
            return Ok(Self::disabled());
        }
        let provider: Arc<dyn RewriteProvider> = match cfg.provider.as_str() {
            "openai" => Arc::new(OpenAiProvider::new(cfg)?),
            "mock" => Arc::new(MockProvider::default()),
            other => {
                warn!(target: "rewrite", provider = other, "unknown rewrite provider, staying deterministic");
                return Ok(Self::disabled());
            }
        };
        info!(target: "rewrite", provider = provider.name(), model = %cfg.model, "enhanced language on");
        Ok(Self::with_provider(provider, cfg.min_overlap))
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.as_ref().map_or("disabled", |p| p.name())
    }

    /// `None` when disabled or when the rewrite is rejected.
    pub async fn rewrite(&self, plan: &ReflectionPlan, rendered: &RenderedMessage) -> Option<RenderedMessage> {
        let provider = self.provider.as_ref()?;
        match self.try_rewrite(provider.as_ref(), plan, rendered).await {
            Ok(msg) => {
                counter!("nlp_rewrite_outcome_total", "outcome" => "accepted").increment(1);
                debug!(target: "rewrite", provider = provider.name(), "rewrite accepted");
                Some(msg)
            }
            Err(rejection) => {
                counter!("nlp_rewrite_outcome_total", "outcome" => rejection.outcome()).increment(1);
                info!(target: "rewrite", reason = rejection.outcome(), detail = %rejection, "rewrite rejected");
                None
            }
        }
    }

    async fn try_rewrite(
        &self,
        provider: &dyn RewriteProvider,
        plan: &ReflectionPlan,
        rendered: &RenderedMessage,
    ) -> Result<RenderedMessage, RewriteRejection> {
        if plan.safety.crisis {
            return Err(RewriteRejection::Crisis);
        }
        let user = build_user_payload(plan, rendered).to_string();
        let raw = provider.complete(SYSTEM_PROMPT, &user).await?;
        validate_rewrite(&raw, plan, rendered, self.min_overlap)
    }
}

fn build_user_payload(plan: &ReflectionPlan, rendered: &RenderedMessage) -> Value {
    json!({
        "plan": rendered,
        "constraints": plan.constraints,
        "evidence": plan.evidence_cards,
        "style": {
            "tone": "supportive, non-judgmental, journaling companion",
            "no_medical": true,
            "no_diagnosis": true,
            "no_advice": true,
        },
    })
}

/// Pure validation of raw provider output against the plan it rewrites.
pub fn validate_rewrite(
    raw: &str,
    plan: &ReflectionPlan,
    rendered: &RenderedMessage,
    min_overlap: f32,
) -> Result<RenderedMessage, RewriteRejection> {
    let payload = extract_json(raw).ok_or(RewriteRejection::InvalidJson)?;
    let section = |key: &'static str| -> Result<String, RewriteRejection> {
        payload
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(RewriteRejection::Schema(key))
    };
    let candidate = RenderedMessage {
        validation: section("validation")?,
        reflection: section("reflection")?,
        pattern_connection: section("pattern_connection")?,
        gentle_nudge: section("gentle_nudge")?,
        follow_up_question: section("follow_up_question")?,
    };

    let combined = candidate.sections().join(" ");
    if let Some(m) = DISALLOWED.iter().find_map(|re| re.find(&combined)) {
        return Err(RewriteRejection::Policy(m.as_str().to_lowercase()));
    }

    let evidence = plan
        .evidence_cards
        .iter()
        .map(|c| c.snippet.as_str())
        .collect::<Vec<_>>()
        .join(" ");
    let source = format!("{} {}", rendered.sections().join(" "), evidence);
    let ratio = overlap_ratio(&source, &combined);
    if ratio < min_overlap {
        return Err(RewriteRejection::Overlap {
            ratio,
            min: min_overlap,
        });
    }
    Ok(candidate)
}

/// Whole text as a JSON object, else the outermost `{...}` span inside it.
fn extract_json(text: &str) -> Option<serde_json::Map<String, Value>> {
    let text = text.trim();
    if text.starts_with('{') {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(text) {
            return Some(map);
        }
    }
    let span = JSON_OBJECT.find(text)?;
    match serde_json::from_str::<Value>(span.as_str()) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn overlap_tokens(text: &str) -> Vec<String> {
    WORD.find_iter(&text.to_lowercase())
        .map(|m| m.as_str().to_string())
        .filter(|t| !OVERLAP_STOPWORDS.contains(t.as_str()))
        .collect()
}

/// Share of `candidate` tokens already present in `source`. No tokens → 0.
fn overlap_ratio(source: &str, candidate: &str) -> f32 {
    let known: HashSet<String> = overlap_tokens(source).into_iter().collect();
    let tokens = overlap_tokens(candidate);
    if tokens.is_empty() {
        return 0.0;
    }
    let hits = tokens.iter().filter(|t| known.contains(*t)).count();
    hits as f32 / tokens.len() as f32
}
