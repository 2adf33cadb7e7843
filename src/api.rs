use std::sync::Arc;

use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

use crate::analysis::{analyze_entry, EntryAnalysis};
use crate::companion::{chat_turn, ChatTurn, ChatTurnRequest};
use crate::config::{NlpConfig, DEFAULT_MAX_ENTRIES};
use crate::models::{ChatMessage, Entry, PromptItem, Theme, WeeklyReflection};
use crate::prompts::{compose_prompts, PromptRequest};
use crate::rewrite::Rewriter;
use crate::safety::detect_crisis_any;
use crate::signals::{Embedder, SentimentClassifier, Signals};
use crate::text::anon_hash;
use crate::themes::{ClusterMethod, ThemeClusterer, ThemeError};
use crate::weekly::compose_weekly;

pub const MAX_TEXT_CHARS: usize = 10_000;
const DEFAULT_TIME_BUDGET: u32 = 5;

/// Read-only backends shared by every request.
#[derive(Clone, Debug)]
pub struct AppState {
    pub signals: Arc<Signals>,
    pub clusterer: Arc<ThemeClusterer>,
    pub rewriter: Arc<Rewriter>,
    /// Per-list entry cap for every route that takes entries.
    pub max_entries: usize,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            signals: Arc::new(Signals::default()),
            clusterer: Arc::new(ThemeClusterer::default()),
            rewriter: Arc::new(Rewriter::disabled()),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

impl AppState {
    pub fn from_config(cfg: &NlpConfig) -> anyhow::Result<Self> {
        Ok(Self {
            signals: Arc::new(Signals::from_config(&cfg.signals)),
            clusterer: Arc::new(ThemeClusterer::from_config(&cfg.clustering)),
            rewriter: Arc::new(Rewriter::from_config(&cfg.rewrite)?),
            max_entries: cfg.server.max_entries,
        })
    }
}

/// Default state, permissive CORS.
pub fn router() -> Router {
    create_router(AppState::default(), &[])
}

pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/analyze-entry", post(analyze_entry_handler))
        .route("/themes/recompute", post(recompute_themes))
        .route("/prompts", post(prompts))
        .route("/chat/turn", post(chat))
        .route("/weekly-reflection", post(weekly_reflection))
        .layer(cors_layer(cors_origins))
        .with_state(state)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::very_permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                warn!(target: "api", origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods(Any)
        .allow_headers(Any)
}

// ------------------------------------------------------------
// Errors
// ------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        };
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

fn require_user(user_id: &str) -> Result<(), ApiError> {
    if user_id.trim().is_empty() {
        return Err(ApiError::Validation("user_id must not be empty".into()));
    }
    Ok(())
}

fn require_text(field: &str, text: &str) -> Result<(), ApiError> {
    let len = text.chars().count();
    if len == 0 || len > MAX_TEXT_CHARS {
        return Err(ApiError::Validation(format!(
            "{field} must be 1..={MAX_TEXT_CHARS} characters"
        )));
    }
    Ok(())
}

/// At most `max` entries, each with non-blank text within the length cap.
fn require_entries(field: &str, entries: &[Entry], max: usize) -> Result<(), ApiError> {
    if entries.len() > max {
        return Err(ApiError::Validation(format!(
            "{field} has {} entries, at most {max} allowed",
            entries.len()
        )));
    }
    for e in entries {
        if e.text.trim().is_empty() {
            return Err(ApiError::Validation(format!(
                "{field}: entry {} has empty text",
                e.entry_id
            )));
        }
        require_text(field, &e.text)?;
    }
    Ok(())
}

fn default_time_budget() -> u32 {
    DEFAULT_TIME_BUDGET
}

// ------------------------------------------------------------
// Handlers
// ------------------------------------------------------------

#[derive(Serialize)]
struct HealthResp {
    status: &'static str,
}

async fn health() -> Json<HealthResp> {
    Json(HealthResp { status: "ok" })
}

#[derive(Deserialize)]
struct AnalyzeEntryReq {
    user_id: String,
    #[serde(default)]
    entry_id: Option<String>,
    text: String,
    #[serde(default)]
    mood: Option<String>,
}

async fn analyze_entry_handler(
    State(state): State<AppState>,
    Json(body): Json<AnalyzeEntryReq>,
) -> Result<Json<EntryAnalysis>, ApiError> {
    require_user(&body.user_id)?;
    require_text("text", &body.text)?;
    // journal text is never logged
    info!(
        target: "api",
        user_id = %body.user_id,
        text_len = body.text.len(),
        text_id = %anon_hash(&body.text),
        "analyze_entry"
    );
    let entry_id = body.entry_id.unwrap_or_default();
    Ok(Json(analyze_entry(
        &entry_id,
        &body.text,
        body.mood.as_deref(),
        state.signals.as_ref(),
    )))
}

#[derive(Deserialize)]
struct RecomputeReq {
    user_id: String,
    #[serde(default)]
    entries: Vec<Entry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum ThemeStatus {
    Ok,
    InsufficientData,
    ClusteringFailed,
}

#[derive(Serialize)]
struct RecomputeResp {
    themes: Vec<Theme>,
    status: ThemeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<ClusterMethod>,
    fallback_used: bool,
}

async fn recompute_themes(
    State(state): State<AppState>,
    Json(body): Json<RecomputeReq>,
) -> Result<Json<RecomputeResp>, ApiError> {
    require_user(&body.user_id)?;
    require_entries("entries", &body.entries, state.max_entries)?;
    info!(target: "api", user_id = %body.user_id, entries = body.entries.len(), "themes_recompute");

    let entries = with_embeddings(body.entries, state.signals.as_ref());
    let resp = match state.clusterer.recompute(&entries, state.signals.as_ref()) {
        Ok(run) => RecomputeResp {
            status: if run.method.is_none() {
                ThemeStatus::InsufficientData
            } else {
                ThemeStatus::Ok
            },
            reason: None,
            method: run.method,
            fallback_used: run.fallback_used,
            themes: run.themes,
        },
        Err(err @ (ThemeError::MissingEmbedding { .. } | ThemeError::InvalidEmbeddings(_))) => {
            return Err(ApiError::Validation(err.to_string()));
        }
        Err(err) => {
            warn!(target: "api", user_id = %body.user_id, error = %err, "theme clustering failed");
            RecomputeResp {
                themes: Vec::new(),
                status: ThemeStatus::ClusteringFailed,
                reason: Some(err.to_string()),
                method: None,
                fallback_used: false,
            }
        }
    };
    Ok(Json(resp))
}

/// Entries without a caller-supplied embedding get one from the signal backend.
fn with_embeddings(entries: Vec<Entry>, embedder: &dyn Embedder) -> Vec<Entry> {
    entries
        .into_iter()
        .map(|e| match e.embedding {
            Some(_) => e,
            None => {
                let v = embedder.embed(&e.text);
                e.with_embedding(v)
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct PromptsReq {
    user_id: String,
    #[serde(default)]
    recent_entries: Vec<Entry>,
    #[serde(default)]
    similar_entries: Vec<Entry>,
    #[serde(default)]
    themes: Vec<String>,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default = "default_time_budget")]
    time_budget: u32,
}

#[derive(Serialize)]
struct PromptsResp {
    prompts: Vec<PromptItem>,
}

async fn prompts(
    State(state): State<AppState>,
    Json(body): Json<PromptsReq>,
) -> Result<Json<PromptsResp>, ApiError> {
    require_user(&body.user_id)?;
    require_entries("recent_entries", &body.recent_entries, state.max_entries)?;
    require_entries("similar_entries", &body.similar_entries, state.max_entries)?;
    let req = PromptRequest {
        user_id: &body.user_id,
        recent: &body.recent_entries,
        similar: &body.similar_entries,
        themes: &body.themes,
        mood: body.mood.as_deref(),
        time_budget: body.time_budget,
    };
    let prompts = compose_prompts(&req, state.signals.as_ref());
    info!(target: "api", user_id = %body.user_id, prompts = prompts.len(), "prompts");
    Ok(Json(PromptsResp { prompts }))
}

#[derive(Deserialize)]
struct ChatTurnReq {
    user_id: String,
    #[serde(default)]
    selected_prompt: String,
    message: String,
    #[serde(default)]
    retrieved_entries: Vec<Entry>,
    #[serde(default = "default_time_budget")]
    time_budget: u32,
    #[serde(default)]
    mood: Option<String>,
    #[serde(default)]
    history: Vec<ChatMessage>,
}

async fn chat(
    State(state): State<AppState>,
    Json(body): Json<ChatTurnReq>,
) -> Result<Json<ChatTurn>, ApiError> {
    require_user(&body.user_id)?;
    require_text("message", &body.message)?;
    require_entries("retrieved_entries", &body.retrieved_entries, state.max_entries)?;
    let req = ChatTurnRequest {
        user_id: &body.user_id,
        selected_prompt: &body.selected_prompt,
        message: &body.message,
        retrieved_entries: &body.retrieved_entries,
        time_budget: body.time_budget,
        mood: body.mood.as_deref(),
        history: &body.history,
    };
    let turn = chat_turn(&req, state.signals.as_ref(), state.rewriter.as_ref()).await;
    Ok(Json(turn))
}

#[derive(Deserialize)]
struct WeeklyReq {
    user_id: String,
    #[serde(default)]
    entries: Vec<Entry>,
    #[serde(default)]
    themes: Vec<Theme>,
}

async fn weekly_reflection(
    State(state): State<AppState>,
    Json(body): Json<WeeklyReq>,
) -> Result<Json<WeeklyReflection>, ApiError> {
    require_user(&body.user_id)?;
    require_entries("entries", &body.entries, state.max_entries)?;
    let entries = with_sentiment(body.entries, state.signals.as_ref());
    let safety = detect_crisis_any(entries.iter().map(|e| e.text.as_str()));
    info!(
        target: "api",
        user_id = %body.user_id,
        entries = entries.len(),
        crisis = safety.crisis,
        "weekly_reflection"
    );
    Ok(Json(compose_weekly(&entries, &body.themes, &safety)))
}

/// Entries without a caller-supplied sentiment get one from the signal backend.
fn with_sentiment(entries: Vec<Entry>, classifier: &dyn SentimentClassifier) -> Vec<Entry> {
    entries
        .into_iter()
        .map(|mut e| {
            if e.sentiment.is_none() {
                e.sentiment = Some(classifier.classify_sentiment(&e.text));
            }
            e
        })
        .collect()
}
