// tests/api_http.rs
//
// HTTP-level tests for the public API Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health
// - POST /analyze-entry
// - POST /themes/recompute
// - POST /prompts
// - POST /chat/turn
// - POST /weekly-reflection

use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::json;
use serde_json::Value as Json;
use tower::ServiceExt as _; // for `oneshot`

use dearme_nlp::api;

const BODY_LIMIT: usize = 1024 * 1024; // 1MB, safe for tests

/// Default backends, permissive CORS, no rewrite provider.
fn test_router() -> Router {
    api::router()
}

async fn post_json(app: Router, uri: &str, payload: Json) -> (StatusCode, Json) {
    let req = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .expect("build POST request");

    let resp = app.oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, v)
}

fn week_entries() -> Json {
    json!([
        { "entry_id": "1", "text": "Long walk by the river, felt calm and grateful.", "mood": "Calm" },
        { "entry_id": "2", "text": "Work deadline stress again, the project feels endless.", "mood": "Stressed" },
        { "entry_id": "3", "text": "Another calm walk in the park after dinner.", "mood": "Calm" },
        { "entry_id": "4", "text": "Deadline meeting at work went late, tired and tense.", "mood": "Stressed" },
        { "entry_id": "5", "text": "Cooked with my sister, laughed a lot, happy evening.", "mood": "Happy" },
        { "entry_id": "6", "text": "Quiet morning walk, the river was beautiful.", "mood": "Calm" }
    ])
}

#[tokio::test]
async fn api_health_returns_200_and_ok_body() {
    let app = test_router();

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .body(Body::empty())
        .expect("build GET /health");

    let resp = app.oneshot(req).await.expect("oneshot /health");
    assert_eq!(resp.status(), StatusCode::OK, "GET /health should be 200");

    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body");
    let v: Json = serde_json::from_slice(&bytes).expect("parse health json");
    assert_eq!(v, json!({ "status": "ok" }));
}

#[tokio::test]
async fn api_cors_echoes_configured_origin_only() {
    let app = api::create_router(
        api::AppState::default(),
        &["http://localhost:3000".to_string()],
    );

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .header(http::header::ORIGIN, "http://localhost:3000")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.clone().oneshot(req).await.expect("oneshot allowed origin");
    assert_eq!(
        resp.headers()
            .get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .and_then(|v| v.to_str().ok()),
        Some("http://localhost:3000")
    );

    let req = Request::builder()
        .method("GET")
        .uri("/health")
        .header(http::header::ORIGIN, "http://evil.example")
        .body(Body::empty())
        .expect("build GET /health");
    let resp = app.oneshot(req).await.expect("oneshot other origin");
    assert!(resp
        .headers()
        .get(http::header::ACCESS_CONTROL_ALLOW_ORIGIN)
        .is_none());
}

#[tokio::test]
async fn api_analyze_entry_returns_all_signals() {
    let (status, v) = post_json(
        test_router(),
        "/analyze-entry",
        json!({
            "user_id": "user-1",
            "entry_id": "e1",
            "text": "Grateful for a calm walk by the river.",
            "mood": "Calm"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["entry_id"], "e1");
    assert_eq!(v["sentiment"]["label"], "positive");
    assert!(v["keyphrases"].as_array().is_some_and(|k| !k.is_empty()));
    assert_eq!(v["embedding"].as_array().map(Vec::len), Some(384));
    assert_eq!(v["safety"]["crisis"], false);
    assert_eq!(v["mood_score"], 4);
}

#[tokio::test]
async fn api_rejects_empty_user_id_with_422() {
    let (status, v) = post_json(
        test_router(),
        "/analyze-entry",
        json!({ "user_id": "  ", "text": "Some text." }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(v["error"].as_str().is_some_and(|e| e.contains("user_id")));
}

#[tokio::test]
async fn api_rejects_empty_message_with_422() {
    let (status, _) = post_json(
        test_router(),
        "/chat/turn",
        json!({ "user_id": "user-1", "message": "" }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn api_themes_single_entry_is_insufficient_data() {
    let (status, v) = post_json(
        test_router(),
        "/themes/recompute",
        json!({
            "user_id": "user-1",
            "entries": [{ "entry_id": "1", "text": "Only one entry so far." }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "insufficient_data");
    assert_eq!(v["themes"], json!([]));
    assert_eq!(v["fallback_used"], false);
}

#[tokio::test]
async fn api_themes_cluster_small_set_with_kmeans() {
    let (status, v) = post_json(
        test_router(),
        "/themes/recompute",
        json!({ "user_id": "user-1", "entries": week_entries() }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["method"], "kmeans");

    let themes = v["themes"].as_array().expect("themes array");
    assert!(!themes.is_empty());
    for t in themes {
        assert!(t["temp_theme_id"].as_str().is_some_and(|id| !id.is_empty()));
        let strength = t["strength"].as_f64().expect("strength");
        assert!((0.0..=1.0).contains(&strength));
        assert!(t["members"].as_array().is_some_and(|m| m.len() <= 3));
    }
}

#[tokio::test]
async fn api_themes_mismatched_embeddings_are_422() {
    let (status, _) = post_json(
        test_router(),
        "/themes/recompute",
        json!({
            "user_id": "user-1",
            "entries": [
                { "entry_id": "1", "text": "a", "embedding": [0.1, 0.2] },
                { "entry_id": "2", "text": "b", "embedding": [0.1, 0.2, 0.3] }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn api_prompts_without_entries_are_starters() {
    let (status, v) = post_json(
        test_router(),
        "/prompts",
        json!({ "user_id": "user-1", "mood": "Calm", "time_budget": 5 }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let prompts = v["prompts"].as_array().expect("prompts array");
    assert_eq!(prompts.len(), 4);
    assert!(prompts.iter().all(|p| p["evidence"] == json!([])));
}

#[tokio::test]
async fn api_prompts_cite_supplied_entries() {
    let (status, v) = post_json(
        test_router(),
        "/prompts",
        json!({
            "user_id": "user-1",
            "recent_entries": [{ "entry_id": "1", "text": "I felt calm after a long walk." }],
            "themes": ["calm"],
            "mood": "Calm",
            "time_budget": 5
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let prompts = v["prompts"].as_array().expect("prompts array");
    assert!(!prompts.is_empty() && prompts.len() <= 4);
    for p in prompts {
        for card in p["evidence"].as_array().expect("evidence array") {
            assert_eq!(card["entry_id"], "1");
        }
    }
}

#[tokio::test]
async fn api_chat_turn_normal_is_deterministic_with_five_sections() {
    let (status, v) = post_json(
        test_router(),
        "/chat/turn",
        json!({
            "user_id": "user-1",
            "selected_prompt": "What felt heavy today?",
            "message": "I keep thinking about the deadline at work.",
            "retrieved_entries": [
                { "entry_id": "7", "text": "Deadline week again, barely slept." }
            ],
            "time_budget": 5,
            "mood": "Stressed"
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["mode"], "deterministic");
    assert_eq!(v["safety"]["crisis"], false);
    for key in [
        "validation",
        "reflection",
        "pattern_connection",
        "gentle_nudge",
        "follow_up_question",
    ] {
        assert!(
            v["assistant_message"][key].as_str().is_some_and(|s| !s.is_empty()),
            "missing section {key}"
        );
    }
    assert_eq!(v["plan"]["constraints"]["no_advice"], true);
    assert_eq!(v["plan"]["evidence_cards"][0]["entry_id"], "7");
}

#[tokio::test]
async fn api_chat_turn_crisis_uses_fixed_plan() {
    let (status, v) = post_json(
        test_router(),
        "/chat/turn",
        json!({
            "user_id": "user-1",
            "message": "I want to kill myself.",
            "retrieved_entries": [{ "entry_id": "1", "text": "Rough week." }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["safety"]["crisis"], true);
    assert_eq!(v["mode"], "deterministic");
    assert_eq!(
        v["assistant_message"]["follow_up_question"],
        "Are you safe right now?"
    );
    assert_eq!(v["plan"]["evidence_cards"], json!([]));
}

#[tokio::test]
async fn api_weekly_reflection_has_three_blocks() {
    let (status, v) = post_json(
        test_router(),
        "/weekly-reflection",
        json!({
            "user_id": "user-1",
            "entries": week_entries(),
            "themes": [{ "label": "Walk River", "keywords": ["walk", "river"], "strength": 0.5, "members": [] }]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let blocks = v["summary_blocks"].as_array().expect("blocks");
    assert_eq!(blocks.len(), 3);
    assert_eq!(blocks[0]["title"], "Themes you returned to");
    assert!(blocks[0]["text"].as_str().is_some_and(|t| t.contains("Walk River")));
    assert!(v["prompts_next_week"].as_array().is_some_and(|p| !p.is_empty()));
    assert_eq!(v["safety"]["crisis"], false);
}

#[tokio::test]
async fn api_weekly_reflection_crisis_entry_overrides() {
    let (status, v) = post_json(
        test_router(),
        "/weekly-reflection",
        json!({
            "user_id": "user-1",
            "entries": [
                { "entry_id": "1", "text": "Fine day." },
                { "entry_id": "2", "text": "There is no reason to live." }
            ]
        }),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["safety"]["crisis"], true);
    assert_eq!(v["summary_blocks"].as_array().map(Vec::len), Some(1));
    assert_eq!(v["summary_blocks"][0]["title"], "You're not alone");
    assert_eq!(v["prompts_next_week"], json!([]));
}

#[tokio::test]
async fn api_blank_entry_text_is_422_on_every_entry_route() {
    let blank = json!([
        { "entry_id": "1", "text": "Walked by the river." },
        { "entry_id": "2", "text": "   " }
    ]);
    let cases = [
        ("/themes/recompute", json!({ "user_id": "user-1", "entries": blank })),
        ("/prompts", json!({ "user_id": "user-1", "recent_entries": blank })),
        ("/prompts", json!({ "user_id": "user-1", "similar_entries": blank })),
        ("/weekly-reflection", json!({ "user_id": "user-1", "entries": blank })),
        (
            "/chat/turn",
            json!({ "user_id": "user-1", "message": "Hello.", "retrieved_entries": blank }),
        ),
    ];

    for (uri, payload) in cases {
        let (status, v) = post_json(test_router(), uri, payload).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert!(
            v["error"].as_str().is_some_and(|e| e.contains("empty text")),
            "{uri}: {v}"
        );
    }
}

#[tokio::test]
async fn api_entry_count_above_configured_cap_is_422() {
    let capped = || {
        api::create_router(
            api::AppState {
                max_entries: 3,
                ..api::AppState::default()
            },
            &[],
        )
    };
    let four: Vec<Json> = (1..=4)
        .map(|i| json!({ "entry_id": i.to_string(), "text": format!("Entry number {i}.") }))
        .collect();

    for (uri, payload) in [
        ("/themes/recompute", json!({ "user_id": "user-1", "entries": four })),
        ("/prompts", json!({ "user_id": "user-1", "recent_entries": four })),
        ("/weekly-reflection", json!({ "user_id": "user-1", "entries": four })),
    ] {
        let (status, v) = post_json(capped(), uri, payload).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{uri}");
        assert!(v["error"].as_str().is_some_and(|e| e.contains("at most 3")), "{uri}: {v}");
    }

    // at the cap is fine
    let (status, _) = post_json(
        capped(),
        "/themes/recompute",
        json!({ "user_id": "user-1", "entries": &four[..3] }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}
