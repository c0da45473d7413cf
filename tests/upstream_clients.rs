//! End-to-end tests of the outbound clients against local mock upstreams.

use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::{Json, Router};
use futures::StreamExt;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use chat_relay::config::{LeaderboardConfig, ProviderConfig};
use chat_relay::leaderboard::supabase::SupabaseStore;
use chat_relay::leaderboard::{LeaderboardEntry, LeaderboardGateway, StoreError};
use chat_relay::provider::openai::OpenAiProvider;
use chat_relay::provider::{build_messages, CompletionProvider, ProviderError};

async fn spawn_upstream(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

// ─── OpenAI ────────────────────────────────────────────────────────────────

const SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"role\":\"assistant\",\"content\":\"\"}}]}\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\n\n",
    ": keep-alive\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"lo\"}}]}\r\n\r\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n",
    "data: [DONE]\n\n",
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"after done\"}}]}\n\n",
);

// Bare-CR line endings, a field-only `data` line and a multi-line payload.
const CR_SSE_BODY: &str = concat!(
    "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hel\"}}]}\r\r",
    "data\r\r",
    "data: {\"choices\":[{\"index\":0,\r",
    "data: \"delta\":{\"content\":\"lo\"}}]}\r\r",
    "data: [DONE]\r\r",
);

type Captured = Arc<Mutex<Vec<(HeaderMap, Value)>>>;

async fn completions(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    captured.lock().unwrap().push((headers, body));
    ([(CONTENT_TYPE, "text/event-stream")], SSE_BODY)
}

async fn completions_cr() -> impl IntoResponse {
    ([(CONTENT_TYPE, "text/event-stream")], CR_SSE_BODY)
}

async fn unauthorized() -> impl IntoResponse {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"error": {"message": "Incorrect API key provided", "code": "invalid_api_key"}})),
    )
}

#[tokio::test]
async fn test_openai_stream_decodes_deltas() {
    let captured: Captured = Arc::default();
    let base = spawn_upstream(
        Router::new()
            .route("/v1/chat/completions", post(completions))
            .with_state(captured.clone()),
    )
    .await;

    let provider = OpenAiProvider::new(&ProviderConfig {
        api_base: format!("{base}/v1"),
        api_key: Some("sk-test".to_string()),
        ..ProviderConfig::default()
    })
    .unwrap();

    let messages = build_messages("dev", Vec::new(), "hello");
    let deltas = provider.stream("gpt-4.1-mini", &messages).await.unwrap();
    let texts: Vec<String> = deltas
        .filter_map(|d| async move { d.unwrap().into_text() })
        .collect()
        .await;

    assert_eq!(texts, vec!["Hel", "lo"]);

    let captured = captured.lock().unwrap();
    let (headers, body) = &captured[0];
    assert_eq!(headers.get("authorization").unwrap(), "Bearer sk-test");
    assert_eq!(body["model"], "gpt-4.1-mini");
    assert_eq!(body["stream"], true);
    assert_eq!(
        body["messages"],
        json!([
            {"role": "developer", "content": "dev"},
            {"role": "user", "content": "hello"}
        ])
    );
}

#[tokio::test]
async fn test_openai_stream_accepts_bare_cr_framing() {
    let base = spawn_upstream(Router::new().route("/v1/chat/completions", post(completions_cr))).await;

    let provider = OpenAiProvider::new(&ProviderConfig {
        api_base: format!("{base}/v1"),
        ..ProviderConfig::default()
    })
    .unwrap();

    let messages = build_messages("dev", Vec::new(), "hello");
    let deltas = provider.stream("gpt-4.1-mini", &messages).await.unwrap();
    let texts: Vec<String> = deltas
        .filter_map(|d| async move { d.unwrap().into_text() })
        .collect()
        .await;

    assert_eq!(texts, vec!["Hel", "lo"]);
}

#[tokio::test]
async fn test_openai_error_status_carries_message() {
    let base = spawn_upstream(Router::new().route("/v1/chat/completions", post(unauthorized))).await;

    let provider = OpenAiProvider::new(&ProviderConfig {
        api_base: format!("{base}/v1"),
        ..ProviderConfig::default()
    })
    .unwrap();

    let messages = build_messages("dev", Vec::new(), "hello");
    let err = match provider.stream("gpt-4.1-mini", &messages).await {
        Ok(_) => panic!("expected the provider to reject the call"),
        Err(e) => e,
    };

    match &err {
        ProviderError::Status { status, message } => {
            assert_eq!(status.as_u16(), 401);
            assert_eq!(message, "Incorrect API key provided");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("Incorrect API key provided"));
}

// ─── Supabase ──────────────────────────────────────────────────────────────

#[derive(Clone, Default)]
struct DbState {
    requests: Arc<Mutex<Vec<(String, Option<String>, Value)>>>,
    fail_insert: bool,
}

async fn rest(
    State(state): State<DbState>,
    Path(target): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let apikey = headers
        .get("apikey")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    state
        .requests
        .lock()
        .unwrap()
        .push((target, apikey, body));

    if state.fail_insert {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({"code": "23502", "message": "null value in column \"score\"", "details": null})),
        )
            .into_response();
    }
    StatusCode::CREATED.into_response()
}

async fn rpc(
    State(state): State<DbState>,
    Path(procedure): Path<String>,
    Json(body): Json<Value>,
) -> Json<Value> {
    state
        .requests
        .lock()
        .unwrap()
        .push((format!("rpc/{procedure}"), None, body));
    Json(json!([
        {"rank": 1, "initials": "BBB", "score": 150},
        {"rank": 2, "initials": "AAA", "score": 100}
    ]))
}

fn db_router(state: DbState) -> Router {
    Router::new()
        .route("/rest/v1/rpc/{procedure}", post(rpc))
        .route("/rest/v1/{target}", post(rest))
        .with_state(state)
}

#[tokio::test]
async fn test_supabase_insert_then_window() {
    let state = DbState::default();
    let base = spawn_upstream(db_router(state.clone())).await;

    let store = SupabaseStore::new(&base, "anon-key", &LeaderboardConfig::default()).unwrap();
    let gateway = LeaderboardGateway::new(Arc::new(store));

    let rows = gateway
        .submit(&LeaderboardEntry {
            initials: "AAA".to_string(),
            score: 100,
        })
        .await
        .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1]["initials"], "AAA");

    let requests = state.requests.lock().unwrap();
    assert_eq!(requests.len(), 2);

    let (target, apikey, body) = &requests[0];
    assert_eq!(target, "leaderboard");
    assert_eq!(apikey.as_deref(), Some("anon-key"));
    assert_eq!(body["initials"], "AAA");
    assert_eq!(body["score"], 100);
    assert!(body["created_at"].is_string());

    let (target, _, body) = &requests[1];
    assert_eq!(target, "rpc/get_leaderboard_window");
    assert_eq!(
        *body,
        json!({"p_initials": "AAA", "p_score": 100, "p_window_size": 3})
    );
}

#[tokio::test]
async fn test_supabase_insert_failure_reports_message() {
    let state = DbState {
        fail_insert: true,
        ..Default::default()
    };
    let base = spawn_upstream(db_router(state.clone())).await;

    let store = SupabaseStore::new(&base, "anon-key", &LeaderboardConfig::default()).unwrap();
    let err = LeaderboardGateway::new(Arc::new(store))
        .submit(&LeaderboardEntry {
            initials: "AAA".to_string(),
            score: 100,
        })
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::Status { .. }));
    assert!(err.to_string().contains("null value in column"));
    // Only the insert reached the database.
    assert_eq!(state.requests.lock().unwrap().len(), 1);
}
