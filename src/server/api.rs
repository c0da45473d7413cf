//! HTTP API.
//!
//! - POST /api/chat
//! - POST /api/leaderboard
//! - GET /api/health

use std::sync::Arc;

use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use uuid::Uuid;

use crate::config::Config;
use crate::leaderboard::{LeaderboardEntry, LeaderboardGateway, LeaderboardStore, WindowRow};
use crate::provider::{build_messages, ChatMessage, CompletionProvider};
use crate::server::error::{ApiError, AppJson};
use crate::server::streaming::{first_fragment, relay_body, spawn_relay};

/// Application state shared across handlers.
pub struct AppState {
    pub provider: Arc<dyn CompletionProvider>,
    pub leaderboard: LeaderboardGateway,
    pub default_model: String,
    pub stream_buffer: usize,
}

impl AppState {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        store: Arc<dyn LeaderboardStore>,
        config: &Config,
    ) -> Self {
        Self {
            provider,
            leaderboard: LeaderboardGateway::new(store),
            default_model: config.provider.default_model.clone(),
            stream_buffer: config.server.stream_buffer,
        }
    }
}

/// Build the axum router with all API routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/leaderboard", post(submit_score))
        .route("/api/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer())
        .with_state(state)
}

/// Open CORS policy: every origin, method and header, credentials included.
///
/// Browsers reject `*` together with credentials, so the request's own
/// origin, method and headers are mirrored back instead.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
        .allow_credentials(true)
}

// ─── Request/Response Types ────────────────────────────────────────────────

/// Chat relay request.
#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub developer_message: String,
    pub user_message: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub message_history: Option<Vec<ChatMessage>>,
}

impl ChatRequest {
    /// Conversation in provider order.
    pub fn into_messages(self) -> Vec<ChatMessage> {
        build_messages(
            &self.developer_message,
            self.message_history.unwrap_or_default(),
            &self.user_message,
        )
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

// ─── Route Handlers ────────────────────────────────────────────────────────

async fn chat(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<ChatRequest>,
) -> Result<Response, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let model = req
        .model
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| state.default_model.clone());

    info!(
        request_id,
        model,
        history = req.message_history.as_ref().map_or(0, Vec::len),
        "Chat request"
    );

    let messages = req.into_messages();

    let mut deltas = state
        .provider
        .stream(&model, &messages)
        .await
        .inspect_err(|e| error!(request_id, model, "Error opening provider stream: {e}"))?;

    let first = first_fragment(&mut deltas)
        .await
        .inspect_err(|e| error!(request_id, model, "Error before first fragment: {e}"))?;

    let rx = spawn_relay(request_id, first, deltas, state.stream_buffer);

    Ok((
        [(CONTENT_TYPE, "text/plain; charset=utf-8")],
        relay_body(rx),
    )
        .into_response())
}

async fn submit_score(
    State(state): State<Arc<AppState>>,
    AppJson(entry): AppJson<LeaderboardEntry>,
) -> Result<Json<Vec<WindowRow>>, ApiError> {
    info!(initials = entry.initials, score = entry.score, "Leaderboard submission");

    let rows = state.leaderboard.submit(&entry).await.inspect_err(|e| {
        error!(
            initials = entry.initials,
            score = entry.score,
            "Error submitting score: {e}"
        )
    })?;

    Ok(Json(rows))
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}
