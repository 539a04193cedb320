//! Request routing for Palaver Gateway

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Query, State},
    http::{header, Method},
    routing::{get, post},
    Json, Router,
};
use palaver_context::{ChatReply, ChatTurn, ContextError, ConversationHub, Message};
use palaver_runtime::ChatMessage;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::error::GatewayError;
use crate::metrics;

/// Conversation used when a request names none.
pub const DEFAULT_CONVERSATION_ID: &str = "default";

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub hub: Arc<ConversationHub>,
}

impl AppState {
    pub fn new(hub: Arc<ConversationHub>) -> Self {
        Self { hub }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct ConversationQuery {
    pub conversation: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    #[serde(default)]
    pub message: String,
    pub replace_history: Option<Vec<ChatMessage>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearRequest {
    pub conversation_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub history: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ClearResponse {
    pub success: bool,
}

/// Build the API routes
pub fn build_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics_handler))
        .route("/chat", post(chat))
        .route("/history", get(history))
        .route("/clear", post(clear))
        .with_state(state)
}

/// Build the full application: API routes, optional static assets, CORS and
/// request tracing.
pub fn build_app(state: AppState, assets_dir: Option<PathBuf>) -> Router {
    let mut app = build_routes(state);
    if let Some(dir) = assets_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(cors_layer()).layer(TraceLayer::new_for_http())
}

fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
}

/// Resolve the conversation id, treating absent or empty ids as the default.
fn resolve_conversation_id(candidates: &[Option<&str>]) -> String {
    candidates
        .iter()
        .flatten()
        .find(|id| !id.is_empty())
        .map_or_else(|| DEFAULT_CONVERSATION_ID.to_string(), |id| (*id).to_string())
}

/// Health check endpoint
async fn health_check() -> &'static str {
    "OK"
}

async fn metrics_handler(State(state): State<AppState>) -> Result<String, GatewayError> {
    metrics::ACTIVE_CONVERSATIONS.set(state.hub.active_conversations().await as f64);
    Ok(metrics::render()?)
}

async fn chat(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    body: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Json<ChatReply>, GatewayError> {
    metrics::CHAT_REQUESTS_TOTAL.inc();
    let Json(request) = body.map_err(|e| GatewayError::BadRequest(e.body_text()))?;
    let conversation_id = resolve_conversation_id(&[query.conversation.as_deref()]);

    tracing::info!(
        conversation_id = %conversation_id,
        replace_history = request.replace_history.as_ref().map(Vec::len),
        "chat request received"
    );

    let turn = ChatTurn {
        message: request.message,
        replace_history: request.replace_history,
    };

    let started = Instant::now();
    let result = state.hub.chat(&conversation_id, turn).await;
    metrics::CHAT_LATENCY.observe(started.elapsed().as_secs_f64());

    match result {
        Ok(reply) => Ok(Json(reply)),
        Err(err) => {
            if let ContextError::Provider { kind, .. } = &err {
                metrics::PROVIDER_ERRORS
                    .with_label_values(&[kind.as_str()])
                    .inc();
            }
            Err(err.into())
        }
    }
}

async fn history(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
) -> Result<Json<HistoryResponse>, GatewayError> {
    metrics::HISTORY_REQUESTS_TOTAL.inc();
    let conversation_id = resolve_conversation_id(&[query.conversation.as_deref()]);

    let history = state.hub.history(&conversation_id).await?;

    Ok(Json(HistoryResponse {
        history: history.into_messages(),
    }))
}

/// The id comes from the JSON body, falling back to the `conversation` query
/// parameter. An empty body is accepted.
async fn clear(
    State(state): State<AppState>,
    Query(query): Query<ConversationQuery>,
    body: Bytes,
) -> Result<Json<ClearResponse>, GatewayError> {
    metrics::CLEAR_REQUESTS_TOTAL.inc();
    let request: ClearRequest = if body.iter().all(u8::is_ascii_whitespace) {
        ClearRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| GatewayError::BadRequest(e.to_string()))?
    };
    let conversation_id = resolve_conversation_id(&[
        request.conversation_id.as_deref(),
        query.conversation.as_deref(),
    ]);

    tracing::info!(conversation_id = %conversation_id, "clear request received");
    state.hub.clear(&conversation_id).await?;

    Ok(Json(ClearResponse { success: true }))
}
