use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::chat::ChatError;
use crate::config::AppConfig;
use crate::llm::{LlmSettings, Transport};
use crate::normalized::sse_event;
use crate::pages;
use crate::session::{Message, SessionView};

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>, settings: LlmSettings) -> anyhow::Result<()> {
    info!(
        name: "llm.config.loaded",
        base_url = %settings.base_url,
        model = %settings.model,
        protocol = ?settings.effective_protocol(),
        mode = ?config.chat.mode,
        "LLM configuration loaded"
    );

    let credential_missing = settings.api_key.is_none();
    let transport = Arc::new(Transport::new(
        settings,
        config.chat.mode,
        config.chat.system_instruction(),
    ));
    let state = AppState::new(Arc::clone(&config), transport, credential_missing);

    // Drop sessions of pages that were closed or reloaded
    let sessions = state.sessions.clone();
    let idle_timeout = config.chat.session_idle_timeout();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let removed = sessions.cleanup_expired_with_timeout(idle_timeout);
            if removed > 0 {
                tracing::debug!(removed, remaining = sessions.len(), "Expired sessions removed");
            }
        }
    });

    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(listener, app.into_make_service()).await?;
    Ok(())
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        // API routes
        .route("/api/chat", post(api_chat))
        .route("/api/sessions", get(api_list_sessions).post(api_create_session))
        .route(
            "/api/sessions/{id}",
            get(api_get_session).delete(api_delete_session),
        )
        .route("/api/sessions/{id}/messages", get(api_get_messages))
        .route("/health", get(health))
        // HTML pages
        .route("/", get(index_handler))
        // Static assets
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Page Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// GET / - Chat page backed by a fresh session.
async fn index_handler(State(state): State<AppState>) -> impl IntoResponse {
    let session = state.sessions.create();
    tracing::debug!(session_id = %session.id(), "Created session for page load");
    Html(pages::chat_page(&session.view(), state.credential_missing))
}

/// GET /health - Liveness probe.
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

// ─────────────────────────────────────────────────────────────────────────────
// API Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Request body for chat API.
#[derive(Debug, Deserialize)]
struct ChatRequest {
    /// User message content.
    message: String,
    /// Optional session ID (creates new if not provided).
    #[serde(default)]
    session_id: Option<String>,
}

impl IntoResponse for ChatError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::EmptyMessage => StatusCode::BAD_REQUEST,
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::Busy => StatusCode::CONFLICT,
            Self::Session(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// POST /api/chat - Run one turn and stream its events.
async fn api_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Response, ChatError> {
    tracing::info!(
        message_length = req.message.len(),
        session_id = ?req.session_id,
        "Received chat request"
    );

    let session = match req.session_id.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => state
            .sessions
            .get(id)
            .ok_or_else(|| ChatError::SessionNotFound(id.to_string()))?,
        None => {
            let session = state.sessions.create();
            tracing::debug!(session_id = %session.id(), "Created new session");
            session
        }
    };

    let events = state.chat.submit(&session, &req.message).inspect_err(|e| {
        tracing::warn!(session_id = %session.id(), error = %e, "Chat request rejected");
    })?;

    let body = Body::from_stream(events.map(|evt| Ok::<String, Infallible>(sse_event(&evt))));
    Ok(build_sse_response(body))
}

/// Session info for listing.
#[derive(Debug, Serialize)]
struct SessionInfo {
    id: String,
    message_count: usize,
}

/// GET /api/sessions - List all sessions.
async fn api_list_sessions(State(state): State<AppState>) -> Json<Vec<SessionInfo>> {
    let sessions: Vec<SessionInfo> = state
        .sessions
        .list_ids()
        .iter()
        .filter_map(|id| {
            state.sessions.get(id).map(|s| SessionInfo {
                id: id.clone(),
                message_count: s.message_count(),
            })
        })
        .collect();

    Json(sessions)
}

/// POST /api/sessions - Create a new session.
async fn api_create_session(State(state): State<AppState>) -> (StatusCode, Json<SessionView>) {
    let session = state.sessions.create();
    (StatusCode::CREATED, Json(session.view()))
}

/// GET /api/sessions/:id - Messages, loading indicator and banner.
async fn api_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionView>, StatusCode> {
    state
        .sessions
        .get(&id)
        .map(|session| Json(session.view()))
        .ok_or(StatusCode::NOT_FOUND)
}

/// DELETE /api/sessions/:id - Delete a session.
async fn api_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> StatusCode {
    match state.sessions.remove(&id) {
        Some(_) => StatusCode::NO_CONTENT,
        None => StatusCode::NOT_FOUND,
    }
}

/// GET /api/sessions/:id/messages - Get session messages.
async fn api_get_messages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<Message>>, StatusCode> {
    state
        .sessions
        .get(&id)
        .map(|session| Json(session.messages()))
        .ok_or(StatusCode::NOT_FOUND)
}

fn build_sse_response(body: Body) -> Response {
    let mut resp = Response::new(body);
    let h = resp.headers_mut();
    h.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    h.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    h.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    h.insert("X-Accel-Buffering", HeaderValue::from_static("no"));
    resp
}
