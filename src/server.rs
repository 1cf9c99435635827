//! Web chat server.
//!
//! Serves a single-page chat UI and a small JSON API over a shared
//! [`QueryEngine`]. Each browser tab holds a session id; the server keeps
//! that session's transcript in memory and sends it with every question.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Chat page |
//! | `POST` | `/api/chat` | Ask a question in a session |
//! | `GET` | `/api/sessions/{id}` | Session transcript |
//! | `DELETE` | `/api/sessions/{id}` | Forget a session |
//! | `GET` | `/health` | Health check |
//!
//! Errors use the shape `{ "error": { "code": "...", "message": "..." } }`.
//!
//! Sessions idle longer than `server.session_idle_secs` are dropped, and the
//! least recently used ones go first once `server.max_sessions` is reached.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::models::ChatMessage;
use crate::query::{ChatSession, QueryEngine, Source};

const PAGE: &str = include_str!("ui.html");

/// Shared state passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    engine: Arc<QueryEngine>,
    sessions: Arc<Mutex<SessionStore>>,
    title: Arc<str>,
}

impl AppState {
    /// State with default session limits.
    pub fn new(engine: Arc<QueryEngine>, title: &str) -> Self {
        Self::from_config(
            engine,
            &ServerConfig {
                title: title.to_string(),
                ..ServerConfig::default()
            },
        )
    }

    pub fn from_config(engine: Arc<QueryEngine>, config: &ServerConfig) -> Self {
        Self {
            engine,
            sessions: Arc::new(Mutex::new(SessionStore::new(
                Duration::from_secs(config.session_idle_secs),
                config.max_sessions,
            ))),
            title: Arc::from(config.title.as_str()),
        }
    }
}

struct StoredSession {
    session: ChatSession,
    last_used: Instant,
}

/// In-memory chat sessions with idle expiry and a size cap.
pub struct SessionStore {
    sessions: HashMap<String, StoredSession>,
    idle: Duration,
    max_sessions: usize,
}

impl SessionStore {
    pub fn new(idle: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: HashMap::new(),
            idle,
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn get(&self, id: &str, now: Instant) -> Option<&ChatSession> {
        self.sessions
            .get(id)
            .filter(|s| now.duration_since(s.last_used) <= self.idle)
            .map(|s| &s.session)
    }

    /// Remove and return a live session.
    pub fn take(&mut self, id: &str, now: Instant) -> Option<ChatSession> {
        let stored = self.sessions.remove(id)?;
        (now.duration_since(stored.last_used) <= self.idle).then_some(stored.session)
    }

    pub fn put(&mut self, id: String, session: ChatSession, now: Instant) {
        self.evict(now);
        while self.sessions.len() >= self.max_sessions {
            let Some(oldest) = self
                .sessions
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            tracing::debug!(session = %oldest, "dropping least recently used session");
            self.sessions.remove(&oldest);
        }
        self.sessions.insert(
            id,
            StoredSession {
                session,
                last_used: now,
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> Option<ChatSession> {
        self.sessions.remove(id).map(|s| s.session)
    }

    fn evict(&mut self, now: Instant) {
        let idle = self.idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, s| now.duration_since(s.last_used) <= idle);
        let dropped = before - self.sessions.len();
        if dropped > 0 {
            tracing::debug!(dropped, "expired idle sessions");
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(handle_index))
        .route("/health", get(handle_health))
        .route("/api/chat", post(handle_chat))
        .route(
            "/api/sessions/{id}",
            get(handle_get_session).delete(handle_delete_session),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind `bind_addr` and serve until the process is terminated.
pub async fn run_server(bind_addr: &str, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "chat server listening");
    println!("Chat UI available at http://{}", listener.local_addr()?);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

struct AppError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code.to_string(),
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request",
        message: message.into(),
    }
}

fn not_found(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::NOT_FOUND,
        code: "not_found",
        message: message.into(),
    }
}

// ============ GET / ============

async fn handle_index(State(state): State<AppState>) -> Html<String> {
    Html(PAGE.replace("{{title}}", &html_escape(&state.title)))
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============ POST /api/chat ============

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    session_id: Option<String>,
    message: String,
}

#[derive(Serialize)]
struct ChatResponse {
    session_id: String,
    answer: String,
    sources: Vec<Source>,
    history: Vec<ChatMessage>,
}

async fn handle_chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, AppError> {
    let question = req.message.trim();
    if question.is_empty() {
        return Err(bad_request("message must not be empty"));
    }

    let session_id = req
        .session_id
        .filter(|id| !id.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    // Take the session out so the lock is not held across the model call.
    let mut session = state
        .sessions
        .lock()
        .await
        .take(&session_id, Instant::now())
        .unwrap_or_default();

    tracing::info!(session = %session_id, turns = session.history().len() / 2, "chat request");
    let answer = session.ask(&state.engine, question).await;
    let history = session.history().to_vec();
    state
        .sessions
        .lock()
        .await
        .put(session_id.clone(), session, Instant::now());

    Ok(Json(ChatResponse {
        session_id,
        answer: answer.text,
        sources: answer.sources,
        history,
    }))
}

// ============ /api/sessions/{id} ============

#[derive(Serialize)]
struct SessionResponse {
    session_id: String,
    history: Vec<ChatMessage>,
}

async fn handle_get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionResponse>, AppError> {
    let sessions = state.sessions.lock().await;
    let session = sessions
        .get(&id, Instant::now())
        .ok_or_else(|| not_found(format!("session not found: {}", id)))?;
    Ok(Json(SessionResponse {
        session_id: id.clone(),
        history: session.history().to_vec(),
    }))
}

async fn handle_delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    match state.sessions.lock().await.remove(&id) {
        Some(_) => Ok(StatusCode::NO_CONTENT),
        None => Err(not_found(format!("session not found: {}", id))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_is_escaped() {
        assert_eq!(html_escape("<b>\"A&B\""), "&lt;b&gt;&quot;A&amp;B&quot;");
    }

    #[test]
    fn page_has_title_placeholder() {
        assert!(PAGE.contains("{{title}}"));
    }

    #[test]
    fn idle_sessions_expire() {
        let start = Instant::now();
        let mut store = SessionStore::new(Duration::from_secs(60), 10);
        store.put("a".to_string(), ChatSession::new(), start);
        assert!(store.get("a", start + Duration::from_secs(30)).is_some());
        assert!(store.get("a", start + Duration::from_secs(61)).is_none());
        assert!(store.take("a", start + Duration::from_secs(61)).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn put_drops_expired_sessions() {
        let start = Instant::now();
        let mut store = SessionStore::new(Duration::from_secs(60), 10);
        store.put("old".to_string(), ChatSession::new(), start);
        store.put("new".to_string(), ChatSession::new(), start + Duration::from_secs(120));
        assert_eq!(store.len(), 1);
        assert!(store.get("new", start + Duration::from_secs(120)).is_some());
    }

    #[test]
    fn cap_drops_least_recently_used() {
        let start = Instant::now();
        let at = |secs| start + Duration::from_secs(secs);
        let mut store = SessionStore::new(Duration::from_secs(3600), 2);
        store.put("a".to_string(), ChatSession::new(), at(1));
        store.put("b".to_string(), ChatSession::new(), at(2));
        // touching "a" makes "b" the oldest
        let a = store.take("a", at(3)).unwrap();
        store.put("a".to_string(), a, at(3));
        store.put("c".to_string(), ChatSession::new(), at(4));
        assert_eq!(store.len(), 2);
        assert!(store.get("a", at(4)).is_some());
        assert!(store.get("b", at(4)).is_none());
        assert!(store.get("c", at(4)).is_some());
    }
}
