//! Route handler functions for all API endpoints.
//!
//! Each handler extracts path parameters and bodies via axum extractors,
//! talks to the repositories or the orchestrator in AppState, and returns
//! JSON (or, for chat, a server-sent event stream).

use std::convert::Infallible;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use uuid::Uuid;

use askdb_chat::{ChatError, TurnRequest};
use askdb_core::types::{Conversation, Message, Role};
use askdb_sandbox::{SchemaProvider, TableInfo};

use crate::error::ApiError;
use crate::state::AppState;

// =============================================================================
// Request types
// =============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct CreateSessionRequest {
    pub title: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

// =============================================================================
// Response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub app: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub id: Uuid,
    pub role: Role,
    pub content: String,
    pub sql_query: Option<String>,
    /// JSON array of row objects, as stored.
    pub query_result: Option<String>,
    /// Decoded chart specification; null when absent or undecodable.
    pub chart_config: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl From<Message> for MessageResponse {
    fn from(message: Message) -> Self {
        let chart_config = message
            .chart_config
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok());
        Self {
            id: message.id,
            role: message.role,
            content: message.content,
            sql_query: message.sql_query,
            query_result: message.query_result,
            chart_config,
            created_at: message.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionDetailResponse {
    pub session: Conversation,
    pub messages: Vec<MessageResponse>,
}

#[derive(Debug, Serialize)]
pub struct DatabaseInfoResponse {
    pub dialect: String,
    pub tables: Vec<TableInfo>,
    pub raw_schema: String,
}

// =============================================================================
// Helpers
// =============================================================================

fn parse_session_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw).map_err(|_| ApiError::BadRequest(format!("invalid session id: {}", raw)))
}

fn find_session(state: &AppState, id: Uuid) -> Result<Conversation, ApiError> {
    state
        .conversations
        .find_by_id(id)?
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", id)))
}

/// Title derived from the first question of a conversation, taken as sent.
pub fn title_from_question(question: &str, max_chars: usize) -> String {
    if question.chars().count() > max_chars {
        let head: String = question.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        question.to_string()
    }
}

fn validate_message(message: &str, max_chars: usize) -> Result<(), ChatError> {
    if message.trim().is_empty() {
        return Err(ChatError::EmptyMessage);
    }
    if message.chars().count() > max_chars {
        return Err(ChatError::MessageTooLong(max_chars));
    }
    Ok(())
}

// =============================================================================
// Health
// =============================================================================

/// GET /health - health check.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        app: state.config.general.app_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
    })
}

// =============================================================================
// Sessions
// =============================================================================

/// POST /api/sessions - create a conversation. The body is optional.
pub async fn create_session(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<Conversation>), ApiError> {
    let request: CreateSessionRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let title = request
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| state.config.chat.default_title.clone());

    let session = state.conversations.create(&title)?;
    tracing::info!(session_id = %session.id, "Session created");
    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /api/sessions - list conversations, most recently active first.
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<Vec<Conversation>>, ApiError> {
    Ok(Json(state.conversations.list()?))
}

/// GET /api/sessions/{id} - a conversation with its messages.
pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let id = parse_session_id(&id)?;
    let session = find_session(&state, id)?;
    let messages = state
        .messages
        .list_for_session(id)?
        .into_iter()
        .map(MessageResponse::from)
        .collect();

    Ok(Json(SessionDetailResponse { session, messages }))
}

/// DELETE /api/sessions/{id} - delete a conversation and its messages.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_session_id(&id)?;
    if !state.conversations.delete(id)? {
        return Err(ApiError::NotFound(format!("session {} not found", id)));
    }
    state.orchestrator.memory().forget(id);
    tracing::info!(session_id = %id, "Session deleted");
    Ok(StatusCode::NO_CONTENT)
}

// =============================================================================
// Database introspection
// =============================================================================

/// GET /api/database/tables - tables of the analytical database.
pub async fn database_tables(
    State(state): State<AppState>,
) -> Result<Json<DatabaseInfoResponse>, ApiError> {
    let tables = state.schema.table_details().await?;
    let raw_schema = state.schema.schema_text().await?;

    Ok(Json(DatabaseInfoResponse {
        dialect: "sqlite".to_string(),
        tables,
        raw_schema,
    }))
}

// =============================================================================
// Chat
// =============================================================================

/// POST /api/chat/{session_id} - run one turn and stream its events.
///
/// Before streaming starts, the user half and an empty assistant half are
/// stored and the default title is replaced by the question. The turn keeps
/// running if the client disconnects.
pub async fn chat(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Json(request): Json<ChatRequest>,
) -> Result<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>> + Send>, ApiError> {
    validate_message(&request.message, state.config.chat.max_message_chars)?;
    let session_id = parse_session_id(&session_id)?;
    let session = find_session(&state, session_id)?;

    let history = state.messages.list_for_session(session_id)?;
    state
        .messages
        .append(session_id, Role::User, &request.message)?;
    let assistant = state
        .messages
        .append(session_id, Role::Assistant, "")?;

    if session.title == state.config.chat.default_title {
        let title = title_from_question(&request.message, state.config.chat.title_chars);
        state.conversations.update_title(session_id, &title)?;
    }

    let handle = state.orchestrator.start_turn(TurnRequest {
        conversation_id: session_id,
        assistant_message_id: assistant.id,
        question: request.message,
        history,
    });

    let stream = ReceiverStream::new(handle.events).map(|event| {
        Ok::<_, Infallible>(
            Event::default()
                .event(event.name())
                .data(event.payload()),
        )
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(15))))
}
