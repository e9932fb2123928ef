//! Call, session and token handlers.

use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Extension, Json, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use switchboard_agents::AgentError;
use switchboard_calls::{
    create_call, get_call, get_session, get_session_token, list_call_sessions, new_id,
    validate_caller_id, CallStoreError, NewCall,
};
use switchboard_db::DbPool;
use switchboard_types::{Call, Session, AGENT_USER_ID};
use switchboard_voice::VoiceError;
use thiserror::Error;

/// Request body for `POST /calls`.
#[derive(Debug, Default, Deserialize)]
pub struct CreateCallRequest {
    pub caller_id: Option<String>,
}

/// Response body for `POST /calls`.
#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCallResponse {
    pub call_id: String,
    pub session_id: String,
    pub token: String,
    pub url: String,
}

#[derive(Debug, Serialize)]
pub struct CallDetails {
    #[serde(flatten)]
    pub call: Call,
    pub sessions: Vec<Session>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptResponse {
    pub transcript: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionTokenResponse {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenQuery {
    pub room: Option<String>,
    pub identity: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LiveKitTokenResponse {
    pub url: String,
    pub token: String,
    pub api_key: String,
}

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<CallStoreError> for ApiError {
    fn from(e: CallStoreError) -> Self {
        match e {
            CallStoreError::CallNotFound(id) => ApiError::NotFound(format!("call {}", id)),
            CallStoreError::SessionNotFound(id) => ApiError::NotFound(format!("session {}", id)),
            CallStoreError::Validation(msg) => ApiError::BadRequest(msg),
            CallStoreError::TokenAlreadySet(id) => {
                ApiError::Conflict(format!("token already set for session {}", id))
            }
            CallStoreError::Database(e) => ApiError::InternalServerError(e.to_string()),
        }
    }
}

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::AgentAlreadyActive(_) | AgentError::SpawnRevoked(_) => {
                ApiError::Conflict(e.to_string())
            }
            AgentError::NoActiveAgent(_) => ApiError::NotFound(e.to_string()),
            AgentError::PipelineNotConfigured(_) | AgentError::TokenIssuanceFailed { .. } => {
                ApiError::ServiceUnavailable(e.to_string())
            }
            AgentError::Voice(VoiceError::EmptyAudio) => ApiError::BadRequest(e.to_string()),
            AgentError::Store(store) => store.into(),
            other => ApiError::InternalServerError(other.to_string()),
        }
    }
}

/// Runs a store operation on the blocking pool.
pub(crate) async fn with_conn<T, F>(pool: &DbPool, op: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&rusqlite::Connection) -> Result<T, CallStoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool
            .get()
            .map_err(|e| ApiError::InternalServerError(format!("db connection failed: {}", e)))?;
        op(&conn).map_err(ApiError::from)
    })
    .await
    .map_err(|e| ApiError::InternalServerError(format!("task join error: {}", e)))?
}

fn generated_caller_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_else(|| chrono::Utc::now().timestamp_micros() * 1_000);
    format!("user-{}", nanos)
}

/// Handler for `POST /calls`.
///
/// The body may be empty, in which case a caller id is generated.
pub async fn create_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CreateCallResponse>, ApiError> {
    let request: CreateCallRequest = if body.iter().all(u8::is_ascii_whitespace) {
        CreateCallRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))?
    };

    let caller_id = match request.caller_id {
        Some(id) => validate_caller_id(&id)?.to_string(),
        None => generated_caller_id(),
    };

    let call_id = new_id();
    let session_id = new_id();
    let token = state
        .voice
        .generate_join_token(&call_id, &session_id, &caller_id)
        .map_err(|e| ApiError::ServiceUnavailable(format!("token issuance failed: {}", e)))?;

    let new_call = NewCall {
        call_id: call_id.clone(),
        caller_id: caller_id.clone(),
        caller_session_id: session_id.clone(),
        caller_token: Some(token.clone()),
    };
    with_conn(&state.pool, move |conn| create_call(conn, &new_call)).await?;

    tracing::info!(call_id = %call_id, session_id = %session_id, caller_id = %caller_id, "call created");

    Ok(Json(CreateCallResponse {
        call_id,
        session_id,
        token,
        url: state.voice.get_url().to_string(),
    }))
}

/// Handler for `GET /calls/{call_id}`.
pub async fn get_call_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(call_id): Path<String>,
) -> Result<Json<CallDetails>, ApiError> {
    let details = with_conn(&state.pool, move |conn| {
        let call = get_call(conn, &call_id)?;
        let sessions = list_call_sessions(conn, &call_id)?;
        Ok(CallDetails { call, sessions })
    })
    .await?;
    Ok(Json(details))
}

/// Handler for `GET /sessions/{session_id}`. The token is never serialized.
pub async fn get_session_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    let session = with_conn(&state.pool, move |conn| get_session(conn, &session_id)).await?;
    Ok(Json(session))
}

/// Handler for `POST /sessions/{session_id}/audio`.
///
/// Runs the recorded audio through the pipeline and returns the transcript.
/// Low-confidence audio still returns its transcript but produces no reply.
pub async fn session_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<TranscriptResponse>, ApiError> {
    let id = session_id.clone();
    with_conn(&state.pool, move |conn| get_session(conn, &id)).await?;

    let outcome = state
        .agents
        .process_incoming_audio(&session_id, &body)
        .await?;
    tracing::debug!(
        session_id = %session_id,
        confidence = outcome.confidence,
        replied = outcome.reply.is_some(),
        audio_delivered = outcome.audio_delivered,
        "processed uploaded audio"
    );

    Ok(Json(TranscriptResponse {
        transcript: outcome.transcript,
    }))
}

/// Handler for `GET /sessions/{session_id}/token`.
pub async fn session_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionTokenResponse>, ApiError> {
    let id = session_id.clone();
    let token = with_conn(&state.pool, move |conn| get_session_token(conn, &id)).await?;
    match token {
        Some(token) => Ok(Json(SessionTokenResponse { token })),
        None => Err(ApiError::NotFound(format!(
            "no token issued for session {}",
            session_id
        ))),
    }
}

/// Handler for `GET /livekit/token`.
pub async fn livekit_token_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(query): Query<TokenQuery>,
) -> Result<Json<LiveKitTokenResponse>, ApiError> {
    let room = query
        .room
        .filter(|r| !r.trim().is_empty())
        .unwrap_or_else(|| "default".to_string());
    let identity = query
        .identity
        .filter(|i| !i.trim().is_empty())
        .unwrap_or_else(|| AGENT_USER_ID.to_string());

    let token = state
        .voice
        .generate_join_token(&room, &identity, &identity)
        .map_err(|e| ApiError::ServiceUnavailable(format!("token issuance failed: {}", e)))?;

    Ok(Json(LiveKitTokenResponse {
        url: state.voice.get_url().to_string(),
        token,
        api_key: state.voice.api_key().to_string(),
    }))
}
