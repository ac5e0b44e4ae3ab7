use super::auth::CurrentUser;
use super::state::AppState;
use crate::error::MeetError;
use crate::meet::{Meet, SpokenUtterance};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use base64::Engine;
use serde::{Deserialize, Serialize};
use tracing::error;

// ============================================================================
// Envelope and Request/Response Types
// ============================================================================

/// Uniform response envelope shared by success and failure
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiEnvelope {
    pub error: bool,
    pub message: String,
    pub data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
pub struct EndMeetRequest {
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct UserTurnRequest {
    /// Base64-encoded audio payload (one complete utterance)
    pub audio: String,
}

#[derive(Debug, Serialize)]
struct UtterancePayload {
    text: String,
    /// Base64-encoded MP3 audio of `text`
    audio: String,
}

impl From<SpokenUtterance> for UtterancePayload {
    fn from(utterance: SpokenUtterance) -> Self {
        Self {
            text: utterance.text,
            audio: base64::engine::general_purpose::STANDARD.encode(utterance.audio),
        }
    }
}

fn ok(message: &str, data: serde_json::Value) -> Response {
    (
        StatusCode::OK,
        Json(ApiEnvelope {
            error: false,
            message: message.to_string(),
            data,
        }),
    )
        .into_response()
}

/// Map a core error to the envelope. Expected state machine outcomes go
/// back verbatim with 400; dependency failures are logged in full and
/// surfaced as a generic 500.
pub fn reject(err: &MeetError) -> Response {
    let (status, message) = if err.is_client_error() {
        (StatusCode::BAD_REQUEST, err.to_string())
    } else {
        error!("Request failed: {}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Something went wrong.".to_string(),
        )
    };

    (
        status,
        Json(ApiEnvelope {
            error: true,
            message,
            data: serde_json::Value::Null,
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /
pub async fn welcome(State(state): State<AppState>) -> impl IntoResponse {
    ok(
        &format!("Welcome to {}!", state.service_name),
        serde_json::Value::Null,
    )
}

/// GET /health
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// POST /meets
pub async fn create_meet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
) -> Response {
    match state.manager.create(&user.id).await {
        Ok(meet) => meet_created(meet),
        Err(e) => reject(&e),
    }
}

fn meet_created(meet: Meet) -> Response {
    match serde_json::to_value(&meet) {
        Ok(data) => ok("Meet created successfully.", data),
        Err(e) => reject(&MeetError::Storage(format!("meet serialization failed: {e}"))),
    }
}

/// POST /meets/:code/start
pub async fn start_meet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(meet_code): Path<String>,
) -> Response {
    match state.manager.start(&user.id, &meet_code).await {
        Ok(()) => ok("Meet started successfully.", serde_json::Value::Null),
        Err(e) => reject(&e),
    }
}

/// POST /meets/:code/end
pub async fn end_meet(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(meet_code): Path<String>,
    Json(req): Json<EndMeetRequest>,
) -> Response {
    match state.manager.end(&user.id, &meet_code, &req.reason).await {
        Ok(()) => ok("Meet ended successfully.", serde_json::Value::Null),
        Err(e) => reject(&e),
    }
}

/// POST /meets/:code/conversation/open
pub async fn open_conversation(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(meet_code): Path<String>,
) -> Response {
    match state.engine.open_conversation(&user.id, &meet_code).await {
        Ok(utterance) => spoken(utterance, "Conversation opened."),
        Err(e) => reject(&e),
    }
}

/// POST /meets/:code/conversation/turns
pub async fn submit_user_turn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(meet_code): Path<String>,
    Json(req): Json<UserTurnRequest>,
) -> Response {
    let audio = match base64::engine::general_purpose::STANDARD.decode(req.audio.trim()) {
        Ok(bytes) if !bytes.is_empty() => bytes,
        _ => {
            return reject(&MeetError::Validation(
                "audio must be a non-empty base64 payload".into(),
            ))
        }
    };

    match state
        .engine
        .submit_user_turn(&user.id, &meet_code, &audio)
        .await
    {
        Ok(()) => ok("Turn recorded successfully.", serde_json::Value::Null),
        Err(e) => reject(&e),
    }
}

/// POST /meets/:code/conversation/advance
pub async fn advance_turn(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    Path(meet_code): Path<String>,
) -> Response {
    match state.engine.advance_turn(&user.id, &meet_code).await {
        Ok(utterance) => spoken(utterance, "Turn generated successfully."),
        Err(e) => reject(&e),
    }
}

fn spoken(utterance: SpokenUtterance, message: &str) -> Response {
    let payload = UtterancePayload::from(utterance);
    match serde_json::to_value(&payload) {
        Ok(data) => ok(message, data),
        Err(e) => reject(&MeetError::Generation(format!(
            "utterance serialization failed: {e}"
        ))),
    }
}
