use super::state::AppState;
use crate::error::LiveError;
use crate::session::{SessionSnapshot, SessionState, TranscriptAccumulator, TranscriptTurn};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::{error, info};

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub status: String,
    pub message: String,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub turns: Vec<TranscriptTurn>,
    /// Turn still being spoken
    pub pending: TranscriptAccumulator,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: &LiveError) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
        }),
    )
        .into_response()
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /live/start
/// Start the live conversation (no-op if one is already running)
pub async fn start_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Starting live session");

    match state.session.start().await {
        Ok(session) => {
            let message = match session.state {
                SessionState::Starting => "Live session requested",
                SessionState::Open => "Live session already open",
                SessionState::Closing => "Live session is closing",
                // An early close or error, see last_error
                SessionState::Idle => "Live session ended before opening",
            };
            (
                StatusCode::OK,
                Json(SessionResponse {
                    status: session.state.as_str().to_string(),
                    message: message.to_string(),
                    session,
                }),
            )
                .into_response()
        }
        Err(e @ LiveError::RunnerStopped) => {
            error!("Session loop unavailable: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, &e)
        }
        Err(e) => {
            error!("Failed to start live session: {}", e);
            error_response(StatusCode::BAD_GATEWAY, &e)
        }
    }
}

/// POST /live/stop
/// Stop the live conversation
pub async fn stop_session(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stopping live session");

    match state.session.stop().await {
        Ok(session) => (
            StatusCode::OK,
            Json(SessionResponse {
                status: "stopped".to_string(),
                message: "Live session stopped".to_string(),
                session,
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Failed to stop live session: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, &e)
        }
    }
}

/// GET /live/status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.snapshot().await {
        Ok(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e),
    }
}

/// GET /live/transcript
/// Finalized turns plus the turn in progress
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    match state.session.transcript().await {
        Ok(transcript) => (
            StatusCode::OK,
            Json(TranscriptResponse {
                turns: transcript.turns,
                pending: transcript.pending,
            }),
        )
            .into_response(),
        Err(e) => error_response(StatusCode::SERVICE_UNAVAILABLE, &e),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
