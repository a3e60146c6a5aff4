use super::state::AppState;
use crate::error::SessionError;
use crate::session::{SessionStatus, StatusSnapshot};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct StartTalkingResponse {
    pub capture_id: u64,
    pub status: SessionStatus,
    pub is_capturing: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, error: &SessionError) -> axum::response::Response {
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

/// POST /talk/start
/// Start capturing and streaming audio
pub async fn start_talking(State(state): State<AppState>) -> impl IntoResponse {
    info!("Start talking requested");

    match state.manager.start_talking().await {
        Ok(capture_id) => {
            let StatusSnapshot {
                status,
                is_capturing,
                ..
            } = state.manager.status();
            (
                StatusCode::OK,
                Json(StartTalkingResponse {
                    capture_id: capture_id.0,
                    status,
                    is_capturing,
                }),
            )
                .into_response()
        }
        Err(e @ SessionError::Cancelled) => {
            warn!("Start talking cancelled: {}", e);
            error_response(StatusCode::CONFLICT, &e)
        }
        Err(e) => {
            warn!("Failed to start talking: {}", e);
            error_response(StatusCode::SERVICE_UNAVAILABLE, &e)
        }
    }
}

/// POST /talk/stop
/// Stop capturing; the connection stays open for the grace period
pub async fn stop_talking(State(state): State<AppState>) -> impl IntoResponse {
    info!("Stop talking requested");
    state.manager.stop_talking();
    (StatusCode::OK, Json(state.manager.status()))
}

/// GET /transcript
pub async fn get_transcript(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.manager.transcript()))
}

/// POST /transcript/clear
pub async fn clear_transcript(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.manager.clear_transcript()))
}

/// GET /status
pub async fn get_status(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.manager.stats()))
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
