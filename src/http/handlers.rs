use super::state::AppState;
use crate::audio::FileChunkSource;
use crate::segmentation::SegmentationMode;
use crate::session::{RunStats, SessionState, TranscriptionSession};
use crate::transcript::Segment;
use crate::transport::WsConnector;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Optional session ID (if not provided, generate UUID)
    pub session_id: Option<String>,

    /// WAV file streamed through the live pipeline. Device capture stays
    /// outside this service; callers hand it a recording.
    pub input: String,

    /// Play the file at capture rate (default) or flat-out
    pub realtime: Option<bool>,

    /// Outbound chunk size in milliseconds
    pub chunk_size_ms: Option<u64>,

    /// Commit-boundary policy override
    pub segmentation: Option<SegmentationMode>,

    /// Forced-commit interval in seconds (fixed_interval only)
    pub commit_interval_secs: Option<u64>,
}

#[derive(Debug, Serialize)]
pub struct StartSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StopSessionResponse {
    pub session_id: String,
    pub status: String,
    pub message: String,
    pub stats: RunStats,
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub session_id: String,
    pub state: SessionState,
    pub text: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /sessions/start
/// Start a new transcription session
pub async fn start_session(
    State(state): State<AppState>,
    Json(req): Json<StartSessionRequest>,
) -> impl IntoResponse {
    // Generate or use provided session ID
    let session_id = req
        .session_id
        .unwrap_or_else(|| format!("session-{}", uuid::Uuid::new_v4()));

    info!("Starting transcription session: {}", session_id);

    // Check if already running
    {
        let sessions = state.sessions.read().await;
        if sessions.contains_key(&session_id) {
            return (
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: format!("Session {} is already running", session_id),
                }),
            )
                .into_response();
        }
    }

    // File defaults, then request overrides
    let mut config = state.config.session_config(session_id.clone());
    if let Some(chunk_size_ms) = req.chunk_size_ms {
        config.chunk_size_ms = chunk_size_ms;
    }
    if let Some(segmentation) = req.segmentation {
        config.segmentation = segmentation;
    }
    if let Some(secs) = req.commit_interval_secs {
        config.commit_interval = Duration::from_secs(secs);
    }

    let source = FileChunkSource::new(&req.input, req.realtime.unwrap_or(true));
    let connector = Arc::new(WsConnector::new(config.stt_url.clone()));
    let session = Arc::new(TranscriptionSession::new(
        config,
        Box::new(source),
        connector,
    ));

    // Start streaming
    if let Err(e) = session.start().await {
        error!("Failed to start session: {}", e);
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: format!("Failed to start session: {}", e),
            }),
        )
            .into_response();
    }

    // Store session
    {
        let mut sessions = state.sessions.write().await;
        sessions.insert(session_id.clone(), session);
    }

    info!("Session started successfully: {}", session_id);

    (
        StatusCode::OK,
        Json(StartSessionResponse {
            session_id: session_id.clone(),
            status: "streaming".to_string(),
            message: format!("Transcription started for session {}", session_id),
        }),
    )
        .into_response()
}

/// POST /sessions/stop/:session_id
/// Stop a transcription session and seal its run record
pub async fn stop_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    info!("Stopping transcription session: {}", session_id);

    // Find and remove session
    let session = {
        let mut sessions = state.sessions.write().await;
        sessions.remove(&session_id)
    };

    match session {
        Some(session) => match session.stop().await {
            Ok(stats) => {
                info!("Session stopped successfully: {}", session_id);
                (
                    StatusCode::OK,
                    Json(StopSessionResponse {
                        session_id: session_id.clone(),
                        status: "sealed".to_string(),
                        message: "Session stopped and run sealed".to_string(),
                        stats,
                    }),
                )
                    .into_response()
            }
            Err(e) => {
                error!("Failed to stop session: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: format!("Failed to stop session: {}", e),
                    }),
                )
                    .into_response()
            }
        },
        None => {
            error!("Session {} not found", session_id);
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse {
                    error: format!("Session {} not found", session_id),
                }),
            )
                .into_response()
        }
    }
}

/// GET /sessions/:session_id/status
/// Get statistics for a running session
pub async fn get_session_status(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => (StatusCode::OK, Json(session.stats())).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /sessions/:session_id/transcript
/// Get the transcript assembled so far
pub async fn get_session_transcript(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    let sessions = state.sessions.read().await;

    match sessions.get(&session_id) {
        Some(session) => {
            let snapshot = session.transcript();
            (
                StatusCode::OK,
                Json(TranscriptResponse {
                    session_id: session_id.clone(),
                    state: session.state(),
                    text: snapshot.display_text(),
                    segments: snapshot.segments,
                }),
            )
                .into_response()
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: format!("Session {} not found", session_id),
            }),
        )
            .into_response(),
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
