//! HTTP API server for external session control
//!
//! This module provides a REST API for driving transcription sessions:
//! - POST /sessions/start - Start a new transcription session
//! - POST /sessions/stop/:id - Stop a session and seal its run
//! - GET /sessions/:id/status - Query session statistics
//! - GET /sessions/:id/transcript - Get the transcript assembled so far
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
