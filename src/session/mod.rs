//! Transcription session orchestration
//!
//! This module provides the `TranscriptionSession` abstraction that manages:
//! - Capture frames flowing through the chunk scheduler to the transport
//! - Service events flowing through the transcript assembler
//! - Segmentation policy decisions (commit boundaries)
//! - The durable run log and its sealing
//! - Session statistics and lifecycle state

mod config;
mod session;
mod stats;

pub use config::SessionConfig;
pub use session::{SessionState, TranscriptionSession};
pub use stats::RunStats;
