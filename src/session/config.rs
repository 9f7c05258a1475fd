use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::ChunkSchedulerConfig;
use crate::segmentation::SegmentationMode;

/// Configuration for a transcription session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Unique session identifier (e.g., "standup-2026-08-25")
    pub session_id: String,

    /// Duration of each outbound audio chunk in milliseconds
    /// Default: 200
    pub chunk_size_ms: u64,

    /// Commit-boundary policy for the transcript timeline
    pub segmentation: SegmentationMode,

    /// Forced-commit interval; only fixed-interval segmentation reads it
    pub commit_interval: Duration,

    /// Base directory where run records are persisted
    pub runs_dir: PathBuf,

    /// STT service websocket URL
    pub stt_url: String,

    /// How long one transport send may block before the oldest unsent
    /// chunk is dropped
    pub send_deadline: Duration,

    /// How long stop() waits for trailing service commits before sealing
    pub stop_grace: Duration,

    /// Reconnect attempts before a transport failure becomes fatal
    pub max_reconnects: u32,
}

impl SessionConfig {
    pub fn scheduler_config(&self) -> ChunkSchedulerConfig {
        ChunkSchedulerConfig {
            chunk_size_ms: self.chunk_size_ms,
            send_deadline: self.send_deadline,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            session_id: format!("session-{}", uuid::Uuid::new_v4()),
            chunk_size_ms: 200,
            segmentation: SegmentationMode::Vad,
            commit_interval: Duration::from_secs(12),
            runs_dir: PathBuf::from("runs"),
            stt_url: "ws://localhost:8765/stt".to_string(),
            send_deadline: Duration::from_millis(250),
            stop_grace: Duration::from_secs(2),
            max_reconnects: 3,
        }
    }
}
