use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session::SessionState;

/// Statistics about a transcription session run
///
/// Diagnostics live here, not in the error taxonomy: drops, gaps, stale
/// events and implicit opens are counted and reported at seal time without
/// ever interrupting the live flow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStats {
    /// Lifecycle state at the time of the snapshot
    pub state: SessionState,

    /// When the session started
    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,

    /// Audio chunks accepted by the transport
    pub chunks_sent: u64,

    /// Audio chunks dropped to backpressure
    pub chunks_dropped: u64,

    /// Payload bytes accepted by the transport
    pub bytes_sent: u64,

    /// Transcript events received from the service
    pub events_received: u64,

    /// Events discarded because their segment was already committed
    pub stale_events: u64,

    /// Events that had to open their segment implicitly
    pub implicit_opens: u64,

    /// Commits synthesized by the segmentation policy
    pub forced_commits: u64,

    /// Segments opened over the run
    pub segments_total: u64,

    /// Segments committed over the run
    pub segments_committed: u64,

    /// Capture timestamp discontinuities observed
    pub capture_gaps: u64,

    /// Transport reconnect attempts that succeeded
    pub reconnects: u32,

    /// True if run-log writes kept failing and the record is only
    /// guaranteed in memory
    pub degraded_durability: bool,
}

impl RunStats {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Idle,
            started_at,
            duration_secs: 0.0,
            chunks_sent: 0,
            chunks_dropped: 0,
            bytes_sent: 0,
            events_received: 0,
            stale_events: 0,
            implicit_opens: 0,
            forced_commits: 0,
            segments_total: 0,
            segments_committed: 0,
            capture_gaps: 0,
            reconnects: 0,
            degraded_durability: false,
        }
    }
}
