use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::session::{RunStats, SessionConfig};
use crate::transcript::{EventOrigin, SegmentId, TranscriptEvent, TranscriptSnapshot};

/// Unique run identifier: UTC start time plus a random suffix.
///
/// Sorts chronologically as a directory name, stays unique when two runs
/// start within the same second.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(String);

impl RunId {
    pub fn generate(started_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}-{}",
            started_at.format("%Y%m%dT%H%M%SZ"),
            &suffix[..8]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// Cooperative stop requested by the caller
    Requested,
    /// The initial transport connect never succeeded
    ConnectFailed,
    /// Transport failed and the reconnect budget is spent
    TransportExhausted,
}

/// One entry in the run-log vocabulary.
///
/// `SegmentOpened` and `Transcript` entries are the replayable core:
/// re-driving them through a fresh assembler reproduces the final
/// transcript exactly. The rest is audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunEvent {
    SessionStarted {
        session_id: String,
    },
    SegmentOpened {
        segment_id: SegmentId,
        origin: EventOrigin,
    },
    Transcript {
        event: TranscriptEvent,
        origin: EventOrigin,
    },
    ChunkSent {
        sequence: u64,
        bytes: usize,
        duration_ms: u64,
    },
    ChunkDropped {
        sequence: u64,
    },
    CaptureGap {
        expected_ms: u64,
        actual_ms: u64,
    },
    TransportDown {
        detail: String,
    },
    SessionStopped {
        reason: StopReason,
    },
}

/// Run-log line envelope: an event with its apply order and wall-clock
/// receipt time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    pub seq: u64,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub event: RunEvent,
}

/// Complete in-memory record of one run.
///
/// Everything the logger persists lives here first, so a degraded disk
/// never costs the caller the transcript or the event history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub config: SessionConfig,
    pub events: Vec<LoggedEvent>,

    /// Final transcript snapshot, set at seal
    pub transcript: Option<TranscriptSnapshot>,

    /// Final statistics, set at seal
    pub stats: Option<RunStats>,

    pub stop_reason: Option<StopReason>,
    pub sealed_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    pub fn new(run_id: RunId, started_at: DateTime<Utc>, config: SessionConfig) -> Self {
        Self {
            run_id,
            started_at,
            config,
            events: Vec::new(),
            transcript: None,
            stats: None,
            stop_reason: None,
            sealed_at: None,
        }
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed_at.is_some()
    }

    /// The `run.json` view: everything except the event stream and the
    /// transcript, which get their own files.
    pub fn summary(&self) -> RunSummary {
        RunSummary {
            run_id: self.run_id.clone(),
            started_at: self.started_at,
            sealed_at: self.sealed_at,
            stop_reason: self.stop_reason,
            config: self.config.clone(),
            stats: self.stats.clone(),
        }
    }
}

/// Contents of `run.json` in a sealed run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub sealed_at: Option<DateTime<Utc>>,
    pub stop_reason: Option<StopReason>,
    pub config: SessionConfig,
    pub stats: Option<RunStats>,
}
