use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonically increasing segment identifier, unique per session and
/// never reused. Assigned when a segment opens.
pub type SegmentId = u64;

/// A transcript event applied to the timeline.
///
/// Events normally arrive from the STT service; a forced commit under the
/// fixed-interval policy synthesizes a local `Committed` with whatever
/// partial text the segment had accumulated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TranscriptEvent {
    /// Interim, revisable text for an in-progress segment. Supersedes any
    /// earlier partial for the same segment.
    Partial {
        segment_id: SegmentId,
        text: String,
        received_at: DateTime<Utc>,
    },

    /// Finalized, immutable text for a segment. Terminal: every later
    /// event for the same segment is stale.
    Committed {
        segment_id: SegmentId,
        text: String,
        started_at: DateTime<Utc>,
        committed_at: DateTime<Utc>,
    },
}

impl TranscriptEvent {
    pub fn segment_id(&self) -> SegmentId {
        match self {
            TranscriptEvent::Partial { segment_id, .. } => *segment_id,
            TranscriptEvent::Committed { segment_id, .. } => *segment_id,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            TranscriptEvent::Partial { text, .. } => text,
            TranscriptEvent::Committed { text, .. } => text,
        }
    }

    pub fn is_committed(&self) -> bool {
        matches!(self, TranscriptEvent::Committed { .. })
    }

    /// Timestamp used when this event implicitly opens a segment the
    /// assembler has not seen before.
    pub fn open_timestamp(&self) -> DateTime<Utc> {
        match self {
            TranscriptEvent::Partial { received_at, .. } => *received_at,
            TranscriptEvent::Committed { started_at, .. } => *started_at,
        }
    }
}

/// Where a transcript event came from.
///
/// The wire only ever carries `Service` events; `Forced` marks commits the
/// segmentation policy synthesized locally (interval expiry or stop flush).
/// Recorded in the run log so replays and statistics can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventOrigin {
    Service,
    Forced,
}
