use tracing::debug;

use super::event::{SegmentId, TranscriptEvent};
use super::transcript::{Transcript, TranscriptSnapshot};

/// Result of applying one event to the timeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// Event applied to a known open segment.
    Applied,

    /// Event referenced a segment never opened locally; the segment was
    /// opened implicitly and the event applied.
    AppliedImplicitOpen,

    /// Event targeted an already-committed segment and was discarded.
    Stale,
}

/// Serialized consumer of transcript events.
///
/// Per-segment state machine: `Open -> (Partial)* -> Committed`, or
/// `Open -> Committed` directly. The assembler owns the transcript and is
/// its only writer; callers read through snapshots.
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    transcript: Transcript,
    stale_events: u64,
    implicit_opens: u64,
}

impl TranscriptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a segment ahead of its first event. Duplicate opens are a
    /// no-op: the service and the local policy may both announce the same
    /// boundary.
    pub fn open_segment(&mut self, id: SegmentId, opened_at: chrono::DateTime<chrono::Utc>) {
        if !self.transcript.open_segment(id, opened_at) {
            debug!("segment {} already open, ignoring duplicate open", id);
        }
    }

    /// Apply one event in receipt order.
    ///
    /// Events for committed segments are discarded and counted, never
    /// errors: duplicates and late partials are expected service behavior.
    /// Events for unknown segments open the segment implicitly (the
    /// service's boundary signal can outrun the local open record).
    pub fn apply(&mut self, event: &TranscriptEvent) -> ApplyOutcome {
        let id = event.segment_id();

        if self.transcript.is_committed(id) {
            self.stale_events += 1;
            debug!(
                "discarding stale {} event for committed segment {}",
                if event.is_committed() { "committed" } else { "partial" },
                id
            );
            return ApplyOutcome::Stale;
        }

        let implicit = !self.transcript.contains(id);
        if implicit {
            self.transcript.open_segment(id, event.open_timestamp());
            self.implicit_opens += 1;
            debug!("implicitly opened segment {} on first event", id);
        }

        match event {
            TranscriptEvent::Partial { text, .. } => {
                self.transcript.set_partial_text(id, text);
            }
            TranscriptEvent::Committed {
                text, committed_at, ..
            } => {
                self.transcript.commit(id, text, *committed_at);
            }
        }

        if implicit {
            ApplyOutcome::AppliedImplicitOpen
        } else {
            ApplyOutcome::Applied
        }
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn snapshot(&self) -> TranscriptSnapshot {
        self.transcript.snapshot()
    }

    /// Events discarded because their segment was already committed.
    pub fn stale_events(&self) -> u64 {
        self.stale_events
    }

    /// Events that had to open their segment implicitly.
    pub fn implicit_opens(&self) -> u64 {
        self.implicit_opens
    }
}
