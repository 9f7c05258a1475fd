use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::transcript::{SegmentId, TranscriptEvent};

use super::interval::FixedIntervalPolicy;
use super::vad::VoiceActivityPolicy;

/// Which segmentation policy a session runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMode {
    /// Segment boundaries follow the service's voice-activity signal.
    Vad,
    /// Segment boundaries are forced on a fixed timer.
    FixedInterval,
}

/// Instruction to commit the currently open segment right now, regardless
/// of speech content, and continue in a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForceCommit {
    /// Segment to close.
    pub segment_id: SegmentId,
    /// Segment opened in its place.
    pub next_segment_id: SegmentId,
}

/// Instruction to open a new local segment because the service signalled a
/// boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentOpen {
    pub segment_id: SegmentId,
}

/// Segment-boundary decision logic, polymorphic over the two policies.
///
/// The session's apply loop consults `on_tick` before `on_service_boundary`
/// in every processing step; when both would produce a boundary in the same
/// step, the forced-interval one wins and the service boundary is dropped
/// for that step. Keeping the tie-break in the loop (not in the assembler)
/// keeps it testable in isolation.
pub trait SegmentationPolicy: Send {
    /// Called on every policy tick with the time elapsed since session
    /// start. Returns a commit instruction when an interval boundary is
    /// due.
    fn on_tick(&mut self, elapsed: Duration) -> Option<ForceCommit>;

    /// Called for every service event before it is applied. Returns an
    /// open instruction when the event announces a segment this policy
    /// has not opened yet.
    fn on_service_boundary(&mut self, event: &TranscriptEvent) -> Option<SegmentOpen>;

    fn mode(&self) -> SegmentationMode;

    /// Segment opened at session start, if the policy owns the boundary
    /// clock. Interval segmentation needs an open segment from t=0; VAD
    /// waits for the service to announce one.
    fn initial_segment(&self) -> Option<SegmentId>;
}

/// Build the policy selected by the session configuration.
pub fn create_policy(
    mode: SegmentationMode,
    commit_interval: Duration,
) -> Box<dyn SegmentationPolicy> {
    match mode {
        SegmentationMode::Vad => Box::new(VoiceActivityPolicy::new()),
        SegmentationMode::FixedInterval => Box::new(FixedIntervalPolicy::new(commit_interval)),
    }
}
