use std::time::Duration;

use tracing::debug;

use crate::transcript::{SegmentId, TranscriptEvent};

use super::policy::{ForceCommit, SegmentOpen, SegmentationMode, SegmentationPolicy};

/// Segmentation on a fixed timer keyed to session start.
///
/// Every `interval` the currently open segment is force-committed and a
/// fresh one opened, regardless of speech content. A window in which the
/// service produced no text still closes on schedule, as an empty committed
/// segment, so interval boundaries stay deterministic across runs.
#[derive(Debug)]
pub struct FixedIntervalPolicy {
    interval: Duration,
    next_deadline: Duration,
    current: SegmentId,
}

impl FixedIntervalPolicy {
    pub fn new(interval: Duration) -> Self {
        debug_assert!(!interval.is_zero(), "commit interval must be nonzero");

        Self {
            interval,
            next_deadline: interval,
            current: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl SegmentationPolicy for FixedIntervalPolicy {
    fn on_tick(&mut self, elapsed: Duration) -> Option<ForceCommit> {
        if elapsed < self.next_deadline {
            return None;
        }

        let commit = ForceCommit {
            segment_id: self.current,
            next_segment_id: self.current + 1,
        };

        debug!(
            "interval boundary at {:.1}s: closing segment {}",
            elapsed.as_secs_f64(),
            self.current
        );

        self.current += 1;
        self.next_deadline += self.interval;

        Some(commit)
    }

    fn on_service_boundary(&mut self, _event: &TranscriptEvent) -> Option<SegmentOpen> {
        // Interval boundaries are the only boundaries. Service-side ids
        // follow the commit signals this policy already issued.
        None
    }

    fn mode(&self) -> SegmentationMode {
        SegmentationMode::FixedInterval
    }

    fn initial_segment(&self) -> Option<SegmentId> {
        Some(0)
    }
}
