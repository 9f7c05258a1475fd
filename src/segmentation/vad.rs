use std::time::Duration;

use tracing::debug;

use crate::transcript::{SegmentId, TranscriptEvent};

use super::policy::{ForceCommit, SegmentOpen, SegmentationMode, SegmentationPolicy};

/// Segmentation driven by the service's own voice-activity detection.
///
/// The remote service decides where speech pauses; this policy's local duty
/// is only to open a matching segment id the first time the service refers
/// to one. With continuous speech the service typically produces on the
/// order of ten segments per 30 seconds, each committing a couple of
/// seconds after the triggering pause.
#[derive(Debug, Default)]
pub struct VoiceActivityPolicy {
    last_opened: Option<SegmentId>,
}

impl VoiceActivityPolicy {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SegmentationPolicy for VoiceActivityPolicy {
    fn on_tick(&mut self, _elapsed: Duration) -> Option<ForceCommit> {
        // Boundaries come from the service; this policy never forces one.
        None
    }

    fn on_service_boundary(&mut self, event: &TranscriptEvent) -> Option<SegmentOpen> {
        let id = event.segment_id();
        let is_new = self.last_opened.map_or(true, |last| id > last);

        if is_new {
            debug!("service opened segment {}", id);
            self.last_opened = Some(id);
            Some(SegmentOpen { segment_id: id })
        } else {
            None
        }
    }

    fn mode(&self) -> SegmentationMode {
        SegmentationMode::Vad
    }

    fn initial_segment(&self) -> Option<SegmentId> {
        // Until the service signals speech there is nothing to open; a
        // silent session ends with an empty transcript.
        None
    }
}
