use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::event::SegmentId;

/// A contiguous span of speech assigned one segment id, bounded by an open
/// and (eventually) a commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub id: SegmentId,

    /// Latest known text: the most recent partial, or the committed text.
    pub text: String,

    /// Terminal flag. A committed segment never changes again.
    pub committed: bool,

    pub opened_at: DateTime<Utc>,

    pub committed_at: Option<DateTime<Utc>>,
}

/// Ordered transcript timeline.
///
/// Segments are kept in segment-id order regardless of commit order: a
/// later-opened segment may commit before an earlier one, and the display
/// order must not follow commit time. Mutation happens only through the
/// `TranscriptAssembler`, which owns the sole mutable handle.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    segments: BTreeMap<SegmentId, Segment>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a segment. Returns false (and changes nothing) if the id is
    /// already present.
    pub fn open_segment(&mut self, id: SegmentId, opened_at: DateTime<Utc>) -> bool {
        if self.segments.contains_key(&id) {
            return false;
        }

        self.segments.insert(
            id,
            Segment {
                id,
                text: String::new(),
                committed: false,
                opened_at,
                committed_at: None,
            },
        );
        true
    }

    pub fn contains(&self, id: SegmentId) -> bool {
        self.segments.contains_key(&id)
    }

    pub fn is_committed(&self, id: SegmentId) -> bool {
        self.segments.get(&id).map(|s| s.committed).unwrap_or(false)
    }

    pub fn segment(&self, id: SegmentId) -> Option<&Segment> {
        self.segments.get(&id)
    }

    /// Replace the text of an open segment (last-write-wins).
    pub fn set_partial_text(&mut self, id: SegmentId, text: &str) {
        if let Some(segment) = self.segments.get_mut(&id) {
            if !segment.committed {
                segment.text = text.to_string();
            }
        }
    }

    /// Commit a segment with its final text. No-op if already committed.
    pub fn commit(&mut self, id: SegmentId, text: &str, committed_at: DateTime<Utc>) {
        if let Some(segment) = self.segments.get_mut(&id) {
            if !segment.committed {
                segment.text = text.to_string();
                segment.committed = true;
                segment.committed_at = Some(committed_at);
            }
        }
    }

    /// Highest segment id seen so far, if any.
    pub fn last_segment_id(&self) -> Option<SegmentId> {
        self.segments.keys().next_back().copied()
    }

    /// Ids of segments still awaiting a commit, in id order.
    pub fn open_segment_ids(&self) -> Vec<SegmentId> {
        self.segments
            .values()
            .filter(|s| !s.committed)
            .map(|s| s.id)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn committed_count(&self) -> usize {
        self.segments.values().filter(|s| s.committed).count()
    }

    /// Consistent point-in-time copy for readers (display, HTTP, seal).
    pub fn snapshot(&self) -> TranscriptSnapshot {
        TranscriptSnapshot {
            segments: self.segments.values().cloned().collect(),
        }
    }
}

/// Immutable view of the transcript at one point in time.
///
/// This is what every reader gets: the live session never hands out a
/// reference into the mutable timeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TranscriptSnapshot {
    /// All segments in id order, including committed-empty ones.
    pub segments: Vec<Segment>,
}

impl TranscriptSnapshot {
    /// Rendered transcript text in segment-id order.
    ///
    /// Segments without text (interval-forced commits that fired before
    /// the service produced anything) are suppressed here but stay in
    /// `segments` for audit fidelity.
    pub fn display_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.text.is_empty())
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn committed_count(&self) -> usize {
        self.segments.iter().filter(|s| s.committed).count()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }
}
