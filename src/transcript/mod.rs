//! Transcript timeline assembly
//!
//! This module turns the service's asynchronous partial/committed event
//! stream into an ordered transcript:
//! - `TranscriptEvent` is the event vocabulary (wire or synthesized)
//! - `Transcript` holds segments in id order and tolerates out-of-order
//!   commits
//! - `TranscriptAssembler` is the single serialized writer applying events
//!   in receipt order

mod assembler;
mod event;
mod transcript;

pub use assembler::{ApplyOutcome, TranscriptAssembler};
pub use event::{EventOrigin, SegmentId, TranscriptEvent};
pub use transcript::{Segment, Transcript, TranscriptSnapshot};
