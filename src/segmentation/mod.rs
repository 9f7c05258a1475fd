//! Segment boundary policies
//!
//! Two interchangeable ways to decide where the continuous audio stream is
//! cut into committed segments:
//! - `VoiceActivityPolicy`: the service's VAD decides, we mirror it
//! - `FixedIntervalPolicy`: a local timer forces commits at a fixed cadence

pub mod interval;
pub mod policy;
pub mod vad;

pub use interval::FixedIntervalPolicy;
pub use policy::{
    create_policy, ForceCommit, SegmentOpen, SegmentationMode, SegmentationPolicy,
};
pub use vad::VoiceActivityPolicy;
