pub mod file;
pub mod scheduler;
pub mod source;

pub use file::FileChunkSource;
pub use scheduler::{
    AudioChunk, CaptureGap, ChunkScheduler, ChunkSchedulerConfig, DrainReport, SentChunk,
};
pub use source::{AudioChunkSource, AudioFrame, ScriptedSource};
