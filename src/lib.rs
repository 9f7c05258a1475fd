pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod runlog;
pub mod segmentation;
pub mod session;
pub mod transcript;
pub mod transport;

pub use audio::{
    AudioChunk, AudioChunkSource, AudioFrame, CaptureGap, ChunkScheduler, ChunkSchedulerConfig,
    FileChunkSource, ScriptedSource,
};
pub use config::Config;
pub use error::{PersistenceError, SessionError, TransportError};
pub use http::{create_router, AppState};
pub use runlog::{RunId, RunRecord, SessionRunLogger, StopReason};
pub use segmentation::{
    FixedIntervalPolicy, SegmentationMode, SegmentationPolicy, VoiceActivityPolicy,
};
pub use session::{RunStats, SessionConfig, SessionState, TranscriptionSession};
pub use transcript::{Transcript, TranscriptAssembler, TranscriptEvent, TranscriptSnapshot};
pub use transport::{
    MemoryConnector, MemoryTransport, SttConnector, SttTransport, WsConnector, WsTransport,
};
