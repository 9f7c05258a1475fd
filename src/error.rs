use std::path::PathBuf;
use thiserror::Error;

/// Transport-layer failures.
///
/// Connect/send/receive problems are recoverable by reconnecting; the
/// session escalates to fatal only after its reconnect budget is spent.
/// `Clone` lets the session keep the fatal error for later callers while
/// also returning it from `stop()`.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("failed to connect to STT service: {0}")]
    Connect(String),

    #[error("failed to send audio chunk: {0}")]
    Send(String),

    #[error("failed to receive service event: {0}")]
    Receive(String),

    #[error("transport closed: {0}")]
    Closed(String),
}

/// Run-log persistence failures.
///
/// These are retried with backoff; if writes keep failing the session
/// continues streaming with an in-memory record and surfaces a
/// degraded-durability warning instead of halting transcription.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("failed to create run directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode run record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Session-level errors surfaced to callers.
///
/// Diagnostics (backpressure drops, stale events, capture gaps) are
/// deliberately *not* here: they are counted in `RunStats` and reported at
/// seal time without interrupting the live flow.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// Lifecycle misuse, e.g. recording into a sealed run log. Always
    /// surfaced, never silently swallowed.
    #[error("invalid session state: {0}")]
    InvalidState(&'static str),
}
