pub mod memory;
pub mod messages;
pub mod ws;

pub use memory::{MemoryConnector, MemoryTransport, OutboundFrame, ServiceHandle};
pub use messages::{ClientMessage, ServerMessage};
pub use ws::{WsConnector, WsTransport};

use crate::audio::AudioChunk;
use crate::error::TransportError;

/// Client side of the realtime STT connection.
///
/// One transport is one connection attempt; reconnecting means building a
/// fresh transport through the connector. Methods take `&self` so the
/// outbound and inbound flows can share one handle from separate tasks;
/// implementations serialize internally.
#[async_trait::async_trait]
pub trait SttTransport: Send + Sync {
    /// Send one chunk of audio to the service.
    async fn send_audio(&self, chunk: &AudioChunk) -> Result<(), TransportError>;

    /// Ask the service to finalize the in-progress segment so its
    /// subsequent events target the next one.
    async fn signal_commit(&self) -> Result<(), TransportError>;

    /// Next inbound message. `Ok(None)` means the service closed the
    /// stream cleanly.
    async fn next_event(&self) -> Result<Option<ServerMessage>, TransportError>;

    /// Close the connection. Idempotent.
    async fn close(&self) -> Result<(), TransportError>;
}

/// Builds one transport per connection attempt.
///
/// The session calls this once at start and again on each reconnect
/// attempt, up to its configured cap.
#[async_trait::async_trait]
pub trait SttConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn SttTransport>, TransportError>;
}
