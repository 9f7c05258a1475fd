use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex as StdMutex;

use tokio::sync::{mpsc, Mutex};

use crate::audio::AudioChunk;
use crate::error::TransportError;

use super::messages::ServerMessage;
use super::{SttConnector, SttTransport};

/// What the client side of a memory pair has sent, as seen by the
/// scripted service.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundFrame {
    Audio(AudioChunk),
    Commit,
    Close,
}

/// In-process transport: a channel pair standing in for the socket.
///
/// The paired `ServiceHandle` plays the STT service, fully scripted by the
/// test or experiment driving it. A small outbound capacity makes the
/// client feel genuine backpressure when the script stops draining.
pub struct MemoryTransport {
    out_tx: mpsc::Sender<OutboundFrame>,
    in_rx: Mutex<mpsc::Receiver<Result<ServerMessage, TransportError>>>,
    closed: AtomicBool,
}

impl MemoryTransport {
    pub fn pair() -> (Self, ServiceHandle) {
        Self::pair_with_capacity(64)
    }

    pub fn pair_with_capacity(outbound_capacity: usize) -> (Self, ServiceHandle) {
        let (out_tx, out_rx) = mpsc::channel(outbound_capacity);
        let (in_tx, in_rx) = mpsc::channel(64);

        (
            Self {
                out_tx,
                in_rx: Mutex::new(in_rx),
                closed: AtomicBool::new(false),
            },
            ServiceHandle { out_rx, in_tx },
        )
    }
}

#[async_trait::async_trait]
impl SttTransport for MemoryTransport {
    async fn send_audio(&self, chunk: &AudioChunk) -> Result<(), TransportError> {
        self.out_tx
            .send(OutboundFrame::Audio(chunk.clone()))
            .await
            .map_err(|_| TransportError::Closed("service side dropped".to_string()))
    }

    async fn signal_commit(&self) -> Result<(), TransportError> {
        self.out_tx
            .send(OutboundFrame::Commit)
            .await
            .map_err(|_| TransportError::Closed("service side dropped".to_string()))
    }

    async fn next_event(&self) -> Result<Option<ServerMessage>, TransportError> {
        let mut in_rx = self.in_rx.lock().await;
        match in_rx.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.out_tx.send(OutboundFrame::Close).await;
        }
        Ok(())
    }
}

/// Service side of a memory pair.
pub struct ServiceHandle {
    out_rx: mpsc::Receiver<OutboundFrame>,
    in_tx: mpsc::Sender<Result<ServerMessage, TransportError>>,
}

impl ServiceHandle {
    /// Next frame the client sent; `None` once the client side is gone.
    pub async fn next_outbound(&mut self) -> Option<OutboundFrame> {
        self.out_rx.recv().await
    }

    /// Deliver a transcript message to the client. Returns false if the
    /// client side has gone away.
    pub async fn send(&self, msg: ServerMessage) -> bool {
        self.in_tx.send(Ok(msg)).await.is_ok()
    }

    /// Inject a stream failure, as if the connection broke mid-read.
    pub async fn fail(&self, err: TransportError) -> bool {
        self.in_tx.send(Err(err)).await.is_ok()
    }

    /// Close the service side cleanly. The client observes end-of-stream.
    pub fn close(self) {}
}

/// Connector handing out pre-built memory transports in order.
///
/// Each `connect` call takes the next queued transport; once the queue is
/// empty further attempts fail, which lets a script exhaust the session's
/// reconnect budget on purpose.
pub struct MemoryConnector {
    transports: StdMutex<VecDeque<MemoryTransport>>,
}

impl MemoryConnector {
    pub fn new(transports: Vec<MemoryTransport>) -> Self {
        Self {
            transports: StdMutex::new(transports.into_iter().collect()),
        }
    }

    /// A connector whose every attempt fails.
    pub fn refusing() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait::async_trait]
impl SttConnector for MemoryConnector {
    async fn connect(&self) -> Result<Box<dyn SttTransport>, TransportError> {
        let next = self
            .transports
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front();
        match next {
            Some(transport) => Ok(Box::new(transport)),
            None => Err(TransportError::Connect(
                "no transport available".to_string(),
            )),
        }
    }
}
