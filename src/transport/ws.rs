use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::audio::AudioChunk;
use crate::error::TransportError;

use super::messages::{ClientMessage, ServerMessage};
use super::{SttConnector, SttTransport};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

enum SendCmd {
    Audio(Vec<u8>),
    Control(ClientMessage),
    Close,
}

/// WebSocket connection to the STT service.
///
/// An io task owns both halves of the socket; this handle talks to it over
/// channels, which is what lets the outbound and inbound session flows
/// share one `&self` transport. A bounded command channel gives the chunk
/// scheduler real backpressure when the link is slow.
pub struct WsTransport {
    tx: mpsc::Sender<SendCmd>,
    events: Mutex<mpsc::Receiver<Result<ServerMessage, TransportError>>>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        let (ws, _resp) = connect_async(url)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        info!(url, "connected to STT service");

        let (tx, cmd_rx) = mpsc::channel(32);
        let (event_tx, event_rx) = mpsc::channel(128);
        tokio::spawn(run_io(ws, cmd_rx, event_tx));

        Ok(Self {
            tx,
            events: Mutex::new(event_rx),
        })
    }
}

async fn run_io(
    ws: WsStream,
    mut cmd_rx: mpsc::Receiver<SendCmd>,
    event_tx: mpsc::Sender<Result<ServerMessage, TransportError>>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let msg = match cmd {
                    Some(SendCmd::Audio(bytes)) => Message::Binary(bytes),
                    Some(SendCmd::Control(control)) => {
                        match serde_json::to_string(&control) {
                            Ok(json) => Message::Text(json),
                            Err(e) => {
                                warn!("failed to encode control message: {e}");
                                continue;
                            }
                        }
                    }
                    Some(SendCmd::Close) | None => {
                        // Tell the service no more audio follows before the
                        // websocket-level goodbye.
                        if let Ok(json) = serde_json::to_string(&ClientMessage::End) {
                            let _ = sink.send(Message::Text(json)).await;
                        }
                        let _ = sink.send(Message::Close(None)).await;
                        break;
                    }
                };

                if let Err(e) = sink.send(msg).await {
                    let _ = event_tx
                        .send(Err(TransportError::Send(e.to_string())))
                        .await;
                    break;
                }
            }
            item = stream.next() => {
                match item {
                    // Stream end without a close frame still counts as a
                    // clean close for the session; the events channel
                    // dropping yields Ok(None) upstream.
                    None => break,
                    Some(Err(e)) => {
                        let _ = event_tx
                            .send(Err(TransportError::Receive(e.to_string())))
                            .await;
                        break;
                    }
                    Some(Ok(Message::Text(json))) => {
                        match serde_json::from_str::<ServerMessage>(&json) {
                            Ok(msg) => {
                                if event_tx.send(Ok(msg)).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => {
                                warn!("undecodable service message, skipping: {e}");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "service closed the stream");
                        break;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

#[async_trait::async_trait]
impl SttTransport for WsTransport {
    async fn send_audio(&self, chunk: &AudioChunk) -> Result<(), TransportError> {
        self.tx
            .send(SendCmd::Audio(chunk.payload.clone()))
            .await
            .map_err(|_| TransportError::Closed("connection task ended".to_string()))
    }

    async fn signal_commit(&self) -> Result<(), TransportError> {
        self.tx
            .send(SendCmd::Control(ClientMessage::Commit))
            .await
            .map_err(|_| TransportError::Closed("connection task ended".to_string()))
    }

    async fn next_event(&self) -> Result<Option<ServerMessage>, TransportError> {
        let mut events = self.events.lock().await;
        match events.recv().await {
            Some(Ok(msg)) => Ok(Some(msg)),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let _ = self.tx.send(SendCmd::Close).await;
        Ok(())
    }
}

/// Connects `WsTransport`s to a fixed service url.
pub struct WsConnector {
    url: String,
}

impl WsConnector {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait::async_trait]
impl SttConnector for WsConnector {
    async fn connect(&self) -> Result<Box<dyn SttTransport>, TransportError> {
        Ok(Box::new(WsTransport::connect(&self.url).await?))
    }
}
