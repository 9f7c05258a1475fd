use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::transcript::{SegmentId, TranscriptEvent};

/// Transcript message received from the STT service.
///
/// The service tags every message with a `type` discriminator; types this
/// client does not know fold into `Unknown` so a service-side protocol
/// addition never kills a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Interim text for an in-progress segment
    Partial {
        segment_id: SegmentId,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_ts: Option<DateTime<Utc>>,
    },

    /// Final text for a segment
    Committed {
        segment_id: SegmentId,
        text: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server_ts: Option<DateTime<Utc>>,
    },

    /// Service-reported failure; treated like a broken stream
    Error { message: String },

    #[serde(other)]
    Unknown,
}

impl ServerMessage {
    /// Convert a wire message into a transcript event, stamping local
    /// receipt time. `Error` and `Unknown` carry no transcript content.
    pub fn into_event(self, received_at: DateTime<Utc>) -> Option<TranscriptEvent> {
        match self {
            ServerMessage::Partial {
                segment_id, text, ..
            } => Some(TranscriptEvent::Partial {
                segment_id,
                text,
                received_at,
            }),
            ServerMessage::Committed {
                segment_id,
                text,
                server_ts,
            } => Some(TranscriptEvent::Committed {
                segment_id,
                text,
                started_at: server_ts.unwrap_or(received_at),
                committed_at: received_at,
            }),
            ServerMessage::Error { .. } | ServerMessage::Unknown => None,
        }
    }
}

/// Control message sent to the STT service.
///
/// Audio itself travels as raw binary frames; these are the only JSON
/// messages the client sends.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Finalize the in-progress segment; subsequent service events target
    /// the next one
    Commit,
    /// No more audio will follow
    End,
}
