use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, warn};

use crate::error::TransportError;
use crate::transport::SttTransport;

use super::source::AudioFrame;

/// Outbound chunking and pacing parameters.
#[derive(Debug, Clone)]
pub struct ChunkSchedulerConfig {
    /// Target duration of each outbound chunk in milliseconds
    pub chunk_size_ms: u64,
    /// How long a single transport send may block before the scheduler
    /// treats it as backpressure
    pub send_deadline: Duration,
}

impl Default for ChunkSchedulerConfig {
    fn default() -> Self {
        Self {
            chunk_size_ms: 200,
            send_deadline: Duration::from_millis(250),
        }
    }
}

/// One outbound send unit: a fixed-duration slice of the capture stream.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioChunk {
    /// Strictly increasing, assigned at emission. Dropped chunks keep
    /// their number so the run log can account for every sequence.
    pub sequence: u64,
    /// Capture timestamp of the first frame in this chunk
    pub start_ms: u64,
    /// Total duration of the accumulated frames
    pub duration_ms: u64,
    /// Little-endian i16 PCM
    pub payload: Vec<u8>,
}

/// Discontinuity between consecutive frame timestamps.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureGap {
    pub expected_ms: u64,
    pub actual_ms: u64,
}

/// A chunk the transport accepted during a drain pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SentChunk {
    pub sequence: u64,
    pub bytes: usize,
    pub duration_ms: u64,
}

/// What a drain pass did: which chunks went out, which were sacrificed
/// to backpressure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    pub sent: Vec<SentChunk>,
    pub dropped: Vec<u64>,
}

impl DrainReport {
    pub fn is_empty(&self) -> bool {
        self.sent.is_empty() && self.dropped.is_empty()
    }
}

/// Accumulates capture frames into fixed-duration chunks and paces their
/// hand-off to the transport.
///
/// Frames are never split: a chunk closes as soon as its accumulated
/// duration reaches the configured size, so emitted durations land within
/// one frame of the target. When the transport cannot accept a chunk
/// within the send deadline the oldest unsent chunk is dropped, keeping
/// capture ahead of a slow link instead of stalling behind it.
pub struct ChunkScheduler {
    config: ChunkSchedulerConfig,
    samples: Vec<i16>,
    chunk_start_ms: Option<u64>,
    accumulated_ms: u64,
    next_timestamp_ms: Option<u64>,
    next_sequence: u64,
    unsent: VecDeque<AudioChunk>,
}

impl ChunkScheduler {
    pub fn new(config: ChunkSchedulerConfig) -> Self {
        Self {
            config,
            samples: Vec::new(),
            chunk_start_ms: None,
            accumulated_ms: 0,
            next_timestamp_ms: None,
            next_sequence: 0,
            unsent: VecDeque::new(),
        }
    }

    /// Accumulate one capture frame.
    ///
    /// Closes the in-progress chunk once it reaches the configured
    /// duration. Returns a gap diagnostic when the frame's timestamp is
    /// discontinuous with the previous frame by more than one frame
    /// duration; the frame is still accepted.
    pub fn enqueue(&mut self, frame: &AudioFrame) -> Option<CaptureGap> {
        let frame_ms = frame.duration_ms();

        let gap = match self.next_timestamp_ms {
            Some(expected)
                if frame.timestamp_ms.abs_diff(expected) > frame_ms.max(1) =>
            {
                Some(CaptureGap {
                    expected_ms: expected,
                    actual_ms: frame.timestamp_ms,
                })
            }
            _ => None,
        };
        self.next_timestamp_ms = Some(frame.timestamp_ms + frame_ms);

        if self.chunk_start_ms.is_none() {
            self.chunk_start_ms = Some(frame.timestamp_ms);
        }
        self.samples.extend_from_slice(&frame.samples);
        self.accumulated_ms += frame_ms;

        if self.accumulated_ms >= self.config.chunk_size_ms {
            self.close_chunk();
        }

        gap
    }

    /// Close the in-progress chunk even if it is under-size.
    ///
    /// Called on stop so trailing audio shorter than one chunk still
    /// reaches the service.
    pub fn flush_partial(&mut self) {
        if !self.samples.is_empty() {
            self.close_chunk();
        }
    }

    /// Number of chunks emitted but not yet handed to the transport.
    pub fn pending(&self) -> usize {
        self.unsent.len()
    }

    /// Hand queued chunks to the transport, oldest first.
    ///
    /// Each send gets the configured deadline; a send that exceeds it is
    /// treated as backpressure and that chunk (the oldest unsent) is
    /// dropped. A transport error leaves the chunk queued for retry after
    /// reconnect and surfaces to the caller.
    pub async fn drain_into(
        &mut self,
        transport: &dyn SttTransport,
    ) -> Result<DrainReport, TransportError> {
        let mut report = DrainReport::default();

        while let Some(chunk) = self.unsent.pop_front() {
            let send = transport.send_audio(&chunk);
            match tokio::time::timeout(self.config.send_deadline, send).await {
                Ok(Ok(())) => {
                    report.sent.push(SentChunk {
                        sequence: chunk.sequence,
                        bytes: chunk.payload.len(),
                        duration_ms: chunk.duration_ms,
                    });
                }
                Ok(Err(e)) => {
                    self.unsent.push_front(chunk);
                    return Err(e);
                }
                Err(_) => {
                    warn!(
                        sequence = chunk.sequence,
                        pending = self.unsent.len(),
                        "send deadline exceeded, dropping oldest chunk"
                    );
                    report.dropped.push(chunk.sequence);
                }
            }
        }

        Ok(report)
    }

    fn close_chunk(&mut self) {
        let payload: Vec<u8> =
            self.samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        let chunk = AudioChunk {
            sequence: self.next_sequence,
            start_ms: self.chunk_start_ms.unwrap_or(0),
            duration_ms: self.accumulated_ms,
            payload,
        };
        debug!(
            sequence = chunk.sequence,
            duration_ms = chunk.duration_ms,
            bytes = chunk.payload.len(),
            "chunk ready"
        );

        self.next_sequence += 1;
        self.samples.clear();
        self.chunk_start_ms = None;
        self.accumulated_ms = 0;
        self.unsent.push_back(chunk);
    }
}
