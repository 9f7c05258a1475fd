use anyhow::Result;
use tokio::sync::mpsc;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Capture start of this frame, in milliseconds since capture began
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Frame duration derived from sample count and format.
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 || self.channels == 0 {
            return 0;
        }

        let frames = self.samples.len() as u64 / self.channels as u64;
        frames * 1000 / self.sample_rate as u64
    }

    /// Samples as little-endian bytes, the transport payload encoding.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }
}

/// Capture-side collaborator.
///
/// Implementations deliver frames in capture order through a channel; the
/// session owns one source per run and restarts capture per session. Gaps
/// in frame timestamps are tolerated downstream (logged and counted, never
/// fatal), so a source does not have to guarantee continuity.
#[async_trait::async_trait]
pub trait AudioChunkSource: Send {
    /// Start producing frames.
    ///
    /// Returns a channel receiver that will receive audio frames.
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>>;

    /// Stop producing frames.
    async fn stop(&mut self) -> Result<()>;

    /// Source name for logging
    fn name(&self) -> &str;
}

/// Source that plays out a pre-built frame sequence.
///
/// Drives deterministic runs: segmentation experiments replay the same
/// frames under different policies, and tests script exact timelines.
pub struct ScriptedSource {
    frames: Vec<AudioFrame>,
}

impl ScriptedSource {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self { frames }
    }

    /// Convenience: `total_ms` of silence at 16kHz mono in `frame_ms`
    /// frames.
    pub fn silence(total_ms: u64, frame_ms: u64) -> Self {
        let sample_rate = 16_000u32;
        let samples_per_frame = (sample_rate as u64 * frame_ms / 1000) as usize;
        let count = total_ms / frame_ms;

        let frames = (0..count)
            .map(|i| AudioFrame {
                samples: vec![0i16; samples_per_frame],
                sample_rate,
                channels: 1,
                timestamp_ms: i * frame_ms,
            })
            .collect();

        Self { frames }
    }
}

#[async_trait::async_trait]
impl AudioChunkSource for ScriptedSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(64);
        let frames = std::mem::take(&mut self.frames);

        tokio::spawn(async move {
            for frame in frames {
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
