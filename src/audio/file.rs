use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use hound::WavReader;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::source::{AudioChunkSource, AudioFrame};

/// Frame granularity for file playout, in milliseconds
const FRAME_MS: u64 = 100;

/// Capture source backed by a WAV file.
///
/// Slices the file into fixed frames and plays them out on a timer when
/// `realtime` is set, so a recorded file exercises the same pacing a live
/// microphone would. With `realtime` off the frames are delivered as fast
/// as the session consumes them, which is what replay tooling wants.
pub struct FileChunkSource {
    path: PathBuf,
    realtime: bool,
    stopped: Arc<AtomicBool>,
}

impl FileChunkSource {
    pub fn new(path: impl AsRef<Path>, realtime: bool) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            realtime,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }
}

#[async_trait::async_trait]
impl AudioChunkSource for FileChunkSource {
    async fn start(&mut self) -> Result<mpsc::Receiver<AudioFrame>> {
        info!("Opening audio file: {}", self.path.display());

        let reader = WavReader::open(&self.path)
            .context("Failed to open WAV file")?;
        let spec = reader.spec();
        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64
            / (spec.sample_rate as f64 * spec.channels as f64);
        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        let samples_per_frame =
            (spec.sample_rate as u64 * FRAME_MS / 1000) as usize * spec.channels as usize;
        let (tx, rx) = mpsc::channel(64);
        let stopped = self.stopped.clone();
        let realtime = self.realtime;

        tokio::spawn(async move {
            let mut pacer = tokio::time::interval(Duration::from_millis(FRAME_MS));
            let mut timestamp_ms = 0u64;

            for window in samples.chunks(samples_per_frame) {
                if stopped.load(Ordering::Relaxed) {
                    break;
                }
                if realtime {
                    pacer.tick().await;
                }

                let frame = AudioFrame {
                    samples: window.to_vec(),
                    sample_rate: spec.sample_rate,
                    channels: spec.channels,
                    timestamp_ms,
                };
                timestamp_ms += frame.duration_ms();

                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            debug!(timestamp_ms, "file playout finished");
        });

        Ok(rx)
    }

    async fn stop(&mut self) -> Result<()> {
        self.stopped.store(true, Ordering::Relaxed);
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}
