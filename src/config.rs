use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

use crate::segmentation::SegmentationMode;
use crate::session::SessionConfig;

#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub stt: SttConfig,
    #[serde(default)]
    pub session: SessionDefaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SttConfig {
    pub url: String,
}

/// Per-session defaults; CLI flags and API requests override these.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionDefaults {
    pub chunk_size_ms: u64,
    pub segmentation: SegmentationMode,
    pub commit_interval_secs: u64,
    pub runs_dir: String,
    pub send_deadline_ms: u64,
    pub stop_grace_ms: u64,
    pub max_reconnects: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "scribe-live".to_string(),
            http: HttpConfig::default(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 3900,
        }
    }
}

impl Default for SttConfig {
    fn default() -> Self {
        Self {
            url: "ws://localhost:8765/stt".to_string(),
        }
    }
}

impl Default for SessionDefaults {
    fn default() -> Self {
        Self {
            chunk_size_ms: 200,
            segmentation: SegmentationMode::Vad,
            commit_interval_secs: 12,
            runs_dir: "runs".to_string(),
            send_deadline_ms: 250,
            stop_grace_ms: 2000,
            max_reconnects: 3,
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Build a `SessionConfig` from the file defaults.
    pub fn session_config(&self, session_id: impl Into<String>) -> SessionConfig {
        let d = &self.session;
        SessionConfig {
            session_id: session_id.into(),
            chunk_size_ms: d.chunk_size_ms,
            segmentation: d.segmentation,
            commit_interval: Duration::from_secs(d.commit_interval_secs),
            runs_dir: PathBuf::from(&d.runs_dir),
            stt_url: self.stt.url.clone(),
            send_deadline: Duration::from_millis(d.send_deadline_ms),
            stop_grace: Duration::from_millis(d.stop_grace_ms),
            max_reconnects: d.max_reconnects,
        }
    }
}
