use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use scribe_live::runlog::{load_events, load_transcript, replay_events};
use scribe_live::{
    create_router, AppState, Config, FileChunkSource, SegmentationMode, SessionState,
    TranscriptionSession, WsConnector,
};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "scribe-live")]
#[command(about = "Streaming speech-to-text session runner")]
struct Args {
    /// Config file basename (reads <basename>.toml, falls back to defaults)
    #[arg(long, default_value = "config/scribe-live")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Transcribe a WAV file through a live STT session
    Record(RecordArgs),
    /// Rebuild a transcript from a run log and check it against the sealed one
    Replay(ReplayArgs),
    /// Run the HTTP control API
    Serve,
}

#[derive(clap::Args)]
struct RecordArgs {
    /// Input WAV file
    input: PathBuf,

    /// Pace chunks at playback speed instead of as fast as possible
    #[arg(long)]
    realtime: bool,

    /// Session ID (generated when omitted)
    #[arg(long)]
    session_id: Option<String>,

    /// Force a commit every N seconds instead of following service VAD
    #[arg(long)]
    commit_interval_secs: Option<u64>,
}

#[derive(clap::Args)]
struct ReplayArgs {
    /// Run directory, e.g. runs/20250614T102030Z-1a2b3c4d
    run_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = load_config(&args.config)?;

    info!("scribe-live v0.1.0");
    info!("Loaded config: {}", config.service.name);

    match args.command {
        Command::Record(rec) => record(&config, rec).await,
        Command::Replay(rep) => replay(&rep),
        Command::Serve => serve(config).await,
    }
}

fn load_config(basename: &str) -> Result<Config> {
    let file = format!("{basename}.toml");
    if std::path::Path::new(&file).exists() {
        Config::load(basename)
    } else {
        info!("No config file at {}, using defaults", file);
        Ok(Config::default())
    }
}

async fn record(config: &Config, args: RecordArgs) -> Result<()> {
    let session_id = args
        .session_id
        .unwrap_or_else(|| format!("cli-{}", uuid::Uuid::new_v4()));
    let mut session_config = config.session_config(&session_id);
    if let Some(secs) = args.commit_interval_secs {
        session_config.segmentation = SegmentationMode::FixedInterval;
        session_config.commit_interval = Duration::from_secs(secs);
    }

    info!("Session {} transcribing {}", session_id, args.input.display());
    info!("STT service: {}", session_config.stt_url);

    let source = FileChunkSource::new(&args.input, args.realtime);
    let connector = WsConnector::new(&session_config.stt_url);
    let session = TranscriptionSession::new(session_config, Box::new(source), Arc::new(connector));

    session.start().await?;
    info!("Streaming started, press Ctrl+C to stop early");

    // The session seals itself once the file is fully drained; Ctrl+C cuts
    // it short with a normal cooperative stop.
    let mut state_rx = session.watch_state();
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Stop requested, draining session...");
        }
        _ = async {
            while *state_rx.borrow() != SessionState::Sealed {
                if state_rx.changed().await.is_err() {
                    break;
                }
            }
        } => {}
    }

    let outcome = session.stop().await;

    let text = session.transcript().display_text();
    if text.is_empty() {
        info!("No transcript text in this run");
    } else {
        println!("{text}");
    }
    if let Some(dir) = session.run_dir() {
        info!("Run log: {}", dir.display());
    }

    let stats = outcome?;
    info!(
        "Sealed after {:.1}s: {} segments committed, {} chunks sent, {} dropped",
        stats.duration_secs, stats.segments_committed, stats.chunks_sent, stats.chunks_dropped
    );

    Ok(())
}

fn replay(args: &ReplayArgs) -> Result<()> {
    let events = load_events(&args.run_dir)?;
    let replayed = replay_events(events.iter());

    info!(
        "Replayed {} events from {}",
        events.len(),
        args.run_dir.display()
    );
    let text = replayed.display_text();
    if !text.is_empty() {
        println!("{text}");
    }

    match load_transcript(&args.run_dir) {
        Ok(stored) => {
            if serde_json::to_value(&replayed)? == serde_json::to_value(&stored)? {
                info!("Replay matches the sealed transcript");
            } else {
                bail!("replay diverges from the sealed transcript");
            }
        }
        Err(err) => warn!("Could not load sealed transcript: {}", err),
    }

    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.service.http.bind, config.service.http.port);
    let state = AppState::new(config);
    let app = create_router(state);

    info!("HTTP API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app).await?;

    Ok(())
}
