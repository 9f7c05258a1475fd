use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::audio::{
    AudioChunkSource, AudioFrame, CaptureGap, ChunkScheduler, SentChunk,
};
use crate::error::{SessionError, TransportError};
use crate::runlog::{RunEvent, SessionRunLogger, StopReason};
use crate::segmentation::{create_policy, ForceCommit, SegmentationPolicy};
use crate::transcript::{
    ApplyOutcome, EventOrigin, SegmentId, TranscriptAssembler, TranscriptEvent,
    TranscriptSnapshot,
};
use crate::transport::{ServerMessage, SttConnector, SttTransport};

use super::config::SessionConfig;
use super::stats::RunStats;

/// How often the apply loop offers the segmentation policy a tick
const POLICY_TICK: Duration = Duration::from_millis(250);

/// Pause between reconnect attempts
const RECONNECT_DELAY: Duration = Duration::from_millis(500);

/// Bound on a single connect attempt, so stop() stays responsive while
/// the link is down
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Starting,
    Streaming,
    Stopping,
    Sealed,
}

/// A transcription session that streams captured audio to the STT service
/// and assembles the returned events into an ordered transcript.
///
/// Two flows run as independent tasks: capture frames move through the
/// chunk scheduler to the transport, and service events move through the
/// transcript assembler. They meet only in the apply loop, the single
/// writer of transcript and run log; everything a caller reads comes from
/// watch-channel snapshots, so readers never contend with the live flow.
pub struct TranscriptionSession {
    /// Session configuration
    config: SessionConfig,

    /// Builds one transport per connection attempt
    connector: Arc<dyn SttConnector>,

    /// Capture source, consumed by start()
    source: StdMutex<Option<Box<dyn AudioChunkSource>>>,

    /// Lifecycle state, readable at any time
    state_tx: Arc<watch::Sender<SessionState>>,

    /// Latest transcript snapshot published by the apply loop
    snapshot_tx: Arc<watch::Sender<TranscriptSnapshot>>,

    /// Latest statistics published by the apply loop
    stats_tx: Arc<watch::Sender<RunStats>>,

    /// Cooperative stop signal
    stop_tx: watch::Sender<bool>,

    /// Fatal transport error, set when the reconnect budget is spent
    fatal: Arc<StdMutex<Option<TransportError>>>,

    /// Where this run's record is persisted, known once started
    run_dir: StdMutex<Option<PathBuf>>,

    /// Handle for the apply loop task
    apply_handle: Mutex<Option<JoinHandle<()>>>,
}

impl TranscriptionSession {
    pub fn new(
        config: SessionConfig,
        source: Box<dyn AudioChunkSource>,
        connector: Arc<dyn SttConnector>,
    ) -> Self {
        let (state_tx, _) = watch::channel(SessionState::Idle);
        let (snapshot_tx, _) = watch::channel(TranscriptSnapshot::default());
        let (stats_tx, _) = watch::channel(RunStats::new(Utc::now()));
        let (stop_tx, _) = watch::channel(false);

        Self {
            config,
            connector,
            source: StdMutex::new(Some(source)),
            state_tx: Arc::new(state_tx),
            snapshot_tx: Arc::new(snapshot_tx),
            stats_tx: Arc::new(stats_tx),
            stop_tx,
            fatal: Arc::new(StdMutex::new(None)),
            run_dir: StdMutex::new(None),
            apply_handle: Mutex::new(None),
        }
    }

    /// Start streaming: open the run record, connect the transport, spawn
    /// the outbound and apply flows.
    ///
    /// A connect failure seals an empty run with `ConnectFailed` and
    /// surfaces the transport error; the session is Sealed afterwards,
    /// never half-started.
    pub async fn start(&self) -> Result<(), SessionError> {
        let entered = self.state_tx.send_if_modified(|s| {
            if *s == SessionState::Idle {
                *s = SessionState::Starting;
                true
            } else {
                false
            }
        });
        if !entered {
            return Err(SessionError::InvalidState("session already started"));
        }

        info!("Starting transcription session: {}", self.config.session_id);

        let started_at = Utc::now();
        let mut stats = RunStats::new(started_at);
        stats.state = SessionState::Starting;
        self.stats_tx.send_replace(stats.clone());

        let mut logger = match SessionRunLogger::open(started_at, self.config.clone()) {
            Ok(logger) => logger,
            Err(e) => {
                // Nothing is running; an unusable runs dir fails fast.
                self.state_tx.send_replace(SessionState::Sealed);
                return Err(SessionError::Persistence(e));
            }
        };
        *self.run_dir.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(logger.run_dir().clone());

        self.log_start_event(&mut logger, started_at);

        // Connect before touching the audio source: a dead service means
        // nothing worth capturing.
        let transport =
            match tokio::time::timeout(CONNECT_TIMEOUT, self.connector.connect()).await {
                Ok(Ok(t)) => Arc::from(t),
                Ok(Err(e)) => return self.fail_start(logger, stats, e),
                Err(_) => {
                    let e = TransportError::Connect("connect attempt timed out".to_string());
                    return self.fail_start(logger, stats, e);
                }
            };

        let mut source = self
            .source
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
            .ok_or(SessionError::InvalidState("audio source already consumed"))?;
        let frames = match source.start().await {
            Ok(rx) => rx,
            Err(e) => {
                let e = TransportError::Connect(format!("audio source failed: {e}"));
                return self.fail_start(logger, stats, e);
            }
        };
        info!("Audio source '{}' started", source.name());

        let policy = create_policy(self.config.segmentation, self.config.commit_interval);

        let (apply_tx, apply_rx) = mpsc::channel(256);
        let (transport_tx, transport_rx) =
            watch::channel((0u64, Arc::clone(&transport)));

        tokio::spawn(run_outbound(
            frames,
            ChunkScheduler::new(self.config.scheduler_config()),
            transport_rx,
            apply_tx.clone(),
            self.stop_tx.subscribe(),
        ));

        let pump = spawn_inbound_pump(Arc::clone(&transport), 0, apply_tx.clone());

        stats.state = SessionState::Streaming;
        self.state_tx.send_replace(SessionState::Streaming);
        self.stats_tx.send_replace(stats.clone());

        let mut apply = ApplyLoop {
            config: self.config.clone(),
            connector: Arc::clone(&self.connector),
            source,
            assembler: TranscriptAssembler::new(),
            policy,
            logger,
            stats,
            transport,
            generation: 0,
            transport_tx,
            apply_rx,
            apply_tx,
            stop_rx: self.stop_tx.subscribe(),
            state_tx: Arc::clone(&self.state_tx),
            snapshot_tx: Arc::clone(&self.snapshot_tx),
            stats_tx: Arc::clone(&self.stats_tx),
            fatal: Arc::clone(&self.fatal),
            pump,
            reconnect_attempts: 0,
        };

        let handle = tokio::spawn(async move { apply.run().await });
        *self.apply_handle.lock().await = Some(handle);

        info!("Transcription session started: {}", self.config.session_id);

        Ok(())
    }

    /// Stop streaming cooperatively and seal the run.
    ///
    /// Flushes the under-size chunk, nudges the service for trailing
    /// commits, waits at most the configured grace, then seals. If the
    /// session already sealed itself after a fatal transport failure,
    /// the stored error is returned instead.
    pub async fn stop(&self) -> Result<RunStats, SessionError> {
        match self.state() {
            SessionState::Idle => {
                return Err(SessionError::InvalidState("session never started"))
            }
            SessionState::Sealed => {
                return self.sealed_outcome();
            }
            _ => {}
        }

        info!("Stopping transcription session: {}", self.config.session_id);
        let _ = self.stop_tx.send(true);

        let handle = self.apply_handle.lock().await.take();
        if let Some(task) = handle {
            if let Err(e) = task.await {
                error!("Apply loop task panicked: {}", e);
            }
        }

        self.sealed_outcome()
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Watch channel for lifecycle transitions, e.g. to await `Sealed`.
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state_tx.subscribe()
    }

    /// Latest transcript snapshot
    pub fn transcript(&self) -> TranscriptSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Latest session statistics
    pub fn stats(&self) -> RunStats {
        self.stats_tx.borrow().clone()
    }

    /// The fatal transport error, if the session died to one
    pub fn last_error(&self) -> Option<TransportError> {
        self.fatal.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Directory holding this run's record, once started
    pub fn run_dir(&self) -> Option<PathBuf> {
        self.run_dir.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn session_id(&self) -> &str {
        &self.config.session_id
    }

    fn sealed_outcome(&self) -> Result<RunStats, SessionError> {
        if let Some(e) = self.last_error() {
            return Err(SessionError::Transport(e));
        }
        Ok(self.stats())
    }

    fn log_start_event(&self, logger: &mut SessionRunLogger, at: DateTime<Utc>) {
        let event = RunEvent::SessionStarted {
            session_id: self.config.session_id.clone(),
        };
        if let Err(e) = logger.record(at, event) {
            error!("run log rejected session start event: {}", e);
        }
    }

    fn fail_start(
        &self,
        mut logger: SessionRunLogger,
        mut stats: RunStats,
        e: TransportError,
    ) -> Result<(), SessionError> {
        error!("Failed to start session {}: {}", self.config.session_id, e);

        let now = Utc::now();
        if let Err(log_err) = logger.record(
            now,
            RunEvent::TransportDown {
                detail: e.to_string(),
            },
        ) {
            error!("run log rejected transport event: {}", log_err);
        }

        stats.state = SessionState::Sealed;
        stats.duration_secs = seconds_since(stats.started_at, now);
        stats.degraded_durability = logger.degraded_durability();
        if let Err(seal_err) = logger.seal(
            now,
            StopReason::ConnectFailed,
            TranscriptSnapshot::default(),
            stats.clone(),
        ) {
            error!("failed to seal aborted run: {}", seal_err);
        }

        self.stats_tx.send_replace(stats);
        self.state_tx.send_replace(SessionState::Sealed);
        *self.fatal.lock().unwrap_or_else(|p| p.into_inner()) = Some(e.clone());

        Err(SessionError::Transport(e))
    }
}

/// Messages feeding the apply loop, the single writer of transcript and
/// run log.
enum ApplyMsg {
    /// Inbound service message
    Service(ServerMessage),
    /// Service closed the stream; tagged with the connection generation
    InboundClosed(u64),
    /// Inbound stream failed
    InboundFailed(u64, TransportError),
    /// A chunk send failed on the given connection generation
    SendFailed(u64, TransportError),
    /// Chunk accepted by the transport
    Sent(SentChunk),
    /// Chunk dropped to backpressure
    Dropped(u64),
    /// Capture timestamp discontinuity
    Gap(CaptureGap),
    /// Outbound flow finished: source exhausted or stop flush complete
    OutboundDone,
}

/// Outbound flow: capture frames through the scheduler to the transport.
///
/// On stop (or source exhaustion) the under-size tail chunk is flushed
/// and sent before `OutboundDone` is reported; sends stay bounded by the
/// scheduler's deadline, so stopping never hangs on a slow link.
async fn run_outbound(
    mut frames: mpsc::Receiver<AudioFrame>,
    mut scheduler: ChunkScheduler,
    transport_rx: watch::Receiver<(u64, Arc<dyn SttTransport>)>,
    apply_tx: mpsc::Sender<ApplyMsg>,
    mut stop_rx: watch::Receiver<bool>,
) {
    debug!("outbound flow started");

    loop {
        tokio::select! {
            maybe_frame = frames.recv() => {
                let Some(frame) = maybe_frame else {
                    debug!("audio source exhausted");
                    break;
                };

                if let Some(gap) = scheduler.enqueue(&frame) {
                    if apply_tx.send(ApplyMsg::Gap(gap)).await.is_err() {
                        return;
                    }
                }
                if scheduler.pending() > 0
                    && drain(&mut scheduler, &transport_rx, &apply_tx).await.is_err()
                {
                    return;
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }

    // Stop flush: close the under-size accumulator and push the tail out.
    scheduler.flush_partial();
    if scheduler.pending() > 0 {
        let _ = drain(&mut scheduler, &transport_rx, &apply_tx).await;
    }

    let _ = apply_tx.send(ApplyMsg::OutboundDone).await;
    debug!("outbound flow finished");
}

async fn drain(
    scheduler: &mut ChunkScheduler,
    transport_rx: &watch::Receiver<(u64, Arc<dyn SttTransport>)>,
    apply_tx: &mpsc::Sender<ApplyMsg>,
) -> Result<(), ()> {
    let (generation, transport) = transport_rx.borrow().clone();

    match scheduler.drain_into(transport.as_ref()).await {
        Ok(report) => {
            for sent in report.sent {
                if apply_tx.send(ApplyMsg::Sent(sent)).await.is_err() {
                    return Err(());
                }
            }
            for sequence in report.dropped {
                if apply_tx.send(ApplyMsg::Dropped(sequence)).await.is_err() {
                    return Err(());
                }
            }
            Ok(())
        }
        Err(e) => {
            // Chunk stays queued for retry once the transport is rebuilt.
            apply_tx
                .send(ApplyMsg::SendFailed(generation, e))
                .await
                .map_err(|_| ())
        }
    }
}

fn spawn_inbound_pump(
    transport: Arc<dyn SttTransport>,
    generation: u64,
    apply_tx: mpsc::Sender<ApplyMsg>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match transport.next_event().await {
                Ok(Some(msg)) => {
                    if apply_tx.send(ApplyMsg::Service(msg)).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    let _ = apply_tx.send(ApplyMsg::InboundClosed(generation)).await;
                    break;
                }
                Err(e) => {
                    let _ = apply_tx.send(ApplyMsg::InboundFailed(generation, e)).await;
                    break;
                }
            }
        }
    })
}

struct ApplyLoop {
    config: SessionConfig,
    connector: Arc<dyn SttConnector>,
    source: Box<dyn AudioChunkSource>,
    assembler: TranscriptAssembler,
    policy: Box<dyn SegmentationPolicy>,
    logger: SessionRunLogger,
    stats: RunStats,
    transport: Arc<dyn SttTransport>,
    generation: u64,
    transport_tx: watch::Sender<(u64, Arc<dyn SttTransport>)>,
    apply_rx: mpsc::Receiver<ApplyMsg>,
    apply_tx: mpsc::Sender<ApplyMsg>,
    stop_rx: watch::Receiver<bool>,
    state_tx: Arc<watch::Sender<SessionState>>,
    snapshot_tx: Arc<watch::Sender<TranscriptSnapshot>>,
    stats_tx: Arc<watch::Sender<RunStats>>,
    fatal: Arc<StdMutex<Option<TransportError>>>,
    pump: JoinHandle<()>,
    reconnect_attempts: u32,
}

/// How the apply loop ends.
enum LoopEnd {
    /// Cooperative stop: flush open segments, then seal
    Stopped,
    /// Transport gone for good: seal as-is, open segments preserved
    Fatal(TransportError),
}

impl ApplyLoop {
    async fn run(&mut self) {
        // Fixed-interval segmentation needs an open segment from the
        // first tick; VAD waits for the service to speak first.
        if let Some(id) = self.policy.initial_segment() {
            self.open_segment(id, EventOrigin::Forced);
            self.publish();
        }

        let started = Instant::now();
        let mut tick = tokio::time::interval(POLICY_TICK);
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        let mut stopping = false;
        let mut grace_deadline: Option<Instant> = None;

        let end = loop {
            let grace_at = grace_deadline;
            let grace = async move {
                match grace_at {
                    Some(d) => tokio::time::sleep_until(d).await,
                    None => std::future::pending().await,
                }
            };

            // Biased order implements the boundary tie-break: the stop
            // signal preempts, then the policy tick runs before service
            // events from the same step.
            tokio::select! {
                biased;

                changed = self.stop_rx.changed() => {
                    // A dropped sender means the session itself is gone;
                    // treat it like a stop request.
                    if (changed.is_err() || *self.stop_rx.borrow()) && !stopping {
                        stopping = true;
                        self.state_tx.send_replace(SessionState::Stopping);
                        self.stats.state = SessionState::Stopping;
                        info!("session stopping, draining trailing audio");
                    }
                    if changed.is_err() {
                        break LoopEnd::Stopped;
                    }
                }
                _ = grace => {
                    debug!("stop grace elapsed");
                    break LoopEnd::Stopped;
                }
                _ = tick.tick(), if !stopping => {
                    if let Some(fc) = self.policy.on_tick(started.elapsed()) {
                        self.handle_force_commit(fc).await;
                    }
                    self.publish();
                }
                msg = self.apply_rx.recv() => {
                    let Some(msg) = msg else {
                        break LoopEnd::Stopped;
                    };
                    match self.handle_msg(msg, stopping, &mut grace_deadline).await {
                        Flow::Continue => {}
                        Flow::BeginStopping => {
                            if !stopping {
                                stopping = true;
                                self.state_tx.send_replace(SessionState::Stopping);
                                self.stats.state = SessionState::Stopping;
                            }
                        }
                        Flow::Finish(end) => break end,
                    }
                    self.publish();
                }
            }
        };

        self.finalize(end).await;
    }

    async fn handle_msg(
        &mut self,
        msg: ApplyMsg,
        stopping: bool,
        grace_deadline: &mut Option<Instant>,
    ) -> Flow {
        match msg {
            ApplyMsg::Service(msg) => {
                self.handle_service_message(msg);
                Flow::Continue
            }
            ApplyMsg::Sent(sent) => {
                self.stats.chunks_sent += 1;
                self.stats.bytes_sent += sent.bytes as u64;
                self.log_event(RunEvent::ChunkSent {
                    sequence: sent.sequence,
                    bytes: sent.bytes,
                    duration_ms: sent.duration_ms,
                });
                Flow::Continue
            }
            ApplyMsg::Dropped(sequence) => {
                self.stats.chunks_dropped += 1;
                warn!("chunk {} dropped to backpressure", sequence);
                self.log_event(RunEvent::ChunkDropped { sequence });
                Flow::Continue
            }
            ApplyMsg::Gap(gap) => {
                self.stats.capture_gaps += 1;
                warn!(
                    "capture gap: expected {}ms, got {}ms",
                    gap.expected_ms, gap.actual_ms
                );
                self.log_event(RunEvent::CaptureGap {
                    expected_ms: gap.expected_ms,
                    actual_ms: gap.actual_ms,
                });
                Flow::Continue
            }
            ApplyMsg::OutboundDone => {
                // All audio is out (or dropped). Nudge the service for its
                // trailing commits and give it a bounded grace to answer.
                if let Err(e) = self.transport.signal_commit().await {
                    debug!("commit nudge failed: {}", e);
                }
                *grace_deadline = Some(Instant::now() + self.config.stop_grace);
                Flow::BeginStopping
            }
            ApplyMsg::InboundClosed(generation) => {
                if generation != self.generation {
                    return Flow::Continue;
                }
                if stopping {
                    debug!("service closed the stream during stop");
                    return Flow::Finish(LoopEnd::Stopped);
                }
                let e = TransportError::Closed("service closed the stream".to_string());
                self.handle_transport_failure(e, stopping).await
            }
            ApplyMsg::InboundFailed(generation, e) => {
                if generation != self.generation {
                    return Flow::Continue;
                }
                self.handle_transport_failure(e, stopping).await
            }
            ApplyMsg::SendFailed(generation, e) => {
                if generation != self.generation {
                    return Flow::Continue;
                }
                self.handle_transport_failure(e, stopping).await
            }
        }
    }

    fn handle_service_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Error { message } => {
                warn!("service reported error: {}", message);
                self.log_event(RunEvent::TransportDown { detail: message });
                return;
            }
            ServerMessage::Unknown => {
                debug!("skipping unknown service message");
                return;
            }
            _ => {}
        }

        self.stats.events_received += 1;
        let now = Utc::now();
        let Some(event) = msg.into_event(now) else {
            return;
        };

        if let Some(open) = self.policy.on_service_boundary(&event) {
            self.open_segment(open.segment_id, EventOrigin::Service);
        }

        let outcome = self.assembler.apply(&event);
        if outcome == ApplyOutcome::Stale {
            debug!("stale event for segment {}", event.segment_id());
        }
        self.log_event(RunEvent::Transcript {
            event,
            origin: EventOrigin::Service,
        });
    }

    async fn handle_force_commit(&mut self, fc: ForceCommit) {
        let now = Utc::now();

        if !self.assembler.transcript().contains(fc.segment_id) {
            self.open_segment(fc.segment_id, EventOrigin::Forced);
        }

        if !self.assembler.transcript().is_committed(fc.segment_id) {
            self.synthesize_commit(fc.segment_id, now);
        }

        self.open_segment(fc.next_segment_id, EventOrigin::Forced);

        // Tell the service so its next events target the new segment; a
        // failure here will surface through the send or receive path.
        if let Err(e) = self.transport.signal_commit().await {
            debug!("commit nudge failed: {}", e);
        }

        info!(
            "forced commit of segment {} at interval boundary",
            fc.segment_id
        );
    }

    /// Close one segment locally with whatever text it has accumulated.
    fn synthesize_commit(&mut self, id: SegmentId, now: DateTime<Utc>) {
        let (text, started_at) = match self.assembler.transcript().segment(id) {
            Some(seg) => (seg.text.clone(), seg.opened_at),
            None => (String::new(), now),
        };

        let event = TranscriptEvent::Committed {
            segment_id: id,
            text,
            started_at,
            committed_at: now,
        };
        self.assembler.apply(&event);
        self.stats.forced_commits += 1;
        self.log_event(RunEvent::Transcript {
            event,
            origin: EventOrigin::Forced,
        });
    }

    fn open_segment(&mut self, id: SegmentId, origin: EventOrigin) {
        // Replay rebuilds opened_at from the logged `at`, so the assembler
        // and the log line must see the same instant.
        let opened_at = Utc::now();
        self.assembler.open_segment(id, opened_at);
        if let Err(e) = self.logger.record(
            opened_at,
            RunEvent::SegmentOpened {
                segment_id: id,
                origin,
            },
        ) {
            error!("run log rejected event: {}", e);
        }
    }

    async fn handle_transport_failure(&mut self, e: TransportError, stopping: bool) -> Flow {
        warn!("transport failure: {}", e);
        self.log_event(RunEvent::TransportDown {
            detail: e.to_string(),
        });

        if stopping {
            // The caller already asked to stop; what is assembled is what
            // there is.
            return Flow::Finish(LoopEnd::Stopped);
        }

        while self.reconnect_attempts < self.config.max_reconnects {
            self.reconnect_attempts += 1;
            info!(
                "reconnecting to STT service (attempt {}/{})",
                self.reconnect_attempts, self.config.max_reconnects
            );
            tokio::time::sleep(RECONNECT_DELAY).await;

            if *self.stop_rx.borrow() {
                return Flow::Finish(LoopEnd::Stopped);
            }

            match tokio::time::timeout(CONNECT_TIMEOUT, self.connector.connect()).await {
                Ok(Ok(t)) => {
                    let transport: Arc<dyn SttTransport> = Arc::from(t);
                    self.generation += 1;
                    self.transport = Arc::clone(&transport);
                    let _ = self
                        .transport_tx
                        .send((self.generation, Arc::clone(&transport)));

                    self.pump.abort();
                    self.pump =
                        spawn_inbound_pump(transport, self.generation, self.apply_tx.clone());

                    self.stats.reconnects += 1;
                    info!("reconnected to STT service");
                    return Flow::Continue;
                }
                Ok(Err(retry_err)) => {
                    warn!("reconnect attempt failed: {}", retry_err);
                }
                Err(_) => {
                    warn!("reconnect attempt timed out");
                }
            }
        }

        error!("reconnect budget exhausted, sealing session");
        Flow::Finish(LoopEnd::Fatal(e))
    }

    async fn finalize(&mut self, end: LoopEnd) {
        let now = Utc::now();
        let reason = match &end {
            LoopEnd::Stopped => {
                // Stop flush: force-close whatever segments are still
                // open so the sealed transcript has no dangling state.
                let open = self.assembler.transcript().open_segment_ids();
                for id in open {
                    self.synthesize_commit(id, now);
                }
                StopReason::Requested
            }
            LoopEnd::Fatal(_) => {
                // Open segments stay uncommitted: the record shows
                // exactly how far the service got.
                StopReason::TransportExhausted
            }
        };

        self.pump.abort();
        if let Err(e) = self.transport.close().await {
            debug!("transport close failed: {}", e);
        }
        if let Err(e) = self.source.stop().await {
            warn!("audio source stop failed: {}", e);
        }

        self.stats.state = SessionState::Sealed;
        self.sync_stats(now);
        self.stats.degraded_durability = self.logger.degraded_durability();

        let snapshot = self.assembler.snapshot();
        match self
            .logger
            .seal(now, reason, snapshot.clone(), self.stats.clone())
        {
            Ok(record) => {
                info!(
                    "session {} sealed: {} segments, {} committed, {} events logged",
                    self.config.session_id,
                    snapshot.segments.len(),
                    snapshot.committed_count(),
                    record.events.len()
                );
            }
            Err(e) => error!("failed to seal run: {}", e),
        }

        if let LoopEnd::Fatal(e) = end {
            *self.fatal.lock().unwrap_or_else(|p| p.into_inner()) = Some(e);
        }

        self.snapshot_tx.send_replace(snapshot);
        self.stats_tx.send_replace(self.stats.clone());
        self.state_tx.send_replace(SessionState::Sealed);
    }

    fn log_event(&mut self, event: RunEvent) {
        if let Err(e) = self.logger.record(Utc::now(), event) {
            error!("run log rejected event: {}", e);
        }
    }

    fn sync_stats(&mut self, now: DateTime<Utc>) {
        let transcript = self.assembler.transcript();
        self.stats.segments_total = transcript.len() as u64;
        self.stats.segments_committed = transcript.committed_count() as u64;
        self.stats.stale_events = self.assembler.stale_events();
        self.stats.implicit_opens = self.assembler.implicit_opens();
        self.stats.duration_secs = seconds_since(self.stats.started_at, now);
        self.stats.degraded_durability = self.logger.degraded_durability();
    }

    fn publish(&mut self) {
        self.sync_stats(Utc::now());
        self.snapshot_tx.send_replace(self.assembler.snapshot());
        self.stats_tx.send_replace(self.stats.clone());
    }
}

enum Flow {
    Continue,
    BeginStopping,
    Finish(LoopEnd),
}

fn seconds_since(started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    now.signed_duration_since(started_at).num_milliseconds() as f64 / 1000.0
}
