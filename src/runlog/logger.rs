use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{PersistenceError, SessionError};
use crate::session::{RunStats, SessionConfig};
use crate::transcript::TranscriptSnapshot;

use super::record::{LoggedEvent, RunEvent, RunId, RunRecord, StopReason};

/// Flush when this many lines are staged
const FLUSH_MAX_STAGED: usize = 32;
/// Flush when the oldest staged line is this old
const FLUSH_MAX_AGE: Duration = Duration::from_millis(500);
/// Consecutive flush failures before durability counts as degraded
const DEGRADE_AFTER_FAILURES: u32 = 3;
/// Upper bound on disk-pending lines while writes are failing; the
/// in-memory record keeps everything regardless
const STAGED_CAP: usize = 4096;

/// Durable, replayable log of one session run.
///
/// Every event lands in the in-memory `RunRecord` immediately and is
/// staged as a JSON line for `events.jsonl`. Staged lines flush on a
/// bounded cadence rather than per event, so a crash loses at most a
/// flush window. Sealing writes `transcript.json` and `run.json` next to
/// the event log and closes the record for good: recording into a sealed
/// log is a caller bug and fails `InvalidState`.
///
/// Disk trouble never halts transcription. Failed flushes retry on the
/// next cadence point; after a few consecutive failures the logger marks
/// durability degraded and carries on in memory.
pub struct SessionRunLogger {
    record: RunRecord,
    run_dir: PathBuf,
    events_path: PathBuf,
    events_file: Option<File>,
    staged: Vec<String>,
    last_flush: Instant,
    next_seq: u64,
    consecutive_failures: u32,
    degraded: bool,
}

impl SessionRunLogger {
    /// Create the run directory and open the event log.
    pub fn open(
        started_at: DateTime<Utc>,
        config: SessionConfig,
    ) -> Result<Self, PersistenceError> {
        let run_id = RunId::generate(started_at);
        let run_dir = config.runs_dir.join(run_id.as_str());

        fs::create_dir_all(&run_dir).map_err(|source| PersistenceError::CreateDir {
            path: run_dir.clone(),
            source,
        })?;

        let events_path = run_dir.join("events.jsonl");
        let events_file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&events_path)
            .map_err(|source| PersistenceError::Write {
                path: events_path.clone(),
                source,
            })?;

        info!(run_id = %run_id, dir = %run_dir.display(), "run log opened");

        Ok(Self {
            record: RunRecord::new(run_id, started_at, config),
            run_dir,
            events_path,
            events_file: Some(events_file),
            staged: Vec::new(),
            last_flush: Instant::now(),
            next_seq: 0,
            consecutive_failures: 0,
            degraded: false,
        })
    }

    pub fn run_id(&self) -> &RunId {
        &self.record.run_id
    }

    pub fn run_dir(&self) -> &PathBuf {
        &self.run_dir
    }

    pub fn run_record(&self) -> &RunRecord {
        &self.record
    }

    pub fn is_sealed(&self) -> bool {
        self.record.is_sealed()
    }

    /// True once run-log writes have failed enough times in a row that
    /// the on-disk log can no longer be trusted to be complete.
    pub fn degraded_durability(&self) -> bool {
        self.degraded
    }

    /// Append one event to the record and stage its JSON line.
    pub fn record(&mut self, at: DateTime<Utc>, event: RunEvent) -> Result<(), SessionError> {
        if self.record.is_sealed() {
            return Err(SessionError::InvalidState("record on a sealed run log"));
        }

        self.append(at, event)?;

        if self.staged.len() >= FLUSH_MAX_STAGED || self.last_flush.elapsed() >= FLUSH_MAX_AGE {
            self.flush_staged();
        }

        Ok(())
    }

    /// Seal the run: final flush, `transcript.json`, `run.json`. Exactly
    /// once; the record is immutable afterwards.
    pub fn seal(
        &mut self,
        at: DateTime<Utc>,
        reason: StopReason,
        transcript: TranscriptSnapshot,
        stats: RunStats,
    ) -> Result<&RunRecord, SessionError> {
        if self.record.is_sealed() {
            return Err(SessionError::InvalidState("seal on a sealed run log"));
        }

        self.append(at, RunEvent::SessionStopped { reason })?;
        self.flush_staged();

        if let Err(e) = self.write_json("transcript.json", &transcript) {
            warn!("failed to write transcript.json: {e}");
            self.degraded = true;
        }

        let mut stats = stats;
        stats.degraded_durability |= self.degraded;

        self.record.transcript = Some(transcript);
        self.record.stats = Some(stats);
        self.record.stop_reason = Some(reason);
        self.record.sealed_at = Some(at);

        if let Err(e) = self.write_json("run.json", &self.record.summary()) {
            warn!("failed to write run.json: {e}");
            self.degraded = true;
        }

        info!(
            run_id = %self.record.run_id,
            reason = ?reason,
            events = self.record.events.len(),
            "run sealed"
        );

        Ok(&self.record)
    }

    fn append(&mut self, at: DateTime<Utc>, event: RunEvent) -> Result<(), SessionError> {
        let logged = LoggedEvent {
            seq: self.next_seq,
            at,
            event,
        };
        self.next_seq += 1;

        let line = serde_json::to_string(&logged).map_err(PersistenceError::Encode)?;
        self.record.events.push(logged);

        if self.staged.len() >= STAGED_CAP {
            self.staged.remove(0);
        }
        self.staged.push(line);

        Ok(())
    }

    fn flush_staged(&mut self) {
        if self.staged.is_empty() {
            self.last_flush = Instant::now();
            return;
        }

        if self.events_file.is_none() {
            match OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.events_path)
            {
                Ok(f) => self.events_file = Some(f),
                Err(e) => {
                    self.note_flush_failure(&e);
                    return;
                }
            }
        }

        let mut buf = String::new();
        for line in &self.staged {
            buf.push_str(line);
            buf.push('\n');
        }

        let Some(file) = self.events_file.as_mut() else {
            return;
        };
        match file.write_all(buf.as_bytes()).and_then(|_| file.flush()) {
            Ok(()) => {
                debug!(lines = self.staged.len(), "run log flushed");
                self.staged.clear();
                self.consecutive_failures = 0;
                self.last_flush = Instant::now();
            }
            Err(e) => {
                self.events_file = None;
                self.note_flush_failure(&e);
            }
        }
    }

    fn note_flush_failure(&mut self, e: &std::io::Error) {
        self.consecutive_failures += 1;
        self.last_flush = Instant::now();

        if self.consecutive_failures >= DEGRADE_AFTER_FAILURES && !self.degraded {
            self.degraded = true;
            warn!(
                path = %self.events_path.display(),
                "run log writes keep failing ({e}), continuing with in-memory record only"
            );
        } else {
            warn!(path = %self.events_path.display(), "run log flush failed: {e}");
        }
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<(), PersistenceError> {
        let path = self.run_dir.join(name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json).map_err(|source| PersistenceError::Write { path, source })
    }
}
