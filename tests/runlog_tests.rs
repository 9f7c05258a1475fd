// Integration tests for the durable run log
//
// A session appends events.jsonl during the run and seals the directory
// with transcript.json and run.json. Replaying the event log through a
// fresh assembler must reproduce the sealed transcript exactly, and a
// sealed log must refuse further writes.

use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use chrono::Utc;
use scribe_live::runlog::{
    load_events, load_summary, load_transcript, replay_events, RunEvent, SessionRunLogger,
    StopReason,
};
use scribe_live::session::{RunStats, SessionConfig};
use scribe_live::transcript::{
    EventOrigin, TranscriptAssembler, TranscriptEvent, TranscriptSnapshot,
};
use scribe_live::SessionError;
use tempfile::TempDir;

fn test_config(runs_dir: PathBuf) -> SessionConfig {
    SessionConfig {
        session_id: "runlog-test".to_string(),
        runs_dir,
        ..Default::default()
    }
}

fn partial(id: u64, text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        segment_id: id,
        text: text.to_string(),
        received_at: Utc::now(),
    }
}

fn committed(id: u64, text: &str) -> TranscriptEvent {
    let now = Utc::now();
    TranscriptEvent::Committed {
        segment_id: id,
        text: text.to_string(),
        started_at: now,
        committed_at: now,
    }
}

#[test]
fn test_open_creates_run_directory_with_event_log() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let started_at = Utc::now();

    let logger = SessionRunLogger::open(started_at, test_config(temp_dir.path().to_path_buf()))?;

    // Verify: run directory under runs_dir, named by the run id
    let run_dir = logger.run_dir().clone();
    assert!(run_dir.starts_with(temp_dir.path()));
    assert!(run_dir.is_dir(), "Run directory should exist");
    assert!(
        run_dir.ends_with(logger.run_id().as_str()),
        "Directory should be named after the run id"
    );

    assert!(run_dir.join("events.jsonl").exists(), "Event log should exist");
    assert!(!logger.is_sealed());

    Ok(())
}

#[test]
fn test_events_flush_on_count_cadence() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut logger = SessionRunLogger::open(Utc::now(), test_config(temp_dir.path().to_path_buf()))?;
    let events_path = logger.run_dir().join("events.jsonl");

    // A handful of events stays staged: flushing is batched, not per event.
    for i in 0..3 {
        logger.record(Utc::now(), RunEvent::ChunkSent {
            sequence: i,
            bytes: 6400,
            duration_ms: 200,
        })?;
    }
    let early = fs::read_to_string(&events_path)?;
    assert!(
        early.lines().count() < 3,
        "Events should not hit disk one by one"
    );

    // Enough staged lines forces a flush mid-run.
    for i in 3..40 {
        logger.record(Utc::now(), RunEvent::ChunkSent {
            sequence: i,
            bytes: 6400,
            duration_ms: 200,
        })?;
    }
    let mid_run = fs::read_to_string(&events_path)?;
    assert!(
        mid_run.lines().count() >= 32,
        "Staged events should flush once the batch fills, got {} lines",
        mid_run.lines().count()
    );

    // Sealing flushes the remainder; every event plus the stop marker.
    logger.seal(
        Utc::now(),
        StopReason::Requested,
        TranscriptSnapshot::default(),
        RunStats::new(Utc::now()),
    )?;
    let sealed = fs::read_to_string(&events_path)?;
    assert_eq!(sealed.lines().count(), 41);

    Ok(())
}

#[test]
fn test_event_log_lines_are_ordered_tagged_json() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut logger = SessionRunLogger::open(Utc::now(), test_config(temp_dir.path().to_path_buf()))?;

    logger.record(Utc::now(), RunEvent::SessionStarted {
        session_id: "runlog-test".to_string(),
    })?;
    logger.record(Utc::now(), RunEvent::SegmentOpened {
        segment_id: 0,
        origin: EventOrigin::Service,
    })?;
    logger.record(Utc::now(), RunEvent::ChunkDropped { sequence: 4 })?;
    logger.seal(
        Utc::now(),
        StopReason::Requested,
        TranscriptSnapshot::default(),
        RunStats::new(Utc::now()),
    )?;

    let raw = fs::read_to_string(logger.run_dir().join("events.jsonl"))?;
    let lines: Vec<&str> = raw.lines().collect();
    assert_eq!(lines.len(), 4);

    assert!(lines[0].contains("\"kind\":\"session_started\""));
    assert!(lines[1].contains("\"kind\":\"segment_opened\""));
    assert!(lines[2].contains("\"kind\":\"chunk_dropped\""));
    assert!(
        lines[3].contains("\"kind\":\"session_stopped\""),
        "Stop marker must be the final line"
    );

    // Sequence numbers reflect apply order.
    let events = load_events(logger.run_dir())?;
    let seqs: Vec<u64> = events.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);

    Ok(())
}

#[test]
fn test_seal_writes_transcript_and_summary() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let started_at = Utc::now();
    let mut logger = SessionRunLogger::open(started_at, test_config(temp_dir.path().to_path_buf()))?;

    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, Utc::now());
    assembler.apply(&committed(0, "hello world"));

    let mut stats = RunStats::new(started_at);
    stats.segments_total = 1;
    stats.segments_committed = 1;

    logger.seal(Utc::now(), StopReason::Requested, assembler.snapshot(), stats)?;
    assert!(logger.is_sealed());

    // Verify: transcript.json holds the sealed snapshot
    let transcript = load_transcript(logger.run_dir())?;
    assert_eq!(transcript.segments.len(), 1);
    assert_eq!(transcript.display_text(), "hello world");

    // Verify: run.json carries the outcome
    let summary = load_summary(logger.run_dir())?;
    assert_eq!(summary.stop_reason, Some(StopReason::Requested));
    assert!(summary.sealed_at.is_some());
    assert_eq!(summary.stats.map(|s| s.segments_committed), Some(1));
    assert_eq!(summary.config.session_id, "runlog-test");

    Ok(())
}

#[test]
fn test_sealed_log_refuses_further_writes() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut logger = SessionRunLogger::open(Utc::now(), test_config(temp_dir.path().to_path_buf()))?;

    logger.seal(
        Utc::now(),
        StopReason::Requested,
        TranscriptSnapshot::default(),
        RunStats::new(Utc::now()),
    )?;

    let record_err = logger
        .record(Utc::now(), RunEvent::ChunkDropped { sequence: 0 })
        .unwrap_err();
    assert!(
        matches!(record_err, SessionError::InvalidState(_)),
        "Recording into a sealed log must fail, got {record_err:?}"
    );

    let seal_err = logger
        .seal(
            Utc::now(),
            StopReason::Requested,
            TranscriptSnapshot::default(),
            RunStats::new(Utc::now()),
        )
        .unwrap_err();
    assert!(
        matches!(seal_err, SessionError::InvalidState(_)),
        "Sealing twice must fail, got {seal_err:?}"
    );

    Ok(())
}

#[test]
fn test_replay_reproduces_sealed_transcript() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut logger = SessionRunLogger::open(Utc::now(), test_config(temp_dir.path().to_path_buf()))?;

    // Drive assembler and log in lockstep, the way the session does.
    let mut assembler = TranscriptAssembler::new();
    let drive = |logger: &mut SessionRunLogger,
                 assembler: &mut TranscriptAssembler,
                 event: TranscriptEvent|
     -> Result<()> {
        assembler.apply(&event);
        logger.record(Utc::now(), RunEvent::Transcript {
            event,
            origin: EventOrigin::Service,
        })?;
        Ok(())
    };

    let opened = Utc::now();
    assembler.open_segment(0, opened);
    logger.record(opened, RunEvent::SegmentOpened {
        segment_id: 0,
        origin: EventOrigin::Service,
    })?;
    drive(&mut logger, &mut assembler, partial(0, "first"))?;
    drive(&mut logger, &mut assembler, partial(0, "first thought"))?;
    drive(&mut logger, &mut assembler, committed(0, "first thought."))?;

    // A stale partial after the commit: discarded live, and the replay
    // must discard it the same way.
    drive(&mut logger, &mut assembler, partial(0, "too late"))?;

    let opened = Utc::now();
    assembler.open_segment(1, opened);
    logger.record(opened, RunEvent::SegmentOpened {
        segment_id: 1,
        origin: EventOrigin::Service,
    })?;
    drive(&mut logger, &mut assembler, partial(1, "second, unfinished"))?;

    logger.seal(
        Utc::now(),
        StopReason::Requested,
        assembler.snapshot(),
        RunStats::new(Utc::now()),
    )?;

    // Verify: replaying the log reproduces the sealed transcript exactly.
    let events = load_events(logger.run_dir())?;
    let replayed = replay_events(events.iter());
    let stored = load_transcript(logger.run_dir())?;

    assert_eq!(
        serde_json::to_value(&replayed)?,
        serde_json::to_value(&stored)?,
        "Replay must be deterministic"
    );
    assert_eq!(replayed.display_text(), "first thought. second, unfinished");
    assert_eq!(replayed.committed_count(), 1);

    Ok(())
}

#[test]
fn test_empty_run_replays_empty() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut logger = SessionRunLogger::open(Utc::now(), test_config(temp_dir.path().to_path_buf()))?;

    logger.seal(
        Utc::now(),
        StopReason::Requested,
        TranscriptSnapshot::default(),
        RunStats::new(Utc::now()),
    )?;

    let events = load_events(logger.run_dir())?;
    assert_eq!(events.len(), 1, "Only the stop marker is logged");

    let replayed = replay_events(events.iter());
    assert!(replayed.is_empty());
    assert_eq!(replayed.display_text(), "");

    Ok(())
}
