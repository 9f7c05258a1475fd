use std::fs;
use std::path::Path;

use crate::error::PersistenceError;
use crate::transcript::{TranscriptAssembler, TranscriptSnapshot};

use super::record::{LoggedEvent, RunEvent, RunSummary};

/// Rebuild the transcript by re-driving a run log through a fresh
/// assembler.
///
/// Only `SegmentOpened` and `Transcript` entries shape the timeline; the
/// rest of the vocabulary is audit trail. Replaying a sealed log must
/// reproduce the sealed transcript exactly, which is what makes offline
/// policy comparison trustworthy.
pub fn replay_events<'a, I>(events: I) -> TranscriptSnapshot
where
    I: IntoIterator<Item = &'a LoggedEvent>,
{
    let mut assembler = TranscriptAssembler::new();

    for logged in events {
        match &logged.event {
            RunEvent::SegmentOpened { segment_id, .. } => {
                assembler.open_segment(*segment_id, logged.at);
            }
            RunEvent::Transcript { event, .. } => {
                let _ = assembler.apply(event);
            }
            _ => {}
        }
    }

    assembler.snapshot()
}

/// Load the event log from a run directory.
pub fn load_events(run_dir: &Path) -> Result<Vec<LoggedEvent>, PersistenceError> {
    let path = run_dir.join("events.jsonl");
    let raw = fs::read_to_string(&path).map_err(|source| PersistenceError::Read {
        path: path.clone(),
        source,
    })?;

    let mut events = Vec::new();
    for line in raw.lines() {
        if line.trim().is_empty() {
            continue;
        }
        events.push(serde_json::from_str(line)?);
    }

    Ok(events)
}

/// Load the sealed summary (`run.json`) from a run directory.
pub fn load_summary(run_dir: &Path) -> Result<RunSummary, PersistenceError> {
    let path = run_dir.join("run.json");
    let raw = fs::read_to_string(&path).map_err(|source| PersistenceError::Read {
        path: path.clone(),
        source,
    })?;

    Ok(serde_json::from_str(&raw)?)
}

/// Load the sealed transcript (`transcript.json`) from a run directory.
pub fn load_transcript(run_dir: &Path) -> Result<TranscriptSnapshot, PersistenceError> {
    let path = run_dir.join("transcript.json");
    let raw = fs::read_to_string(&path).map_err(|source| PersistenceError::Read {
        path: path.clone(),
        source,
    })?;

    Ok(serde_json::from_str(&raw)?)
}
