// Integration tests for transcript timeline assembly
//
// These tests verify the per-segment state machine (open -> partials ->
// committed), the last-write-wins rule for partial text, and the discard
// semantics for events that arrive after their segment committed.

use chrono::{DateTime, TimeZone, Utc};
use scribe_live::transcript::{ApplyOutcome, TranscriptAssembler, TranscriptEvent};

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_756_000_000 + secs, 0).unwrap()
}

fn partial(id: u64, text: &str, secs: i64) -> TranscriptEvent {
    TranscriptEvent::Partial {
        segment_id: id,
        text: text.to_string(),
        received_at: at(secs),
    }
}

fn committed(id: u64, text: &str, secs: i64) -> TranscriptEvent {
    TranscriptEvent::Committed {
        segment_id: id,
        text: text.to_string(),
        started_at: at(secs - 1),
        committed_at: at(secs),
    }
}

#[test]
fn test_partial_text_is_last_write_wins() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));

    assert_eq!(assembler.apply(&partial(0, "hel", 1)), ApplyOutcome::Applied);
    assert_eq!(
        assembler.apply(&partial(0, "hello wor", 2)),
        ApplyOutcome::Applied
    );
    assert_eq!(
        assembler.apply(&partial(0, "hello world", 3)),
        ApplyOutcome::Applied
    );

    // Each partial replaces the previous one; nothing accumulates.
    let segment = assembler.transcript().segment(0).unwrap();
    assert_eq!(segment.text, "hello world");
    assert!(!segment.committed);
}

#[test]
fn test_commit_finalizes_segment_text() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));

    assembler.apply(&partial(0, "hello wrld", 1));
    assembler.apply(&committed(0, "hello world", 2));

    // The committed text supersedes the last partial, including the
    // service's final corrections.
    let segment = assembler.transcript().segment(0).unwrap();
    assert_eq!(segment.text, "hello world");
    assert!(segment.committed);
    assert_eq!(segment.committed_at, Some(at(2)));
}

#[test]
fn test_events_after_commit_are_discarded() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));
    assembler.apply(&committed(0, "final text", 1));

    // A late partial and a duplicate commit both arrive stale.
    assert_eq!(
        assembler.apply(&partial(0, "rewrite attempt", 2)),
        ApplyOutcome::Stale
    );
    assert_eq!(
        assembler.apply(&committed(0, "different final", 3)),
        ApplyOutcome::Stale
    );

    let segment = assembler.transcript().segment(0).unwrap();
    assert_eq!(segment.text, "final text", "Committed text must not change");
    assert_eq!(segment.committed_at, Some(at(1)));
    assert_eq!(assembler.stale_events(), 2);
}

#[test]
fn test_unknown_segment_opens_implicitly() {
    let mut assembler = TranscriptAssembler::new();

    // No open_segment call: the boundary signal outran the local record.
    assert_eq!(
        assembler.apply(&partial(5, "out of nowhere", 3)),
        ApplyOutcome::AppliedImplicitOpen
    );

    let segment = assembler.transcript().segment(5).unwrap();
    assert_eq!(segment.text, "out of nowhere");
    assert_eq!(segment.opened_at, at(3), "Implicit open uses the event time");
    assert_eq!(assembler.implicit_opens(), 1);
}

#[test]
fn test_commit_without_prior_open_is_applied() {
    let mut assembler = TranscriptAssembler::new();

    assert_eq!(
        assembler.apply(&committed(2, "straight to final", 4)),
        ApplyOutcome::AppliedImplicitOpen
    );

    let segment = assembler.transcript().segment(2).unwrap();
    assert!(segment.committed);
    assert_eq!(segment.text, "straight to final");
    assert_eq!(
        segment.opened_at,
        at(3),
        "Implicit open from a commit uses the segment start time"
    );
}

#[test]
fn test_out_of_order_commits_keep_segment_order() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));
    assembler.open_segment(1, at(5));

    assembler.apply(&partial(0, "first segment", 6));
    assembler.apply(&partial(1, "second segment", 7));

    // Segment 1 commits before segment 0; display order must not follow
    // commit time.
    assembler.apply(&committed(1, "second segment", 8));
    assembler.apply(&committed(0, "first segment", 9));

    let snapshot = assembler.snapshot();
    let ids: Vec<u64> = snapshot.segments.iter().map(|s| s.id).collect();
    assert_eq!(ids, vec![0, 1]);
    assert_eq!(snapshot.display_text(), "first segment second segment");
    assert_eq!(snapshot.committed_count(), 2);
}

#[test]
fn test_duplicate_open_keeps_original_timestamp() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));

    // The service and the local policy may both announce the boundary.
    assembler.open_segment(0, at(4));

    let segment = assembler.transcript().segment(0).unwrap();
    assert_eq!(segment.opened_at, at(0));
    assert_eq!(assembler.transcript().len(), 1);
}

#[test]
fn test_empty_stream_yields_empty_snapshot() {
    let assembler = TranscriptAssembler::new();

    let snapshot = assembler.snapshot();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.display_text(), "");
    assert_eq!(assembler.stale_events(), 0);
    assert_eq!(assembler.implicit_opens(), 0);
}

#[test]
fn test_display_text_skips_empty_segments() {
    let mut assembler = TranscriptAssembler::new();
    assembler.open_segment(0, at(0));
    assembler.open_segment(1, at(1));
    assembler.open_segment(2, at(2));

    // Segment 1 closes without the service ever producing text for it,
    // as happens when an interval boundary lands in silence.
    assembler.apply(&committed(0, "before the pause", 3));
    assembler.apply(&committed(1, "", 4));
    assembler.apply(&committed(2, "after the pause", 5));

    let snapshot = assembler.snapshot();
    assert_eq!(snapshot.segments.len(), 3, "Empty segment stays in the record");
    assert_eq!(snapshot.display_text(), "before the pause after the pause");
}
