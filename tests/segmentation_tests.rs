// Integration tests for segment boundary policies
//
// Two interchangeable policies decide where the continuous stream is cut
// into segments: voice-activity boundaries mirrored from the service, or
// a local fixed-interval timer. The same event stream produces different
// segment shapes depending on the policy in force.

use std::time::Duration;

use chrono::Utc;
use scribe_live::segmentation::{
    create_policy, FixedIntervalPolicy, ForceCommit, SegmentationMode, SegmentationPolicy,
    VoiceActivityPolicy,
};
use scribe_live::transcript::TranscriptEvent;

fn partial(id: u64, text: &str) -> TranscriptEvent {
    TranscriptEvent::Partial {
        segment_id: id,
        text: text.to_string(),
        received_at: Utc::now(),
    }
}

#[test]
fn test_fixed_interval_forces_commits_on_schedule() {
    let mut policy = FixedIntervalPolicy::new(Duration::from_secs(12));

    assert_eq!(policy.on_tick(Duration::from_secs(5)), None);
    assert_eq!(policy.on_tick(Duration::from_secs(11)), None);

    assert_eq!(
        policy.on_tick(Duration::from_secs(12)),
        Some(ForceCommit {
            segment_id: 0,
            next_segment_id: 1
        })
    );

    // The boundary fired; the next one is not due until 24s.
    assert_eq!(policy.on_tick(Duration::from_secs(13)), None);
    assert_eq!(
        policy.on_tick(Duration::from_secs(24)),
        Some(ForceCommit {
            segment_id: 1,
            next_segment_id: 2
        })
    );
}

#[test]
fn test_fixed_interval_over_thirty_seconds_yields_two_boundaries() {
    let mut policy = FixedIntervalPolicy::new(Duration::from_secs(12));

    // Tick every 250ms for 30 seconds, the way the session's apply loop
    // drives the policy.
    let mut commits = Vec::new();
    for tick in 1..=120 {
        if let Some(fc) = policy.on_tick(Duration::from_millis(tick * 250)) {
            commits.push(fc);
        }
    }

    // Boundaries at 12s and 24s; segment 2 is still open when the run
    // stops and gets closed by the stop flush, not by the timer.
    assert_eq!(commits.len(), 2);
    assert_eq!(commits[0].segment_id, 0);
    assert_eq!(commits[1].segment_id, 1);
    assert_eq!(commits[1].next_segment_id, 2);
}

#[test]
fn test_fixed_interval_ignores_service_boundaries() {
    let mut policy = FixedIntervalPolicy::new(Duration::from_secs(12));

    assert_eq!(policy.on_service_boundary(&partial(7, "ignored")), None);
    assert_eq!(policy.on_service_boundary(&partial(8, "ignored")), None);
}

#[test]
fn test_fixed_interval_owns_the_initial_segment() {
    let policy = FixedIntervalPolicy::new(Duration::from_secs(12));
    assert_eq!(policy.initial_segment(), Some(0));

    // VAD waits for the service: a silent run never opens a segment.
    let policy = VoiceActivityPolicy::new();
    assert_eq!(policy.initial_segment(), None);
}

#[test]
fn test_vad_opens_segment_on_first_reference() {
    let mut policy = VoiceActivityPolicy::new();

    let open = policy.on_service_boundary(&partial(0, "hello"));
    assert_eq!(open.map(|o| o.segment_id), Some(0));

    // Subsequent events for the same segment are not a new boundary.
    assert_eq!(policy.on_service_boundary(&partial(0, "hello world")), None);

    // The next segment id announces the next boundary.
    let open = policy.on_service_boundary(&partial(1, "and then"));
    assert_eq!(open.map(|o| o.segment_id), Some(1));

    // A stale reference to an earlier segment is not a boundary either.
    assert_eq!(policy.on_service_boundary(&partial(0, "late echo")), None);
}

#[test]
fn test_vad_never_forces_commits() {
    let mut policy = VoiceActivityPolicy::new();

    for secs in [1u64, 12, 24, 600] {
        assert_eq!(policy.on_tick(Duration::from_secs(secs)), None);
    }
}

#[test]
fn test_policy_factory_selects_mode() {
    let policy = create_policy(SegmentationMode::Vad, Duration::from_secs(12));
    assert_eq!(policy.mode(), SegmentationMode::Vad);

    let policy = create_policy(SegmentationMode::FixedInterval, Duration::from_secs(12));
    assert_eq!(policy.mode(), SegmentationMode::FixedInterval);
}
