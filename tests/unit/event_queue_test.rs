//! Randomised checks of the event queue under many merges

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use battery_os::core::{EventKind, EventQueue, ScheduleRequest};

const OWNERS: [&str; 3] = ["alpha", "beta", "gamma"];

fn random_request(rng: &mut StdRng, sequence: u64) -> (ScheduleRequest, &'static str) {
    let start = u128::from(rng.random_range(0..1_000u64));
    let len = u128::from(rng.random_range(1..400u64));
    let target = f64::from(rng.random_range(-500..=500i32));
    let owner = OWNERS[rng.random_range(0..OWNERS.len())];
    (ScheduleRequest::new(owner, sequence, target, start, start + len), owner)
}

fn assert_events_match_reservations(queue: &EventQueue) {
    let reservations = queue.reservations();
    for r in &reservations {
        let mine: Vec<_> = queue.events().filter(|e| e.sequence == r.sequence).collect();
        let count = |kind: EventKind| mine.iter().filter(|e| e.kind == kind).count();
        assert_eq!(count(EventKind::SetCurrentEnd), 1, "{r:?}");
        assert_eq!(count(EventKind::SetCurrentBegin), usize::from(!r.active), "{r:?}");
        assert_eq!(count(EventKind::Cancel), usize::from(r.cancel_at_ms.is_some()), "{r:?}");
        for e in mine {
            match e.kind {
                EventKind::SetCurrentBegin => assert_eq!(e.timepoint_ms, r.begin_ms),
                EventKind::SetCurrentEnd => assert_eq!(e.timepoint_ms, r.end_ms),
                EventKind::Cancel => assert_eq!(Some(e.timepoint_ms), r.cancel_at_ms),
                EventKind::Refresh => {}
            }
        }
        assert!(r.begin_ms < r.end_ms, "{r:?}");
    }
    for e in queue.events().filter(|e| e.kind != EventKind::Refresh) {
        assert!(
            reservations.iter().any(|r| r.sequence == e.sequence),
            "orphaned event {e:?}"
        );
    }
}

#[test]
fn test_random_merges_keep_queue_consistent() {
    for seed in 0..20u64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut queue = EventQueue::new();

        for sequence in 1..=60u64 {
            let (request, owner) = random_request(&mut rng, sequence);
            let outcome = queue.merge(&request, owner);
            assert_eq!(outcome.sequence, sequence);
            assert_events_match_reservations(&queue);

            // inside the new window the owner's planned level is the requested
            // target, except where a reservation is already winding down
            for t in [request.start_ms, (request.start_ms + request.end_ms) / 2, request.end_ms - 1] {
                let pending_cancel = queue
                    .reservations()
                    .iter()
                    .any(|r| r.owner == owner && r.cancel_at_ms.is_some() && r.covers(t));
                if pending_cancel {
                    continue;
                }
                let level = queue.level_at(t, |r| r.owner == owner);
                assert!(
                    (level - request.target_ma).abs() < 1e-6,
                    "seed {seed} seq {sequence}: level {level} at {t}, wanted {}",
                    request.target_ma
                );
            }
        }

        // draining reproduces the planned levels
        let planned = queue.clone();
        for t in (0..1_500u128).step_by(7) {
            queue.drain_due(t);
            assert_events_match_reservations(&queue);
            let expected = planned.level_at(t, |_| true);
            assert!(
                (queue.net_current() - expected).abs() < 1e-6,
                "seed {seed}: net {} at {t}, planned {expected}",
                queue.net_current()
            );
        }
        queue.drain_due(u128::MAX);
        assert!(queue.is_empty());
        assert_eq!(queue.net_current(), 0.0);
    }
}

#[test]
fn test_refresh_events_survive_merges() {
    let mut rng = StdRng::seed_from_u64(7);
    let mut queue = EventQueue::new();
    queue.push_refresh(500, 10_000);
    for sequence in 1..=20u64 {
        let (request, owner) = random_request(&mut rng, sequence);
        queue.merge(&request, owner);
    }
    assert!(queue.has_refresh());
    let drained = queue.drain_due(500);
    assert!(drained.refresh);
    assert!(!queue.has_refresh());
}
