//! Ordering tests for the activity queues.
//!
//! These tests pin the (time, priority, id) total order of the time
//! vortex and the (time, id) order of polling queues, including the
//! tie-break scenarios the scheduler's determinism depends on.

use maelstrom::activity::{Activity, Event};
use maelstrom::queue::{ActivityQueue, PollingLinkQueue, TimeVortex};
use maelstrom::types::{ActivityId, Priority, SimTime};

fn event_at(time: SimTime, id: ActivityId, priority: Priority) -> Activity {
    Activity::event(time, id, Event::new(serde_json::json!({ "id": id }))).with_priority(priority)
}

#[test]
fn test_equal_time_tie_break() {
    // Three events at t=10: (pri=5, id=A), (pri=3, id=B), (pri=5, id=C)
    // with A before C in id order. Pop order must be B, A, C.
    let a = event_at(10, 100, 5);
    let b = event_at(10, 101, 3);
    let c = event_at(10, 102, 5);

    let mut vortex = TimeVortex::new();
    vortex.insert(a);
    vortex.insert(b);
    vortex.insert(c);

    let order: Vec<ActivityId> = std::iter::from_fn(|| vortex.pop()).map(|x| x.id).collect();
    assert_eq!(order, vec![101, 100, 102]);
}

#[test]
fn test_pop_sequence_is_non_decreasing() {
    // Interleave inserts and pops; every popped key must be >= its
    // predecessor regardless of insert order.
    let mut vortex = TimeVortex::new();
    let times = [90u64, 10, 50, 50, 10, 70, 30, 30, 30, 5];
    let priorities = [0, 25, 0, 40, 0, 0, 25, 0, 40, 0];

    for (i, (&t, &p)) in times.iter().zip(priorities.iter()).enumerate() {
        vortex.insert(event_at(t, i as ActivityId, p));
    }
    // Drain half, then add more
    let mut popped = Vec::new();
    for _ in 0..5 {
        popped.push(vortex.pop().unwrap());
    }
    let floor = popped.last().unwrap().time;
    for (i, &t) in [floor + 1, floor + 20, floor + 3].iter().enumerate() {
        vortex.insert(event_at(t, 1000 + i as ActivityId, 0));
    }
    while let Some(a) = vortex.pop() {
        popped.push(a);
    }

    for pair in popped.windows(2) {
        assert!(
            pair[0].order_key() <= pair[1].order_key(),
            "pop order regressed: {:?} then {:?}",
            pair[0].order_key(),
            pair[1].order_key()
        );
    }
}

#[test]
fn test_deterministic_replay() {
    // The same insert stream always produces the same pop stream.
    let inserts: Vec<Activity> = (0..200)
        .map(|i| event_at((i * 37) % 97, i, ((i * 13) % 5) as Priority))
        .collect();

    let run = |activities: &[Activity]| -> Vec<ActivityId> {
        let mut vortex = TimeVortex::new();
        for a in activities {
            vortex.insert(a.clone());
        }
        std::iter::from_fn(|| vortex.pop()).map(|a| a.id).collect()
    };

    assert_eq!(run(&inserts), run(&inserts));
}

#[test]
fn test_front_matches_next_pop() {
    let mut vortex = TimeVortex::new();
    vortex.insert(event_at(30, 0, 0));
    vortex.insert(event_at(10, 1, 0));
    vortex.insert(event_at(20, 2, 0));

    while let Some(front_id) = vortex.front().map(|a| a.id) {
        let popped = vortex.pop().unwrap();
        assert_eq!(popped.id, front_id);
    }
    assert!(vortex.is_empty());
}

#[test]
fn test_polling_queue_orders_by_time_then_id_only() {
    let mut queue = PollingLinkQueue::new();
    queue.insert(event_at(20, 3, 0));
    queue.insert(event_at(10, 7, 99)); // high priority value is irrelevant
    queue.insert(event_at(10, 2, 50));

    let order: Vec<ActivityId> = std::iter::from_fn(|| queue.pop()).map(|a| a.id).collect();
    assert_eq!(order, vec![2, 7, 3]);
}

#[test]
fn test_polling_drain_is_inclusive_and_ordered() {
    let mut queue = PollingLinkQueue::new();
    for (t, id) in [(30u64, 0u64), (10, 1), (25, 2), (26, 3)] {
        queue.insert(event_at(t, id, 0));
    }

    let ready = queue.drain_ready(25);
    let times: Vec<SimTime> = ready.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![10, 25]);

    // The rest stays queued for a later drain
    assert_eq!(queue.len(), 2);
    let rest = queue.drain_ready(100);
    let times: Vec<SimTime> = rest.iter().map(|(t, _)| *t).collect();
    assert_eq!(times, vec![26, 30]);
}
