use std::{collections::HashMap, time::Duration};

use anyhow::Result;
use delivery_engine::{
    error::DeliveryError,
    models::{
        delivery::{ChannelKind, FinalOutcome},
        nearby::{Candidate, NearbyEvent},
        notification::{Category, Priority},
    },
};
use tokio::time::Instant;

use crate::common::{CallLog, Harness, ScriptedChannel, assert_elapsed};

fn delivering_harness() -> Harness {
    let log = CallLog::default();
    Harness::new(
        log.clone(),
        ScriptedChannel::succeeding(ChannelKind::Push, &log),
        ScriptedChannel::succeeding(ChannelKind::Realtime, &log),
        ScriptedChannel::succeeding(ChannelKind::Sms, &log),
    )
}

fn ride_offer() -> NearbyEvent {
    NearbyEvent::new(
        "Ride nearby",
        "Passenger waiting at Central Station",
        Category::RideRequest,
    )
}

/// Test: Only the five nearest candidates are notified, whatever the input order
#[tokio::test(start_paused = true)]
async fn test_notifies_five_nearest_regardless_of_order() -> Result<()> {
    let distances = [
        ("d1", 0.2),
        ("d2", 0.6),
        ("d3", 1.1),
        ("d4", 1.7),
        ("d5", 2.4),
        ("d6", 3.3),
        ("d7", 5.0),
        ("d8", 8.5),
    ];

    let orders: [[usize; 8]; 3] = [
        [0, 1, 2, 3, 4, 5, 6, 7],
        [7, 6, 5, 4, 3, 2, 1, 0],
        [5, 0, 7, 3, 1, 6, 2, 4],
    ];

    for order in orders {
        let harness = delivering_harness();
        let candidates: Vec<Candidate> = order
            .iter()
            .map(|i| Candidate::new(distances[*i].0, distances[*i].1))
            .collect();

        let results = harness
            .engine
            .notify_nearby(candidates, &ride_offer())
            .await?;
        assert_eq!(results.len(), 5);
        assert!(
            results
                .iter()
                .all(|r| r.final_outcome == FinalOutcome::Delivered)
        );

        let by_request: HashMap<String, String> = harness
            .log
            .calls()
            .into_iter()
            .map(|call| (call.request_id, call.recipient_id))
            .collect();
        let recipients: Vec<&str> = results
            .iter()
            .map(|r| by_request[&r.request_id].as_str())
            .collect();
        assert_eq!(recipients, vec!["d1", "d2", "d3", "d4", "d5"]);
    }

    Ok(())
}

/// Test: Distance bands set priority and pacing applies beyond the urgent radius
#[tokio::test(start_paused = true)]
async fn test_priority_bands_and_pacing() -> Result<()> {
    let harness = delivering_harness();
    let candidates = vec![
        Candidate::new("F", 4.0),
        Candidate::new("C", 1.5),
        Candidate::new("A", 0.3),
        Candidate::new("E", 3.0),
        Candidate::new("B", 0.8),
        Candidate::new("D", 2.5),
    ];

    let start = Instant::now();
    let results = harness
        .engine
        .notify_nearby(candidates, &ride_offer())
        .await?;
    assert_eq!(results.len(), 5);

    let calls: HashMap<String, (Priority, Instant)> = harness
        .log
        .calls()
        .into_iter()
        .map(|call| (call.recipient_id, (call.priority, call.at)))
        .collect();

    assert!(!calls.contains_key("F"));

    let expected = [
        ("A", Priority::Urgent, 0),
        ("B", Priority::Urgent, 0),
        ("C", Priority::High, 200),
        ("D", Priority::Normal, 400),
        ("E", Priority::Normal, 600),
    ];
    for (recipient, priority, offset_ms) in expected {
        let (actual_priority, at) = calls[recipient];
        assert_eq!(actual_priority, priority, "priority for {}", recipient);
        assert_elapsed(at - start, Duration::from_millis(offset_ms));
    }

    Ok(())
}

/// Test: Invalid and duplicate candidates are filtered before selection
#[tokio::test(start_paused = true)]
async fn test_invalid_candidates_filtered() -> Result<()> {
    let harness = delivering_harness();
    let candidates = vec![
        Candidate::new("", 0.1),
        Candidate::new("ghost", f64::NAN),
        Candidate::new("behind", -0.5),
        Candidate::new("twice", 2.2),
        Candidate::new("twice", 0.4),
    ];

    let results = harness
        .engine
        .notify_nearby(candidates, &ride_offer())
        .await?;

    assert_eq!(results.len(), 1);
    let calls = harness.log.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].recipient_id, "twice");
    assert_eq!(calls[0].priority, Priority::Urgent);

    Ok(())
}

/// Test: An invalid event is rejected before any dispatch
#[tokio::test]
async fn test_invalid_event_rejected() -> Result<()> {
    let harness = delivering_harness();
    let mut event = ride_offer();
    event.message = String::new();

    let err = harness
        .engine
        .notify_nearby(vec![Candidate::new("A", 0.3)], &event)
        .await
        .unwrap_err();

    assert!(matches!(err, DeliveryError::Validation(_)));
    assert!(harness.log.calls().is_empty());

    Ok(())
}

/// Test: Empty candidate list yields no results
#[tokio::test]
async fn test_no_candidates() -> Result<()> {
    let harness = delivering_harness();

    let results = harness.engine.notify_nearby(Vec::new(), &ride_offer()).await?;
    assert!(results.is_empty());

    Ok(())
}
