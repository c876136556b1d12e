//! Durability and at-most-once properties of the event ledger.

use ringmaster::{EventKind, EventLedger};
use std::collections::BTreeMap;
use tempfile::TempDir;

#[tokio::test]
async fn drain_returns_events_in_append_order() {
    let dir = TempDir::new().unwrap();
    let mut ledger = EventLedger::open(dir.path()).await.unwrap();

    ledger
        .append("a", EventKind::AgentStarted, BTreeMap::new())
        .await
        .unwrap();
    ledger
        .append("a", EventKind::AgentCompleted, BTreeMap::new())
        .await
        .unwrap();
    ledger
        .append("b", EventKind::AgentStarted, BTreeMap::new())
        .await
        .unwrap();

    let drained = ledger.drain_unprocessed();
    assert_eq!(drained.len(), 3);
    assert_eq!(drained[0].kind, EventKind::AgentStarted);
    assert_eq!(drained[0].agent_id, "a");
    assert_eq!(drained[1].kind, EventKind::AgentCompleted);
    assert_eq!(drained[2].agent_id, "b");
}

#[tokio::test]
async fn mark_processed_is_at_most_once() {
    let dir = TempDir::new().unwrap();
    let mut ledger = EventLedger::open(dir.path()).await.unwrap();

    let id = ledger
        .append("a", EventKind::AgentStarted, BTreeMap::new())
        .await
        .unwrap();
    assert_eq!(ledger.drain_unprocessed().len(), 1);

    ledger.mark_processed(&id).await.unwrap();
    assert!(ledger.drain_unprocessed().is_empty());

    // Marking again is a no-op, and a reopened ledger agrees.
    ledger.mark_processed(&id).await.unwrap();
    let reopened = EventLedger::open(dir.path()).await.unwrap();
    assert!(reopened.drain_unprocessed().is_empty());
}

#[tokio::test]
async fn unprocessed_events_survive_a_restart() {
    let dir = TempDir::new().unwrap();
    let id = {
        let mut ledger = EventLedger::open(dir.path()).await.unwrap();
        ledger
            .append(
                "a",
                EventKind::AgentFailed,
                BTreeMap::from([("error".to_string(), "exit code 1".to_string())]),
            )
            .await
            .unwrap()
    };

    let reopened = EventLedger::open(dir.path()).await.unwrap();
    let drained = reopened.drain_unprocessed();
    assert_eq!(drained.len(), 1);
    assert_eq!(drained[0].event_id, id);
    assert_eq!(drained[0].payload.get("error").unwrap(), "exit code 1");
}

#[tokio::test]
async fn event_ids_are_collision_resistant() {
    let dir = TempDir::new().unwrap();
    let mut ledger = EventLedger::open(dir.path()).await.unwrap();

    let mut ids = std::collections::BTreeSet::new();
    for _ in 0..100 {
        let id = ledger
            .append("a", EventKind::SyncRequest, BTreeMap::new())
            .await
            .unwrap();
        ids.insert(id);
    }
    assert_eq!(ids.len(), 100);
}

#[tokio::test]
async fn foreign_event_kind_round_trips_from_disk() {
    let dir = TempDir::new().unwrap();
    {
        let mut ledger = EventLedger::open(dir.path()).await.unwrap();
        ledger
            .append("a", EventKind::AgentStarted, BTreeMap::new())
            .await
            .unwrap();
    }

    // A foreign tool wrote an event with a kind this build does not know.
    let foreign = serde_json::json!({
        "event_id": "00000000deadbeef",
        "timestamp": "2026-01-01T00:00:00Z",
        "agent_id": "external",
        "kind": "mystery_event",
        "payload": {},
        "processed": false
    });
    tokio::fs::write(
        dir.path().join("00000000deadbeef.json"),
        serde_json::to_string_pretty(&foreign).unwrap(),
    )
    .await
    .unwrap();

    let ledger = EventLedger::open(dir.path()).await.unwrap();
    let drained = ledger.drain_unprocessed();
    assert_eq!(drained.len(), 2);
    assert!(drained
        .iter()
        .any(|e| e.kind == EventKind::Unknown("mystery_event".to_string())));
}
