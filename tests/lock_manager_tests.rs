//! Mutual-exclusion and lease-expiry properties of the lock manager.

use ringmaster::LockManager;
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn unexpired_lease_excludes_a_second_holder() {
    let dir = TempDir::new().unwrap();
    let locks = LockManager::new(dir.path());

    assert!(locks
        .acquire("git_workflow", "coordinator", Duration::from_secs(10))
        .await
        .unwrap());

    // Second holder's poll deadline elapses before the lease does.
    assert!(!locks
        .acquire("git_workflow", "intruder", Duration::from_millis(300))
        .await
        .unwrap());

    let lease = locks.current_lease("git_workflow").await.unwrap();
    assert_eq!(lease.holder, "coordinator");
}

#[tokio::test]
async fn expired_lease_is_reclaimed_and_stale_release_fails() {
    let dir = TempDir::new().unwrap();
    let locks = LockManager::new(dir.path());

    assert!(locks
        .acquire("shared", "first", Duration::from_millis(200))
        .await
        .unwrap());
    tokio::time::sleep(Duration::from_millis(400)).await;

    // Lease lifetime has passed; a different holder takes over.
    assert!(locks
        .acquire("shared", "second", Duration::from_secs(5))
        .await
        .unwrap());

    // The original holder's late release must not disturb the new lease.
    assert!(!locks.release("shared", "first").await.unwrap());
    let lease = locks.current_lease("shared").await.unwrap();
    assert_eq!(lease.holder, "second");
}

#[tokio::test]
async fn release_by_holder_frees_the_resource() {
    let dir = TempDir::new().unwrap();
    let locks = LockManager::new(dir.path());

    assert!(locks
        .acquire("shared", "holder", Duration::from_secs(10))
        .await
        .unwrap());
    assert!(locks.release("shared", "holder").await.unwrap());
    assert!(locks.current_lease("shared").await.is_none());

    // Freed immediately; no expiry wait needed.
    assert!(locks
        .acquire("shared", "next", Duration::from_millis(200))
        .await
        .unwrap());
}

#[tokio::test]
async fn concurrent_acquirers_on_a_fresh_resource_admit_one_holder() {
    let dir = TempDir::new().unwrap();
    let locks = LockManager::new(dir.path());

    let first = {
        let locks = locks.clone();
        tokio::spawn(
            async move { locks.acquire("shared", "alpha", Duration::from_secs(10)).await },
        )
    };
    let second = {
        let locks = locks.clone();
        tokio::spawn(
            async move { locks.acquire("shared", "beta", Duration::from_secs(10)).await },
        )
    };

    tokio::time::sleep(Duration::from_millis(400)).await;

    // Exactly one acquisition went through; the other is still polling
    // against an unexpired lease instead of clobbering it.
    let finished = [first.is_finished(), second.is_finished()];
    assert_eq!(finished.iter().filter(|done| **done).count(), 1);

    let lease = locks.current_lease("shared").await.unwrap();
    let expected_holder = if finished[0] { "alpha" } else { "beta" };
    assert_eq!(lease.holder, expected_holder);

    let (winner, loser) = if finished[0] {
        (first, second)
    } else {
        (second, first)
    };
    assert!(winner.await.unwrap().unwrap());
    loser.abort();
}

#[tokio::test]
async fn corrupted_lease_is_treated_as_expired() {
    let dir = TempDir::new().unwrap();
    let locks = LockManager::new(dir.path());

    tokio::fs::write(dir.path().join("shared.lock"), "not a lease")
        .await
        .unwrap();

    assert!(locks
        .acquire("shared", "holder", Duration::from_secs(2))
        .await
        .unwrap());
    let lease = locks.current_lease("shared").await.unwrap();
    assert_eq!(lease.holder, "holder");
}
