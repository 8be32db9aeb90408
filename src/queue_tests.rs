// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `queue.rs`

use crate::queue::{EventQueue, ExponentialBackoff};
use std::time::Duration;
use tokio::time::timeout;

#[test]
fn test_backoff_grows_exponentially_and_caps() {
    let backoff = ExponentialBackoff {
        base: Duration::from_millis(100),
        max: Duration::from_secs(1),
    };

    assert_eq!(backoff.delay(0), Duration::from_millis(100));
    assert_eq!(backoff.delay(1), Duration::from_millis(200));
    assert_eq!(backoff.delay(3), Duration::from_millis(800));
    assert_eq!(backoff.delay(4), Duration::from_secs(1));
    assert_eq!(backoff.delay(64), Duration::from_secs(1));
}

#[test]
fn test_default_backoff_configuration() {
    let backoff = ExponentialBackoff::default();
    assert_eq!(backoff.base, Duration::from_millis(500));
    assert_eq!(backoff.max, Duration::from_secs(300));
}

async fn next<T: Clone + Send + 'static>(queue: &EventQueue<T>) -> Option<T> {
    let entry = queue.get().await?;
    queue.done(&entry);
    Some(entry.into_inner())
}

#[tokio::test]
async fn test_items_are_handed_out_in_order() {
    let queue = EventQueue::new();
    queue.add("a");
    queue.add("b");
    queue.add("c");

    assert_eq!(next(&queue).await, Some("a"));
    assert_eq!(next(&queue).await, Some("b"));
    assert_eq!(next(&queue).await, Some("c"));
}

#[tokio::test]
async fn test_equal_items_stay_distinct_entries() {
    let queue = EventQueue::new();
    queue.add("export");
    queue.add("unexport");
    queue.add("export");

    assert_eq!(queue.len(), 3);
    assert_eq!(next(&queue).await, Some("export"));
    assert_eq!(next(&queue).await, Some("unexport"));
    assert_eq!(next(&queue).await, Some("export"));
}

#[tokio::test]
async fn test_sequence_follows_add_order() {
    let queue = EventQueue::new();
    queue.add("a");
    queue.add("a");

    let first = queue.get().await.unwrap();
    let second = queue.get().await.unwrap();
    assert!(first.seq() < second.seq());
    assert_ne!(first, second);
}

#[tokio::test(start_paused = true)]
async fn test_retry_keeps_entry_identity() {
    let queue = EventQueue::with_backoff(ExponentialBackoff {
        base: Duration::from_millis(100),
        max: Duration::from_secs(10),
    });
    queue.add("a");
    let entry = queue.get().await.unwrap();

    queue.add_rate_limited(entry.clone());
    queue.done(&entry);
    assert_eq!(queue.num_requeues(&entry), 1);
    assert!(queue.is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    let retried = queue.get().await.unwrap();
    assert_eq!(retried.seq(), entry.seq());
    assert_eq!(queue.num_requeues(&retried), 1);
    queue.done(&retried);

    queue.add_rate_limited(retried.clone());
    assert_eq!(queue.num_requeues(&retried), 2);
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert!(queue.is_empty(), "second retry waits 200ms");
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(queue.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_retry_of_in_flight_entry_is_parked_until_done() {
    let queue = EventQueue::with_backoff(ExponentialBackoff {
        base: Duration::from_millis(1),
        max: Duration::from_millis(1),
    });
    queue.add("a");
    let entry = queue.get().await.unwrap();

    queue.add_rate_limited(entry.clone());
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(queue.is_empty(), "retry must wait for done");

    queue.done(&entry);
    assert_eq!(queue.len(), 1);
    assert_eq!(next(&queue).await, Some("a"));
}

#[tokio::test]
async fn test_get_waits_for_producer() {
    let queue = EventQueue::new();
    let producer = queue.clone();

    let handle = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(10)).await;
        producer.add(7_u32);
    });

    let entry = timeout(Duration::from_secs(1), queue.get()).await.unwrap();
    assert_eq!(entry.map(|e| e.into_inner()), Some(7));
    handle.await.unwrap();
}

#[tokio::test]
async fn test_forget_resets_failures() {
    let queue = EventQueue::new();
    queue.add("a");
    let entry = queue.get().await.unwrap();
    queue.add_rate_limited(entry.clone());
    queue.add_rate_limited(entry.clone());
    assert_eq!(queue.num_requeues(&entry), 2);

    queue.forget(&entry);
    assert_eq!(queue.num_requeues(&entry), 0);
}

#[tokio::test(start_paused = true)]
async fn test_clear_discards_waiting_entries_and_scheduled_retries() {
    let queue = EventQueue::with_backoff(ExponentialBackoff {
        base: Duration::from_millis(50),
        max: Duration::from_millis(50),
    });
    queue.add("retry");
    let failed = queue.get().await.unwrap();
    queue.add_rate_limited(failed.clone());
    queue.done(&failed);
    queue.add("b");
    queue.add("c");

    assert_eq!(queue.clear(), 2);
    assert!(queue.is_empty());
    assert_eq!(queue.num_requeues(&failed), 0);

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(queue.is_empty(), "retry scheduled before clear must not come back");

    assert!(queue.add("d"), "queue keeps accepting after clear");
    assert_eq!(next(&queue).await, Some("d"));
}

#[tokio::test]
async fn test_shutdown_rejects_new_items_but_hands_out_queued_ones() {
    let queue = EventQueue::new();
    queue.add("a");
    queue.shut_down();

    assert!(queue.is_shutting_down());
    assert!(!queue.add("b"));
    assert_eq!(next(&queue).await, Some("a"));
    assert_eq!(next(&queue).await, None);
}

#[tokio::test]
async fn test_shutdown_wakes_idle_consumer() {
    let queue = EventQueue::<u32>::new();
    let consumer = queue.clone();
    let handle = tokio::spawn(async move { consumer.get().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    queue.shut_down();

    let result = timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    assert!(result.is_none());
}

#[tokio::test]
async fn test_drain_waits_for_in_flight_items() {
    let queue = EventQueue::new();
    queue.add("a");
    queue.add("b");
    let first = queue.get().await.unwrap();

    let draining = queue.clone();
    let drain = tokio::spawn(async move { draining.shut_down_with_drain().await });

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(!drain.is_finished(), "drain must wait for queued and in-flight items");

    queue.done(&first);
    let second = queue.get().await.unwrap();
    assert_eq!(*second, "b");
    queue.done(&second);

    timeout(Duration::from_secs(1), drain).await.unwrap().unwrap();
    assert!(queue.get().await.is_none());
}
