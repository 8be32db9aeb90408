// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `leader.rs`

use crate::errors::{InformerError, LeadershipError};
use crate::leader::{lead, LeaderElectionConfig, LeadershipGate, LeadershipHooks, Outcome};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

fn config(lease: u64, renew: u64, retry: u64) -> LeaderElectionConfig {
    LeaderElectionConfig {
        lease_name: "meshimport-controller".to_string(),
        namespace: "linkerd-multicluster".to_string(),
        identity: "replica-0".to_string(),
        lease_duration: Duration::from_secs(lease),
        renew_deadline: Duration::from_secs(renew),
        retry_period: Duration::from_secs(retry),
    }
}

#[derive(Default)]
struct RecordingHooks {
    calls: Mutex<Vec<&'static str>>,
    fail_start: AtomicBool,
    fail_stop: AtomicBool,
}

impl RecordingHooks {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LeadershipHooks for RecordingHooks {
    async fn on_started_leading(&self) -> Result<(), LeadershipError> {
        self.calls.lock().unwrap().push("start");
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(LeadershipError::CallbackRegistration(
                InformerError::Stopped {
                    kind: "Link".to_string(),
                },
            ));
        }
        Ok(())
    }

    async fn on_stopped_leading(&self) -> Result<(), LeadershipError> {
        self.calls.lock().unwrap().push("stop");
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(LeadershipError::CallbackDeregistration(
                InformerError::HandlerLockPoisoned {
                    kind: "Link".to_string(),
                },
            ));
        }
        Ok(())
    }
}

#[test]
fn test_default_timings_are_valid() {
    assert!(config(15, 10, 2).validate().is_ok());
}

#[test]
fn test_invalid_timings_are_rejected() {
    assert!(config(15, 10, 0).validate().is_err());
    assert!(config(15, 10, 10).validate().is_err());
    assert!(config(10, 10, 2).validate().is_err());
    assert!(config(10, 15, 2).validate().is_err());
}

#[test]
fn test_renewal_grace_ignores_retry_period() {
    assert_eq!(config(15, 10, 2).grace_secs(), 5);
    assert_eq!(config(15, 10, 9).grace_secs(), 5);
    assert_eq!(config(15, 14, 2).grace_secs(), 1);
}

#[tokio::test]
async fn test_gate_admits_only_while_open() {
    let gate = LeadershipGate::new();
    assert!(gate.enter().await.is_none());

    gate.open().await;
    assert!(gate.enter().await.is_some());

    gate.close().await;
    assert!(gate.enter().await.is_none());
}

#[tokio::test]
async fn test_gate_close_waits_for_holder() {
    let gate = LeadershipGate::new();
    gate.open().await;
    let guard = gate.enter().await.unwrap();

    let closer = {
        let gate = gate.clone();
        tokio::spawn(async move { gate.close().await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert!(!closer.is_finished(), "close must wait for the event in flight");

    drop(guard);
    closer.await.unwrap();
    assert!(!gate.is_open().await);
}

#[tokio::test]
async fn test_shutdown_before_leading_runs_no_hooks() {
    let hooks = RecordingHooks::default();
    let (_leader_tx, mut leader) = watch::channel(false);
    let (shutdown_tx, mut shutdown) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    let outcome = lead(&mut leader, &hooks, &mut shutdown, "replica-0").await;

    assert!(matches!(outcome, Outcome::Shutdown));
    assert!(hooks.calls().is_empty());
}

#[tokio::test]
async fn test_leadership_cycle_runs_hooks_in_order() {
    let hooks = Arc::new(RecordingHooks::default());
    let (leader_tx, mut leader) = watch::channel(false);
    let (shutdown_tx, mut shutdown) = watch::channel(false);

    let task_hooks = hooks.clone();
    let handle = tokio::spawn(async move {
        lead(&mut leader, task_hooks.as_ref(), &mut shutdown, "replica-0").await
    });

    leader_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader_tx.send(false).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    leader_tx.send(true).unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown_tx.send(true).unwrap();

    let outcome = tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(outcome, Outcome::Shutdown));
    assert_eq!(hooks.calls(), vec!["start", "stop", "start", "stop"]);
}

#[tokio::test]
async fn test_closed_channel_while_leading_stops_leading() {
    let hooks = RecordingHooks::default();
    let (leader_tx, mut leader) = watch::channel(true);
    let (_shutdown_tx, mut shutdown) = watch::channel(false);
    drop(leader_tx);

    let outcome = lead(&mut leader, &hooks, &mut shutdown, "replica-0").await;

    assert!(matches!(outcome, Outcome::Lost));
    assert_eq!(hooks.calls(), vec!["start", "stop"]);
}

#[tokio::test]
async fn test_failed_registration_is_fatal() {
    let hooks = RecordingHooks::default();
    hooks.fail_start.store(true, Ordering::SeqCst);
    let (_leader_tx, mut leader) = watch::channel(true);
    let (_shutdown_tx, mut shutdown) = watch::channel(false);

    let outcome = lead(&mut leader, &hooks, &mut shutdown, "replica-0").await;

    assert!(matches!(
        outcome,
        Outcome::Fatal(LeadershipError::CallbackRegistration(_))
    ));
    assert_eq!(hooks.calls(), vec!["start"]);
}

#[tokio::test]
async fn test_failed_deregistration_is_fatal() {
    let hooks = RecordingHooks::default();
    hooks.fail_stop.store(true, Ordering::SeqCst);
    let (leader_tx, mut leader) = watch::channel(true);
    let (_shutdown_tx, mut shutdown) = watch::channel(false);
    drop(leader_tx);

    let outcome = lead(&mut leader, &hooks, &mut shutdown, "replica-0").await;

    assert!(matches!(
        outcome,
        Outcome::Fatal(LeadershipError::CallbackDeregistration(_))
    ));
}
