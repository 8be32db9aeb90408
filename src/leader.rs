// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Lease-based leader election.
//!
//! Only the replica holding the `coordination.k8s.io/v1` Lease registers watch
//! callbacks and therefore writes `ServiceImport`s. Leadership transitions run the
//! [`LeadershipHooks`]; a hook that fails leaves the replica unable to tell whether
//! it is the only writer, so the failure is reported on the fatal channel and the
//! process exits.
//!
//! The lease itself is managed by `kube-lease-manager`. Dropping the leadership
//! channel releases the lease, so a replica that shuts down hands over at once
//! instead of waiting for the lease to expire.

use crate::errors::{ConfigError, LeadershipError};
use crate::metrics;
use async_trait::async_trait;
use kube::Client;
use kube_lease_manager::LeaseManagerBuilder;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, RwLock, RwLockReadGuard};
use tracing::{debug, error, info, warn};

/// Leader election parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeaderElectionConfig {
    /// Name of the Lease object
    pub lease_name: String,
    /// Namespace of the Lease object
    pub namespace: String,
    /// Holder identity of this replica
    pub identity: String,
    /// How long a lease is valid without renewal
    pub lease_duration: Duration,
    /// How long the leader keeps trying to renew before giving up
    pub renew_deadline: Duration,
    /// Pause before re-entering the election after losing the lease or failing
    /// to start the lease manager. Lease renewal timing is governed by
    /// `lease_duration` and `renew_deadline` only.
    pub retry_period: Duration,
}

impl LeaderElectionConfig {
    /// Checks `0 < retry period < renew deadline < lease duration`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LeaderElection`] describing the violated bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_period.is_zero() {
            return Err(ConfigError::LeaderElection(
                "retry period must be positive".to_string(),
            ));
        }
        if self.retry_period >= self.renew_deadline {
            return Err(ConfigError::LeaderElection(format!(
                "retry period ({:?}) must be shorter than renew deadline ({:?})",
                self.retry_period, self.renew_deadline
            )));
        }
        if self.renew_deadline >= self.lease_duration {
            return Err(ConfigError::LeaderElection(format!(
                "renew deadline ({:?}) must be shorter than lease duration ({:?})",
                self.renew_deadline, self.lease_duration
            )));
        }
        Ok(())
    }

    /// Seconds before expiry at which the holder renews.
    fn grace_secs(&self) -> u64 {
        self.lease_duration
            .saturating_sub(self.renew_deadline)
            .as_secs()
            .max(1)
    }
}

/// Whether this replica may act on queued events.
///
/// The reconciler holds [`LeadershipGate::enter`] while it processes an event, and
/// [`LeadershipGate::close`] waits for that event to finish. Once `close` returns,
/// no event is applied until the gate is opened again.
#[derive(Clone, Debug, Default)]
pub struct LeadershipGate {
    leading: Arc<RwLock<bool>>,
}

impl LeadershipGate {
    /// Creates a closed gate.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets events through.
    pub async fn open(&self) {
        *self.leading.write().await = true;
    }

    /// Stops letting events through, after the event in flight has finished.
    pub async fn close(&self) {
        *self.leading.write().await = false;
    }

    /// Returns a guard to hold while applying one event, or `None` when closed.
    pub async fn enter(&self) -> Option<RwLockReadGuard<'_, bool>> {
        let guard = self.leading.read().await;
        (*guard).then_some(guard)
    }

    /// Returns true while the gate is open.
    pub async fn is_open(&self) -> bool {
        *self.leading.read().await
    }
}

/// Callbacks run on leadership transitions.
#[async_trait]
pub trait LeadershipHooks: Send + Sync {
    /// Called after the lease is acquired.
    async fn on_started_leading(&self) -> Result<(), LeadershipError>;

    /// Called after the lease is lost or released.
    async fn on_stopped_leading(&self) -> Result<(), LeadershipError>;
}

/// How one election round ended.
#[derive(Debug)]
pub enum Outcome {
    /// The shutdown signal fired
    Shutdown,
    /// The lease manager stopped reporting leadership
    Lost,
    /// A hook failed
    Fatal(LeadershipError),
}

/// Resolves once `shutdown` is set or its sender is gone.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Resolves once the leadership flag equals `wanted`. Returns false if the
/// channel closed first.
async fn leadership_is(leader: &mut watch::Receiver<bool>, wanted: bool) -> bool {
    leader.wait_for(|is_leader| *is_leader == wanted).await.is_ok()
}

/// Follows a leadership channel, running hooks on every transition.
///
/// Returns when shutdown is requested, the leadership channel closes, or a hook
/// fails. Leadership held at that point is given up through
/// [`LeadershipHooks::on_stopped_leading`] first.
pub async fn lead(
    leader: &mut watch::Receiver<bool>,
    hooks: &dyn LeadershipHooks,
    shutdown: &mut watch::Receiver<bool>,
    identity: &str,
) -> Outcome {
    loop {
        tokio::select! {
            biased;
            () = shutdown_requested(shutdown) => return Outcome::Shutdown,
            open = leadership_is(leader, true) => {
                if !open {
                    return Outcome::Lost;
                }
            }
        }

        info!(identity = %identity, "Acquired leadership");
        metrics::record_leader_elected(identity);
        if let Err(e) = hooks.on_started_leading().await {
            error!(identity = %identity, error = %e, "Failed to start leading");
            return Outcome::Fatal(e);
        }

        let outcome = tokio::select! {
            biased;
            () = shutdown_requested(shutdown) => Some(Outcome::Shutdown),
            open = leadership_is(leader, false) => {
                if open { None } else { Some(Outcome::Lost) }
            }
        };

        info!(identity = %identity, "Stopped leading");
        metrics::record_leader_lost(identity);
        if let Err(e) = hooks.on_stopped_leading().await {
            error!(identity = %identity, error = %e, "Failed to stop leading");
            return Outcome::Fatal(e);
        }

        if let Some(outcome) = outcome {
            return outcome;
        }
    }
}

/// Runs the election until shutdown or a fatal hook failure.
pub struct LeaderElector {
    client: Client,
    config: LeaderElectionConfig,
}

impl LeaderElector {
    /// Creates an elector for a validated configuration.
    #[must_use]
    pub fn new(client: Client, config: LeaderElectionConfig) -> Self {
        Self { client, config }
    }

    /// Takes part in the election until `shutdown` fires.
    ///
    /// Lease manager failures re-enter the election after the retry period. Hook
    /// failures are sent on `fatal` and end the election.
    pub async fn run(
        self,
        hooks: Arc<dyn LeadershipHooks>,
        mut shutdown: watch::Receiver<bool>,
        fatal: mpsc::Sender<LeadershipError>,
    ) {
        let config = &self.config;
        loop {
            if *shutdown.borrow() {
                return;
            }

            let manager = LeaseManagerBuilder::new(self.client.clone(), &config.lease_name)
                .with_namespace(&config.namespace)
                .with_identity(&config.identity)
                .with_duration(config.lease_duration.as_secs())
                .with_grace(config.grace_secs())
                .build()
                .await;
            let manager = match manager {
                Ok(manager) => manager,
                Err(e) => {
                    warn!(lease = %config.lease_name, error = %e, "Failed to set up leader lease, retrying");
                    if self.pause(&mut shutdown).await {
                        return;
                    }
                    continue;
                }
            };

            info!(lease = %config.lease_name, identity = %config.identity, "Joining leader election");
            let (mut leader, task) = manager.watch().await;
            let outcome = lead(&mut leader, hooks.as_ref(), &mut shutdown, &config.identity).await;

            // Dropping the channel releases the lease.
            drop(leader);
            match task.await {
                Ok(Ok(_)) => debug!(lease = %config.lease_name, "Lease manager stopped"),
                Ok(Err(e)) => warn!(lease = %config.lease_name, error = %e, "Lease manager failed"),
                Err(e) => warn!(lease = %config.lease_name, error = %e, "Lease manager task panicked"),
            }

            match outcome {
                Outcome::Shutdown => {
                    info!("Leader election stopped");
                    return;
                }
                Outcome::Lost => {
                    warn!(lease = %config.lease_name, "Lost contact with leader lease, re-entering election");
                    if self.pause(&mut shutdown).await {
                        return;
                    }
                }
                Outcome::Fatal(e) => {
                    if fatal.send(e).await.is_err() {
                        error!("Fatal leadership error could not be reported");
                    }
                    return;
                }
            }
        }
    }

    /// Waits one retry period. Returns true if shutdown was requested meanwhile.
    async fn pause(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            () = shutdown_requested(shutdown) => true,
            () = tokio::time::sleep(self.config.retry_period) => false,
        }
    }
}

#[cfg(test)]
#[path = "leader_tests.rs"]
mod leader_tests;
