// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Event reconciliation.
//!
//! The [`Reconciler`] is the only consumer of the event queue and the only writer
//! of controller state. It takes one [`Event`] at a time and dispatches it:
//!
//! - [`reconcile_cluster_registration`] - Link added or changed: (re)connect to the cluster
//! - [`reconcile_cluster_deletion`] - Link deleted: unexport its services, drop the connection
//! - [`reconcile_service_import`] - Remote service exported or unexported: update the
//!   `ServiceImport` cluster list
//!
//! A failed event is retried with per-event exponential backoff until it has been
//! requeued `requeue_limit` times, then dropped. Every queued event is its own
//! entry, so a flap such as export, unexport, export is applied step by step and
//! ends in the last state. A retry is discarded once a newer event for the same
//! [`EventKey`] has been applied.
//!
//! Events are only applied while [`Context::leadership`] is open. An event taken
//! from the queue while it is closed is discarded.
//!
//! # Example
//!
//! ```rust,no_run
//! use meshimport::context::Context;
//! use meshimport::reconcilers::Reconciler;
//! use std::sync::Arc;
//!
//! async fn consume(ctx: Arc<Context>) {
//!     Reconciler::new(ctx, 5).run().await;
//! }
//! ```

pub mod clusters;
pub mod service_import;

pub use clusters::{reconcile_cluster_deletion, reconcile_cluster_registration};
pub use service_import::reconcile_service_import;

use crate::context::Context;
use crate::errors::ReconcileError;
use crate::events::{Event, EventKey};
use crate::metrics;
use crate::queue::Queued;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Single consumer of the event queue.
pub struct Reconciler {
    ctx: Arc<Context>,
    requeue_limit: u32,
    applied: Mutex<HashMap<EventKey, u64>>,
}

impl Reconciler {
    /// Creates a reconciler retrying each failed event at most `requeue_limit` times.
    #[must_use]
    pub fn new(ctx: Arc<Context>, requeue_limit: u32) -> Self {
        Self {
            ctx,
            requeue_limit,
            applied: Mutex::new(HashMap::new()),
        }
    }

    /// Processes events until the queue is shut down and drained.
    pub async fn run(&self) {
        info!("Event reconciler started");
        while let Some(entry) = self.ctx.queue.get().await {
            self.process(entry).await;
            metrics::set_queue_depth(self.ctx.queue.len());
        }
        info!("Event queue drained, reconciler stopped");
    }

    /// Handles one entry taken from the queue and marks it done.
    pub async fn process(&self, entry: Queued<Event>) {
        let queue = &self.ctx.queue;
        let event_type = entry.kind();

        let Some(_leading) = self.ctx.leadership.enter().await else {
            debug!(event = %entry.item(), "Not leading, discarding event");
            metrics::record_event_skipped(event_type);
            queue.forget(&entry);
            queue.done(&entry);
            return;
        };

        if self.superseded(&entry) {
            debug!(event = %entry.item(), "Newer event already applied, discarding retry");
            metrics::record_event_superseded(event_type);
            queue.forget(&entry);
            queue.done(&entry);
            return;
        }

        let start = Instant::now();
        match self.reconcile(&entry).await {
            Ok(()) => {
                queue.forget(&entry);
                metrics::record_event_success(event_type, start.elapsed());
                debug!(event = %entry.item(), "Event processed");
            }
            Err(e) => {
                metrics::record_event_error(event_type, e.error_type(), start.elapsed());
                let attempts = queue.num_requeues(&entry);
                if attempts < self.requeue_limit {
                    let reason = if e.is_transient() {
                        "transient"
                    } else {
                        "configuration"
                    };
                    warn!(
                        event = %entry.item(),
                        cluster = %entry.cluster_name(),
                        error = %e,
                        attempt = attempts + 1,
                        "Event failed, requeueing"
                    );
                    metrics::record_event_requeue(event_type, reason);
                    queue.add_rate_limited(entry.clone());
                } else {
                    error!(
                        event = %entry.item(),
                        cluster = %entry.cluster_name(),
                        error = %e,
                        "Event failed too many times, dropping"
                    );
                    metrics::record_event_dropped(event_type);
                    queue.forget(&entry);
                }
            }
        }
        queue.done(&entry);
    }

    /// Records `entry` as the latest event for its key, unless a newer one was
    /// already taken from the queue.
    fn superseded(&self, entry: &Queued<Event>) -> bool {
        let mut applied = self.applied.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = applied.entry(entry.key()).or_insert(entry.seq());
        if *latest > entry.seq() {
            return true;
        }
        *latest = entry.seq();
        false
    }

    /// Applies one event.
    ///
    /// # Errors
    ///
    /// Returns the cluster or `ServiceImport` failure that prevented the event from
    /// taking effect.
    pub async fn reconcile(&self, event: &Event) -> Result<(), ReconcileError> {
        let ctx = self.ctx.as_ref();
        match event {
            Event::ClusterRegistration { link } | Event::ClusterUpdate { link, deleted: false } => {
                reconcile_cluster_registration(ctx, link).await?;
            }
            Event::ClusterUpdate {
                link,
                deleted: true,
            } => {
                reconcile_cluster_deletion(ctx, link).await?;
            }
            Event::ServiceUpdate {
                cluster,
                service,
                exported,
            } => {
                // Exports still queued from a cluster that has since been
                // deregistered must not add it back.
                if *exported && !ctx.registry.contains(cluster).await {
                    debug!(cluster = %cluster, service = %service, "Ignoring export from unregistered cluster");
                    return Ok(());
                }
                reconcile_service_import(ctx, cluster, service, *exported).await?;
            }
        }
        Ok(())
    }
}
