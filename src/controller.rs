// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Leadership hooks wiring the Link watch to the event queue.
//!
//! On acquiring the lease the controller waits for the Link cache to sync, opens
//! the leadership gate and registers [`LinkHandler`], which turns every Link change
//! into a cluster event. It then sweeps managed `ServiceImport`s for clusters that
//! no longer have a Link, which happens when a Link is deleted while its cluster
//! is unreachable or while no replica leads, and queues an unexport for each.
//!
//! On losing the lease it closes the gate, waiting for the event in flight, removes
//! the handler, tears down every remote cluster watch and discards whatever is
//! still queued. A replica that is not leading neither produces nor applies events.

use crate::context::Context;
use crate::crd::Link;
use crate::errors::{InformerError, LeadershipError};
use crate::events::{Event, LinkSnapshot, RemoteService};
use crate::informer::{HandlerId, Informer, ResourceEventHandler};
use crate::leader::LeadershipHooks;
use crate::queue::EventQueue;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Turns Link watch notifications into cluster events.
pub struct LinkHandler {
    queue: EventQueue<Event>,
}

impl LinkHandler {
    /// Creates a handler feeding `queue`.
    #[must_use]
    pub fn new(queue: EventQueue<Event>) -> Self {
        Self { queue }
    }
}

impl ResourceEventHandler<Link> for LinkHandler {
    fn on_add(&self, obj: &Link) {
        let link = LinkSnapshot::from(obj);
        debug!(cluster = %link.cluster_name(), "Link added");
        self.queue.add(Event::ClusterRegistration { link });
    }

    fn on_update(&self, _old: &Link, new: &Link) {
        let link = LinkSnapshot::from(new);
        debug!(cluster = %link.cluster_name(), "Link updated");
        self.queue.add(Event::ClusterUpdate {
            link,
            deleted: false,
        });
    }

    fn on_delete(&self, obj: &Link) {
        let link = LinkSnapshot::from(obj);
        debug!(cluster = %link.cluster_name(), "Link deleted");
        self.queue.add(Event::ClusterUpdate {
            link,
            deleted: true,
        });
    }
}

/// [`LeadershipHooks`] for the meshimport controller.
pub struct ControllerHooks {
    links: Arc<Informer<Link>>,
    ctx: Arc<Context>,
    sync_timeout: Duration,
    registration: Mutex<Option<HandlerId>>,
}

impl ControllerHooks {
    /// Creates hooks over the shared Link watch and controller context.
    #[must_use]
    pub fn new(links: Arc<Informer<Link>>, ctx: Arc<Context>, sync_timeout: Duration) -> Self {
        Self {
            links,
            ctx,
            sync_timeout,
            registration: Mutex::new(None),
        }
    }

    fn take_registration(&self) -> Option<HandlerId> {
        self.registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Queues an unexport for every cluster recorded on a managed `ServiceImport`
    /// that has no Link in the cache. Returns the number of events queued.
    pub async fn sweep_unlinked_clusters(&self) -> usize {
        let linked: HashSet<String> = self
            .links
            .list()
            .iter()
            .map(|link| LinkSnapshot::from(link.as_ref()).cluster_name().to_string())
            .collect();

        let imports = match self.ctx.imports.list_managed().await {
            Ok(imports) => imports,
            Err(e) => {
                warn!(error = %e, "Failed to list ServiceImports, skipping unlinked cluster sweep");
                return 0;
            }
        };

        let mut queued = 0;
        for import in &imports {
            for cluster in import.clusters() {
                if linked.contains(cluster) {
                    continue;
                }
                let service = RemoteService::from_import(import);
                info!(cluster = %cluster, service = %service, "Removing cluster without a Link");
                if self.ctx.queue.add(Event::ServiceUpdate {
                    cluster: cluster.clone(),
                    service,
                    exported: false,
                }) {
                    queued += 1;
                }
            }
        }
        queued
    }
}

#[async_trait]
impl LeadershipHooks for ControllerHooks {
    async fn on_started_leading(&self) -> Result<(), LeadershipError> {
        self.links
            .wait_until_synced(self.sync_timeout)
            .await
            .map_err(LeadershipError::CallbackRegistration)?;

        self.ctx.leadership.open().await;
        let id = self
            .links
            .add_handler(Arc::new(LinkHandler::new(self.ctx.queue.clone())))
            .map_err(LeadershipError::CallbackRegistration)?;

        let previous = self
            .registration
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(id);
        if let Some(previous) = previous {
            self.links
                .remove_handler(previous)
                .map_err(LeadershipError::CallbackRegistration)?;
        }
        info!(links = self.links.list().len(), "Registered Link event handler");

        let swept = self.sweep_unlinked_clusters().await;
        if swept > 0 {
            info!(events = swept, "Queued removals for clusters without a Link");
        }
        Ok(())
    }

    async fn on_stopped_leading(&self) -> Result<(), LeadershipError> {
        self.ctx.leadership.close().await;
        let removed: Result<(), InformerError> = match self.take_registration() {
            Some(id) => self.links.remove_handler(id).map(|_| ()),
            None => Ok(()),
        };
        let stopped = self.ctx.registry.stop_all().await;
        let discarded = self.ctx.queue.clear();
        if discarded > 0 {
            info!(events = discarded, "Discarded queued events after losing leadership");
        }

        removed.map_err(LeadershipError::CallbackDeregistration)?;
        stopped.map_err(LeadershipError::CallbackDeregistration)?;
        info!("Deregistered Link event handler and remote cluster watches");
        Ok(())
    }
}

#[cfg(test)]
#[path = "controller_tests.rs"]
mod controller_tests;
