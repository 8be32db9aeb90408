// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Registry of live remote cluster connections.
//!
//! The [`LinkRegistry`] owns every [`RemoteCluster`], keyed by cluster name. All
//! reads and writes go through one lock; only the reconciler mutates it.

use crate::errors::{ClusterError, InformerError};
use crate::events::{Event, LinkSnapshot};
use crate::metrics;
use crate::queue::EventQueue;
use crate::remote::{ClusterConnector, RemoteCluster};
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Live remote clusters, keyed by cluster name.
#[derive(Default)]
pub struct LinkRegistry {
    clusters: Mutex<BTreeMap<String, RemoteCluster>>,
}

impl LinkRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects to the cluster a Link points at and starts forwarding its services.
    ///
    /// Registering a cluster that is already registered with an identical Link is a
    /// no-op. Otherwise the connection is rebuilt from the new Link and the old one
    /// is stopped; services that matched the old selector but not the new one are
    /// enqueued as unexports. Export state already recorded in `ServiceImport`s is
    /// left alone.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] if the selector is invalid, the credentials cannot
    /// be loaded, or the remote cluster is unreachable. The registry is unchanged
    /// on error.
    pub async fn register_cluster(
        &self,
        link: &LinkSnapshot,
        connector: &dyn ClusterConnector,
        queue: &EventQueue<Event>,
    ) -> Result<(), ClusterError> {
        let name = link.cluster_name().to_string();
        link.spec
            .cluster_agnostic_selector
            .validate()
            .map_err(|source| ClusterError::InvalidSelector {
                cluster: name.clone(),
                source,
            })?;

        if self
            .clusters
            .lock()
            .await
            .get(&name)
            .is_some_and(|existing| existing.link() == link)
        {
            debug!(cluster = %name, "Link unchanged, keeping connection");
            return Ok(());
        }

        // Connecting talks to the remote API server; keep the lock free meanwhile.
        let services = connector.connect(link).await?;
        let mut cluster = RemoteCluster::new(link.clone(), services);
        cluster.start_watching(queue)?;

        let mut clusters = self.clusters.lock().await;
        if let Some(mut previous) = clusters.insert(name.clone(), cluster) {
            for service in previous.deselected_services(&link.spec.cluster_agnostic_selector) {
                queue.add(Event::ServiceUpdate {
                    cluster: name.clone(),
                    service,
                    exported: false,
                });
            }
            if let Err(e) = previous.stop() {
                warn!(cluster = %name, error = %e, "Failed to stop replaced remote watch");
            }
            info!(cluster = %name, "Re-registered remote cluster");
        } else {
            info!(cluster = %name, "Registered remote cluster");
        }
        metrics::set_registered_clusters(clusters.len());
        Ok(())
    }

    /// Unexports every service the cluster was exporting and drops its connection.
    ///
    /// Deregistering an unknown cluster is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError::Handler`] if the service handler could not be removed.
    /// The entry is removed and its watch stopped regardless.
    pub async fn deregister_cluster(
        &self,
        name: &str,
        queue: &EventQueue<Event>,
    ) -> Result<(), ClusterError> {
        let mut clusters = self.clusters.lock().await;
        let Some(cluster) = clusters.get(name) else {
            debug!(cluster = %name, "Cluster not registered, nothing to deregister");
            return Ok(());
        };

        let services = cluster.exported_services();
        info!(cluster = %name, services = services.len(), "Deregistering remote cluster");
        for service in services {
            queue.add(Event::ServiceUpdate {
                cluster: name.to_string(),
                service,
                exported: false,
            });
        }

        let stopped = match clusters.remove(name) {
            Some(mut cluster) => cluster.stop(),
            None => Ok(()),
        };
        metrics::set_registered_clusters(clusters.len());
        stopped.map_err(|source| ClusterError::Handler {
            cluster: name.to_string(),
            source,
        })
    }

    /// Stops every connection and empties the registry.
    ///
    /// # Errors
    ///
    /// Returns the first handler removal failure; every watch is stopped regardless.
    pub async fn stop_all(&self) -> Result<(), InformerError> {
        let mut clusters = self.clusters.lock().await;
        let mut result = Ok(());
        for (name, mut cluster) in std::mem::take(&mut *clusters) {
            if let Err(e) = cluster.stop() {
                warn!(cluster = %name, error = %e, "Failed to deregister remote service handler");
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        metrics::set_registered_clusters(0);
        result
    }

    /// Returns true if a connection for `name` exists.
    pub async fn contains(&self, name: &str) -> bool {
        self.clusters.lock().await.contains_key(name)
    }

    /// Names of the registered clusters.
    pub async fn cluster_names(&self) -> BTreeSet<String> {
        self.clusters.lock().await.keys().cloned().collect()
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod registry_tests;
