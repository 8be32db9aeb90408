// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Remote cluster connections.
//!
//! A [`RemoteCluster`] is the live form of a `Link`: an API client for the remote
//! cluster, a watch over its `Service` objects, and the handler that turns matching
//! service changes into [`Event::ServiceUpdate`] events on the controller queue.
//!
//! Connections are built through the [`ClusterConnector`] trait so the reconciler
//! can be exercised without a remote API server.

use crate::constants::KUBECONFIG_SECRET_KEY;
use crate::crd::LabelSelector;
use crate::errors::{ClusterError, InformerError};
use crate::events::{Event, LinkSnapshot, RemoteService};
use crate::informer::{HandlerId, Informer, ResourceEventHandler};
use crate::queue::EventQueue;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::runtime::watcher;
use kube::{Api, Client, Config};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Builds the `Service` watch for a remote cluster.
#[async_trait]
pub trait ClusterConnector: Send + Sync {
    /// Connects to the cluster a Link points at and starts watching its services.
    ///
    /// # Errors
    ///
    /// Returns a [`ClusterError`] when the credentials cannot be loaded or the
    /// remote API server cannot be reached.
    async fn connect(&self, link: &LinkSnapshot) -> Result<Informer<Service>, ClusterError>;
}

/// [`ClusterConnector`] reading kubeconfigs from `Secret`s in the controller namespace.
pub struct KubeConnector {
    client: Client,
    namespace: String,
}

impl KubeConnector {
    /// Creates a connector reading credentials secrets from `namespace`.
    #[must_use]
    pub fn new(client: Client, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }

    async fn load_kubeconfig(&self, link: &LinkSnapshot) -> Result<Kubeconfig, ClusterError> {
        let cluster = link.cluster_name();
        let secret_name = &link.spec.cluster_credentials_secret;
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), &self.namespace);

        let secret = secrets
            .get_opt(secret_name)
            .await
            .map_err(|source| ClusterError::LocalApi {
                cluster: cluster.to_string(),
                source,
            })?
            .ok_or_else(|| ClusterError::SecretNotFound {
                cluster: cluster.to_string(),
                secret: secret_name.clone(),
                namespace: self.namespace.clone(),
            })?;

        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(KUBECONFIG_SECRET_KEY))
            .ok_or_else(|| ClusterError::MissingKubeconfig {
                cluster: cluster.to_string(),
                secret: secret_name.clone(),
                key: KUBECONFIG_SECRET_KEY.to_string(),
            })?;

        let text = std::str::from_utf8(&raw.0).map_err(|e| ClusterError::InvalidKubeconfig {
            cluster: cluster.to_string(),
            reason: e.to_string(),
        })?;

        Kubeconfig::from_yaml(text).map_err(|e| ClusterError::InvalidKubeconfig {
            cluster: cluster.to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl ClusterConnector for KubeConnector {
    async fn connect(&self, link: &LinkSnapshot) -> Result<Informer<Service>, ClusterError> {
        let cluster = link.cluster_name();
        let kubeconfig = self.load_kubeconfig(link).await?;

        let config = Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
            .await
            .map_err(|e| ClusterError::InvalidKubeconfig {
                cluster: cluster.to_string(),
                reason: e.to_string(),
            })?;
        let client = Client::try_from(config).map_err(|source| ClusterError::Unreachable {
            cluster: cluster.to_string(),
            source,
        })?;

        let version = client
            .apiserver_version()
            .await
            .map_err(|source| ClusterError::Unreachable {
                cluster: cluster.to_string(),
                source,
            })?;
        debug!(cluster = %cluster, version = %version.git_version, "Connected to remote API server");

        Ok(Informer::spawn(
            Api::<Service>::all(client),
            watcher::Config::default(),
        ))
    }
}

/// Forwards remote service changes that match a Link's selector to the queue.
pub struct RemoteServiceHandler {
    cluster: String,
    selector: LabelSelector,
    queue: EventQueue<Event>,
}

impl RemoteServiceHandler {
    /// Creates a handler for one remote cluster.
    #[must_use]
    pub fn new(cluster: impl Into<String>, selector: LabelSelector, queue: EventQueue<Event>) -> Self {
        Self {
            cluster: cluster.into(),
            selector,
            queue,
        }
    }

    fn matches(&self, service: &Service) -> bool {
        let empty = BTreeMap::new();
        self.selector
            .matches(service.metadata.labels.as_ref().unwrap_or(&empty))
    }

    fn enqueue(&self, service: &Service, exported: bool) {
        let Some(service) = RemoteService::from_service(service) else {
            return;
        };
        debug!(cluster = %self.cluster, service = %service, exported, "Remote service changed");
        self.queue.add(Event::ServiceUpdate {
            cluster: self.cluster.clone(),
            service,
            exported,
        });
    }
}

impl ResourceEventHandler<Service> for RemoteServiceHandler {
    fn on_add(&self, obj: &Service) {
        if self.matches(obj) {
            self.enqueue(obj, true);
        }
    }

    fn on_update(&self, old: &Service, new: &Service) {
        if self.matches(new) {
            self.enqueue(new, true);
        } else if self.matches(old) {
            self.enqueue(new, false);
        }
    }

    fn on_delete(&self, obj: &Service) {
        if self.matches(obj) {
            self.enqueue(obj, false);
        }
    }
}

/// A live connection to one linked cluster.
pub struct RemoteCluster {
    link: LinkSnapshot,
    services: Informer<Service>,
    registration: Option<HandlerId>,
}

impl RemoteCluster {
    /// Wraps a started service watch for `link`.
    #[must_use]
    pub fn new(link: LinkSnapshot, services: Informer<Service>) -> Self {
        Self {
            link,
            services,
            registration: None,
        }
    }

    /// Remote cluster name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.link.cluster_name()
    }

    /// The Link this connection was built from.
    #[must_use]
    pub fn link(&self) -> &LinkSnapshot {
        &self.link
    }

    /// Registers the service handler; matching services already cached are
    /// enqueued as exports immediately.
    ///
    /// # Errors
    ///
    /// Fails if the service watch has stopped.
    pub fn start_watching(&mut self, queue: &EventQueue<Event>) -> Result<(), ClusterError> {
        if self.registration.is_some() {
            return Ok(());
        }
        let handler = RemoteServiceHandler::new(
            self.name(),
            self.link.spec.cluster_agnostic_selector.clone(),
            queue.clone(),
        );
        let id = self
            .services
            .add_handler(Arc::new(handler))
            .map_err(|source| ClusterError::Handler {
                cluster: self.name().to_string(),
                source,
            })?;
        self.registration = Some(id);
        info!(cluster = %self.name(), "Watching remote services");
        Ok(())
    }

    /// Services in the remote cache that match the Link's selector.
    #[must_use]
    pub fn exported_services(&self) -> Vec<RemoteService> {
        self.cached_services(|_| true)
    }

    /// Exported services that `next` no longer selects.
    #[must_use]
    pub fn deselected_services(&self, next: &LabelSelector) -> Vec<RemoteService> {
        self.cached_services(|labels| !next.matches(labels))
    }

    fn cached_services(
        &self,
        mut keep: impl FnMut(&BTreeMap<String, String>) -> bool,
    ) -> Vec<RemoteService> {
        let empty = BTreeMap::new();
        let selector = &self.link.spec.cluster_agnostic_selector;
        self.services
            .list()
            .iter()
            .filter(|svc| {
                let labels = svc.metadata.labels.as_ref().unwrap_or(&empty);
                selector.matches(labels) && keep(labels)
            })
            .filter_map(|svc| RemoteService::from_service(svc))
            .collect()
    }

    /// Deregisters the service handler and stops the watch.
    ///
    /// # Errors
    ///
    /// Fails if the handler could not be removed; the watch is stopped regardless.
    pub fn stop(&mut self) -> Result<(), InformerError> {
        let removed = match self.registration.take() {
            Some(id) => self.services.remove_handler(id).map(|_| ()),
            None => Ok(()),
        };
        self.services.stop();
        debug!(cluster = %self.name(), "Stopped remote service watch");
        removed
    }
}

#[cfg(test)]
#[path = "remote_tests.rs"]
mod remote_tests;
