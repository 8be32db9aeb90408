// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Events flowing through the controller's queue.
//!
//! Every state change the controller reacts to is one [`Event`]. Watch callbacks
//! produce them, the reconciler consumes them one at a time. Payloads are owned
//! snapshots taken when the notification fired. Every event concerns one
//! [`EventKey`]; events for the same key are applied in the order they were queued.

use crate::constants::{DEFAULT_PORT_PROTOCOL, IMPORT_TYPE_CLUSTER_SET_IP, IMPORT_TYPE_HEADLESS};
use crate::crd::{Link, LinkSpec, ServiceImport, ServiceImportPort};
use k8s_openapi::api::core::v1::Service;
use kube::ResourceExt;
use std::fmt;

/// Snapshot of a `Link` taken when its watch event fired.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct LinkSnapshot {
    /// Name of the Link object
    pub name: String,
    /// Namespace of the Link object
    pub namespace: String,
    /// Link spec at the time of the event
    pub spec: LinkSpec,
}

impl LinkSnapshot {
    /// Remote cluster this Link points at.
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        &self.spec.target_cluster_name
    }
}

impl From<&Link> for LinkSnapshot {
    fn from(link: &Link) -> Self {
        Self {
            name: link.name_any(),
            namespace: link.namespace().unwrap_or_default(),
            spec: link.spec.clone(),
        }
    }
}

/// The parts of a remote `Service` needed to build a `ServiceImport`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RemoteService {
    /// Service name, shared with the `ServiceImport`
    pub name: String,
    /// Service namespace, shared with the `ServiceImport`
    pub namespace: String,
    /// `ClusterSetIP` or `Headless`
    pub import_type: String,
    /// Ports of the remote service
    pub ports: Vec<ServiceImportPort>,
}

impl RemoteService {
    /// Extracts a [`RemoteService`] from a watched `Service`.
    ///
    /// Returns `None` for objects without a name or namespace.
    #[must_use]
    pub fn from_service(service: &Service) -> Option<Self> {
        let name = service.metadata.name.clone()?;
        let namespace = service.metadata.namespace.clone()?;
        let spec = service.spec.as_ref();

        let headless = spec
            .and_then(|s| s.cluster_ip.as_deref())
            .is_some_and(|ip| ip == "None");
        let ports = spec
            .and_then(|s| s.ports.as_ref())
            .map(|ports| {
                ports
                    .iter()
                    .map(|p| ServiceImportPort {
                        name: p.name.clone().unwrap_or_default(),
                        port: p.port,
                        protocol: p
                            .protocol
                            .clone()
                            .unwrap_or_else(|| DEFAULT_PORT_PROTOCOL.to_string()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        Some(Self {
            name,
            namespace,
            import_type: if headless {
                IMPORT_TYPE_HEADLESS
            } else {
                IMPORT_TYPE_CLUSTER_SET_IP
            }
            .to_string(),
            ports,
        })
    }
}

impl RemoteService {
    /// Describes the service a `ServiceImport` was built from.
    #[must_use]
    pub fn from_import(import: &ServiceImport) -> Self {
        Self {
            name: import.name_any(),
            namespace: import.namespace().unwrap_or_default(),
            import_type: import
                .spec
                .r#type
                .clone()
                .unwrap_or_else(|| IMPORT_TYPE_CLUSTER_SET_IP.to_string()),
            ports: import.spec.ports.clone(),
        }
    }
}

impl fmt::Display for RemoteService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// The resource an [`Event`] is about.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum EventKey {
    /// A remote cluster, by name
    Cluster(String),
    /// One service as exported by one remote cluster
    Service {
        /// Remote cluster name
        cluster: String,
        /// Service namespace
        namespace: String,
        /// Service name
        name: String,
    },
}

/// A state-changing notification, processed exactly once by the reconciler.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// A Link appeared: connect to its remote cluster
    ClusterRegistration {
        /// The new Link
        link: LinkSnapshot,
    },

    /// A Link changed or was deleted
    ClusterUpdate {
        /// The Link after the change, or its last known state when deleted
        link: LinkSnapshot,
        /// True when the Link was deleted
        deleted: bool,
    },

    /// A remote service started or stopped being exported
    ServiceUpdate {
        /// Remote cluster the service lives in
        cluster: String,
        /// The remote service
        service: RemoteService,
        /// True if the cluster now exports the service
        exported: bool,
    },
}

impl Event {
    /// Stable label for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ClusterRegistration { .. } => "cluster_registration",
            Self::ClusterUpdate { deleted: false, .. } => "cluster_update",
            Self::ClusterUpdate { deleted: true, .. } => "cluster_deletion",
            Self::ServiceUpdate { exported: true, .. } => "service_export",
            Self::ServiceUpdate { exported: false, .. } => "service_unexport",
        }
    }

    /// The resource this event is about.
    #[must_use]
    pub fn key(&self) -> EventKey {
        match self {
            Self::ServiceUpdate {
                cluster, service, ..
            } => EventKey::Service {
                cluster: cluster.clone(),
                namespace: service.namespace.clone(),
                name: service.name.clone(),
            },
            _ => EventKey::Cluster(self.cluster_name().to_string()),
        }
    }

    /// Remote cluster the event concerns.
    #[must_use]
    pub fn cluster_name(&self) -> &str {
        match self {
            Self::ClusterRegistration { link } | Self::ClusterUpdate { link, .. } => {
                link.cluster_name()
            }
            Self::ServiceUpdate { cluster, .. } => cluster,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceUpdate {
                cluster, service, ..
            } => write!(f, "{} {service} from {cluster}", self.kind()),
            _ => write!(f, "{} {}", self.kind(), self.cluster_name()),
        }
    }
}

#[cfg(test)]
#[path = "events_tests.rs"]
mod events_tests;
