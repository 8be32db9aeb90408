// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory stand-ins for the API server, used by unit tests.

use crate::crd::{ServiceImport, ServiceImportStatus};
use crate::errors::{ClusterError, ImportError};
use crate::events::LinkSnapshot;
use crate::imports::ServiceImportStore;
use crate::informer::Informer;
use crate::remote::ClusterConnector;
use async_trait::async_trait;
use futures::channel::mpsc;
use k8s_openapi::api::core::v1::Service;
use kube::runtime::watcher;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;

type ServiceEvents = mpsc::UnboundedSender<Result<watcher::Event<Service>, watcher::Error>>;

/// Remote clusters whose service watches are fed from memory.
#[derive(Default)]
pub struct FakeConnector {
    services: Mutex<HashMap<String, Vec<Service>>>,
    broken: Mutex<HashSet<String>>,
    watches: Mutex<HashMap<String, ServiceEvents>>,
    connects: AtomicU32,
}

impl FakeConnector {
    /// Sets the services a cluster lists on its next connection.
    pub fn set_services(&self, cluster: &str, services: Vec<Service>) {
        self.services
            .lock()
            .unwrap()
            .insert(cluster.to_string(), services);
    }

    /// Makes connections to `cluster` fail as if its secret were missing.
    pub fn break_cluster(&self, cluster: &str) {
        self.broken.lock().unwrap().insert(cluster.to_string());
    }

    /// Lets connections to `cluster` succeed again.
    pub fn repair_cluster(&self, cluster: &str) {
        self.broken.lock().unwrap().remove(cluster);
    }

    /// Pushes a live watch event to the most recent connection to `cluster`.
    pub fn send(&self, cluster: &str, event: watcher::Event<Service>) {
        if let Some(tx) = self.watches.lock().unwrap().get(cluster) {
            let _ = tx.unbounded_send(Ok(event));
        }
    }

    /// Number of successful connections so far.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterConnector for FakeConnector {
    async fn connect(&self, link: &LinkSnapshot) -> Result<Informer<Service>, ClusterError> {
        let cluster = link.cluster_name();
        if self.broken.lock().unwrap().contains(cluster) {
            return Err(ClusterError::SecretNotFound {
                cluster: cluster.to_string(),
                secret: link.spec.cluster_credentials_secret.clone(),
                namespace: link.namespace.clone(),
            });
        }

        let (tx, rx) = mpsc::unbounded();
        let services = self
            .services
            .lock()
            .unwrap()
            .get(cluster)
            .cloned()
            .unwrap_or_default();
        let _ = tx.unbounded_send(Ok(watcher::Event::Init));
        for service in services {
            let _ = tx.unbounded_send(Ok(watcher::Event::InitApply(service)));
        }
        let _ = tx.unbounded_send(Ok(watcher::Event::InitDone));
        self.watches.lock().unwrap().insert(cluster.to_string(), tx);
        self.connects.fetch_add(1, Ordering::SeqCst);

        let informer = Informer::from_stream("Service", rx);
        informer
            .wait_until_synced(std::time::Duration::from_secs(5))
            .await
            .map_err(|source| ClusterError::Handler {
                cluster: cluster.to_string(),
                source,
            })?;
        Ok(informer)
    }
}

/// `ServiceImport` objects and local services held in memory.
#[derive(Default)]
pub struct FakeImportStore {
    imports: Mutex<BTreeMap<(String, String), ServiceImport>>,
    local: Mutex<BTreeMap<(String, String), Service>>,
    pending_conflicts: AtomicU32,
    writes: AtomicU32,
    version: AtomicU32,
}

impl FakeImportStore {
    fn key(namespace: &str, name: &str) -> (String, String) {
        (namespace.to_string(), name.to_string())
    }

    fn next_version(&self) -> String {
        (self.version.fetch_add(1, Ordering::SeqCst) + 1).to_string()
    }

    /// Stores a `ServiceImport` as if it already existed.
    pub fn insert(&self, mut import: ServiceImport) {
        import.metadata.resource_version = Some(self.next_version());
        let key = Self::key(&import.namespace().unwrap_or_default(), &import.name_any());
        self.imports.lock().unwrap().insert(key, import);
    }

    /// Stores a local `Service`.
    pub fn insert_local_service(&self, service: Service) {
        let key = Self::key(&service.namespace().unwrap_or_default(), &service.name_any());
        self.local.lock().unwrap().insert(key, service);
    }

    /// Makes the next `count` status updates fail with a conflict.
    pub fn fail_with_conflicts(&self, count: u32) {
        self.pending_conflicts.store(count, Ordering::SeqCst);
    }

    /// Current state of a `ServiceImport`.
    pub fn stored(&self, namespace: &str, name: &str) -> Option<ServiceImport> {
        self.imports
            .lock()
            .unwrap()
            .get(&Self::key(namespace, name))
            .cloned()
    }

    /// Sorted cluster list of a `ServiceImport`.
    pub fn clusters(&self, namespace: &str, name: &str) -> Vec<String> {
        let mut clusters = self
            .stored(namespace, name)
            .map(|i| i.clusters().to_vec())
            .unwrap_or_default();
        clusters.sort();
        clusters
    }

    /// Number of successful create and update calls.
    pub fn writes(&self) -> u32 {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceImportStore for FakeImportStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceImport>, ImportError> {
        Ok(self.stored(namespace, name))
    }

    async fn create(&self, import: &ServiceImport) -> Result<ServiceImport, ImportError> {
        let namespace = import.namespace().unwrap_or_default();
        let name = import.name_any();
        let mut imports = self.imports.lock().unwrap();
        let key = Self::key(&namespace, &name);
        if imports.contains_key(&key) {
            return Err(ImportError::Conflict { namespace, name });
        }
        let mut stored = import.clone();
        stored.metadata.resource_version = Some(self.next_version());
        imports.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update_clusters(
        &self,
        import: &ServiceImport,
        clusters: Vec<String>,
    ) -> Result<(), ImportError> {
        let namespace = import.namespace().unwrap_or_default();
        let name = import.name_any();

        if self
            .pending_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ImportError::Conflict { namespace, name });
        }

        let mut imports = self.imports.lock().unwrap();
        let Some(stored) = imports.get_mut(&Self::key(&namespace, &name)) else {
            return Err(ImportError::Conflict { namespace, name });
        };
        if stored.metadata.resource_version != import.metadata.resource_version {
            return Err(ImportError::Conflict { namespace, name });
        }
        stored.status = Some(ServiceImportStatus { clusters });
        stored.metadata.resource_version = Some(self.next_version());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn local_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ImportError> {
        Ok(self
            .local
            .lock()
            .unwrap()
            .get(&Self::key(namespace, name))
            .cloned())
    }

    async fn list_managed(&self) -> Result<Vec<ServiceImport>, ImportError> {
        Ok(self.imports.lock().unwrap().values().cloned().collect())
    }
}

/// A remote `Service` with one `http` port, labelled for export when `exported`.
pub fn service(namespace: &str, name: &str, exported: bool) -> Service {
    use k8s_openapi::api::core::v1::{ServicePort, ServiceSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    let mut labels = BTreeMap::new();
    if exported {
        labels.insert(
            crate::labels::EXPORTED_LABEL.to_string(),
            crate::labels::EXPORTED_REMOTE_DISCOVERY.to_string(),
        );
    }
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(labels),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                name: Some("http".to_string()),
                port: 80,
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// A Link for `cluster` using the default export selector.
pub fn link(cluster: &str) -> LinkSnapshot {
    let spec: crate::crd::LinkSpec = serde_json::from_value(serde_json::json!({
        "targetClusterName": cluster,
        "clusterCredentialsSecret": format!("cluster-credentials-{cluster}"),
    }))
    .unwrap();
    LinkSnapshot {
        name: cluster.to_string(),
        namespace: crate::constants::DEFAULT_CONTROLLER_NAMESPACE.to_string(),
        spec,
    }
}
