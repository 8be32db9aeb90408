// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ServiceImport` persistence.
//!
//! The reconciler reads and writes `ServiceImport` objects through the
//! [`ServiceImportStore`] trait. [`KubeServiceImportStore`] is the API server
//! implementation; status writes carry the object's `resourceVersion` so a
//! concurrent writer surfaces as [`ImportError::Conflict`] instead of being
//! overwritten.

use crate::crd::{ServiceImport, ServiceImportSpec};
use crate::errors::ImportError;
use crate::events::RemoteService;
use crate::labels::{K8S_MANAGED_BY, K8S_PART_OF, MANAGED_BY_MESHIMPORT, PART_OF_MULTICLUSTER};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Service;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, ResourceExt};
use serde_json::json;
use std::collections::BTreeMap;

/// Read and write access to `ServiceImport` objects and the local services that own them.
#[async_trait]
pub trait ServiceImportStore: Send + Sync {
    /// Fetches a `ServiceImport`. A missing object is `Ok(None)`.
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceImport>, ImportError>;

    /// Creates a `ServiceImport` and returns the stored object.
    async fn create(&self, import: &ServiceImport) -> Result<ServiceImport, ImportError>;

    /// Replaces the cluster list in the status of `import`.
    ///
    /// Fails with [`ImportError::Conflict`] if `import` is no longer the latest version.
    async fn update_clusters(
        &self,
        import: &ServiceImport,
        clusters: Vec<String>,
    ) -> Result<(), ImportError>;

    /// Fetches the local `Service` a `ServiceImport` is owned by. A missing object is `Ok(None)`.
    async fn local_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ImportError>;

    /// Lists every `ServiceImport` written by this controller, in all namespaces.
    async fn list_managed(&self) -> Result<Vec<ServiceImport>, ImportError>;
}

/// [`ServiceImportStore`] backed by the local API server.
pub struct KubeServiceImportStore {
    client: Client,
    field_manager: String,
}

impl KubeServiceImportStore {
    /// Creates a store writing with the given field manager name.
    #[must_use]
    pub fn new(client: Client, field_manager: impl Into<String>) -> Self {
        Self {
            client,
            field_manager: field_manager.into(),
        }
    }

    fn api(&self, namespace: &str) -> Api<ServiceImport> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ServiceImportStore for KubeServiceImportStore {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<ServiceImport>, ImportError> {
        self.api(namespace)
            .get_opt(name)
            .await
            .map_err(|e| ImportError::from_kube(namespace, name, e))
    }

    async fn create(&self, import: &ServiceImport) -> Result<ServiceImport, ImportError> {
        let namespace = import.namespace().unwrap_or_default();
        let name = import.name_any();
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        };
        self.api(&namespace)
            .create(&params, import)
            .await
            .map_err(|e| ImportError::from_kube(&namespace, &name, e))
    }

    async fn update_clusters(
        &self,
        import: &ServiceImport,
        clusters: Vec<String>,
    ) -> Result<(), ImportError> {
        let namespace = import.namespace().unwrap_or_default();
        let name = import.name_any();

        // resourceVersion turns the merge patch into a compare-and-swap.
        let patch = json!({
            "metadata": { "resourceVersion": import.resource_version() },
            "status": { "clusters": clusters },
        });
        self.api(&namespace)
            .patch_status(
                &name,
                &PatchParams {
                    field_manager: Some(self.field_manager.clone()),
                    ..PatchParams::default()
                },
                &Patch::Merge(&patch),
            )
            .await
            .map_err(|e| ImportError::from_kube(&namespace, &name, e))?;
        Ok(())
    }

    async fn local_service(&self, namespace: &str, name: &str) -> Result<Option<Service>, ImportError> {
        Api::<Service>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
            .map_err(|e| ImportError::from_kube(namespace, name, e))
    }

    async fn list_managed(&self) -> Result<Vec<ServiceImport>, ImportError> {
        let params =
            ListParams::default().labels(&format!("{K8S_MANAGED_BY}={MANAGED_BY_MESHIMPORT}"));
        let list = Api::<ServiceImport>::all(self.client.clone())
            .list(&params)
            .await
            .map_err(|source| ImportError::List { source })?;
        Ok(list.items)
    }
}

/// Owner reference pointing a `ServiceImport` at the local `Service` of the same name.
///
/// Returns `None` for a service without a UID (not yet persisted).
#[must_use]
pub fn service_owner_reference(service: &Service) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: "v1".to_string(),
        kind: "Service".to_string(),
        name: service.name_any(),
        uid: service.metadata.uid.clone()?,
        controller: Some(true),
        block_owner_deletion: None,
    })
}

/// Builds a new `ServiceImport` for a remote service, with no clusters in its status.
#[must_use]
pub fn build_service_import(service: &RemoteService, owner: Option<OwnerReference>) -> ServiceImport {
    let labels = BTreeMap::from([
        (K8S_MANAGED_BY.to_string(), MANAGED_BY_MESHIMPORT.to_string()),
        (K8S_PART_OF.to_string(), PART_OF_MULTICLUSTER.to_string()),
    ]);

    ServiceImport {
        metadata: ObjectMeta {
            name: Some(service.name.clone()),
            namespace: Some(service.namespace.clone()),
            labels: Some(labels),
            owner_references: owner.map(|r| vec![r]),
            ..Default::default()
        },
        spec: ServiceImportSpec {
            r#type: Some(service.import_type.clone()),
            ports: service.ports.clone(),
        },
        status: None,
    }
}

#[cfg(test)]
#[path = "imports_tests.rs"]
mod imports_tests;
