// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Custom Resource Definitions (CRDs) for multi-cluster service imports.
//!
//! # Resource Types
//!
//! - [`Link`] - Declares a relationship to one remote cluster. Read-only for the controller.
//! - [`ServiceImport`] - Aggregate view of one logical service across linked clusters.
//!
//! # Example: Declaring a Link
//!
//! ```rust
//! use meshimport::crd::{LabelSelector, LinkSpec};
//! use std::collections::BTreeMap;
//!
//! let spec = LinkSpec {
//!     target_cluster_name: "east".to_string(),
//!     cluster_credentials_secret: "cluster-credentials-east".to_string(),
//!     cluster_agnostic_selector: LabelSelector {
//!         match_labels: Some(BTreeMap::from([(
//!             "mirror.linkerd.io/exported".to_string(),
//!             "remote-discovery".to_string(),
//!         )])),
//!         match_expressions: None,
//!     },
//! };
//! assert_eq!(spec.target_cluster_name, "east");
//! ```

use crate::labels::{EXPORTED_LABEL, EXPORTED_REMOTE_DISCOVERY};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Label selector to match Kubernetes resources.
///
/// A label selector is a label query over a set of resources. The result of matchLabels and
/// matchExpressions are `ANDed`. An empty label selector matches all objects.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct LabelSelector {
    /// Map of {key,value} pairs. A single {key,value} in the matchLabels map is equivalent
    /// to an element of matchExpressions, whose key field is "key", the operator is "In",
    /// and the values array contains only "value". All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_labels: Option<BTreeMap<String, String>>,

    /// List of label selector requirements. All requirements must be satisfied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub match_expressions: Option<Vec<LabelSelectorRequirement>>,
}

/// A label selector requirement is a selector that contains values, a key, and an operator
/// that relates the key and values.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
pub struct LabelSelectorRequirement {
    /// The label key that the selector applies to.
    pub key: String,

    /// Operator represents a key's relationship to a set of values.
    /// Valid operators are In, `NotIn`, Exists and `DoesNotExist`.
    pub operator: String,

    /// An array of string values. If the operator is In or `NotIn`,
    /// the values array must be non-empty. If the operator is Exists or `DoesNotExist`,
    /// the values array must be empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<String>>,
}

fn default_cluster_agnostic_selector() -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([(
            EXPORTED_LABEL.to_string(),
            EXPORTED_REMOTE_DISCOVERY.to_string(),
        )])),
        match_expressions: None,
    }
}

/// `Link` declares a relationship to one remote cluster.
///
/// The controller only reads Links. Each Link names the remote cluster, a `Secret`
/// (in the controller namespace) holding a kubeconfig for that cluster, and the
/// selector identifying which remote services take part in aggregation.
///
/// # Example
///
/// ```yaml
/// apiVersion: multicluster.linkerd.io/v1alpha1
/// kind: Link
/// metadata:
///   name: east
///   namespace: linkerd-multicluster
/// spec:
///   targetClusterName: east
///   clusterCredentialsSecret: cluster-credentials-east
///   clusterAgnosticSelector:
///     matchLabels:
///       mirror.linkerd.io/exported: remote-discovery
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[kube(
    group = "multicluster.linkerd.io",
    version = "v1alpha1",
    kind = "Link",
    namespaced,
    derive = "PartialEq",
    doc = "Link declares a relationship to a remote cluster whose exported services are aggregated into ServiceImports."
)]
#[serde(rename_all = "camelCase")]
pub struct LinkSpec {
    /// Name of the remote cluster. Unique across all Links.
    pub target_cluster_name: String,

    /// Name of the `Secret` holding the remote kubeconfig under the `kubeconfig` key.
    pub cluster_credentials_secret: String,

    /// Selects remote services that participate in aggregation.
    ///
    /// Defaults to `mirror.linkerd.io/exported=remote-discovery`.
    #[serde(default = "default_cluster_agnostic_selector")]
    pub cluster_agnostic_selector: LabelSelector,
}

/// Port exposed by an imported service.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportPort {
    /// Port name. Empty when the source port is unnamed.
    #[serde(default)]
    pub name: String,

    /// Port number.
    pub port: i32,

    /// Transport protocol (TCP, UDP or SCTP).
    #[serde(default)]
    pub protocol: String,
}

/// `ServiceImport` status: the set of clusters currently exporting the service.
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
pub struct ServiceImportStatus {
    /// Unique names of the clusters exporting this service. Order is not significant.
    #[serde(default)]
    pub clusters: Vec<String>,
}

/// `ServiceImport` is the aggregate view of one service across linked clusters.
///
/// Created on the first observed export of a service from any cluster and
/// owner-referenced to the local `Service` of the same name, so garbage collection
/// removes it with that service. The controller never deletes it directly.
///
/// # Example
///
/// ```yaml
/// apiVersion: multicluster.x-k8s.io/v1alpha1
/// kind: ServiceImport
/// metadata:
///   name: foo
///   namespace: ns1
/// spec:
///   type: ClusterSetIP
///   ports:
///     - name: http
///       port: 80
///       protocol: TCP
/// status:
///   clusters: ["east"]
/// ```
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[kube(
    group = "multicluster.x-k8s.io",
    version = "v1alpha1",
    kind = "ServiceImport",
    namespaced,
    shortname = "svcim",
    derive = "PartialEq",
    doc = "ServiceImport describes a service imported from the linked clusters that export it."
)]
#[kube(status = "ServiceImportStatus")]
#[serde(rename_all = "camelCase")]
pub struct ServiceImportSpec {
    /// `ClusterSetIP` or `Headless`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r#type: Option<String>,

    /// Ports exposed by the service.
    #[serde(default)]
    pub ports: Vec<ServiceImportPort>,
}

impl ServiceImport {
    /// Cluster names currently recorded in status.
    #[must_use]
    pub fn clusters(&self) -> &[String] {
        self.status
            .as_ref()
            .map(|status| status.clusters.as_slice())
            .unwrap_or_default()
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
