// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the meshimport controller.
//!
//! This module provides specialized error types for:
//! - Remote cluster registration (credentials, kubeconfig, connectivity)
//! - `ServiceImport` persistence (optimistic concurrency conflicts, API failures)
//! - Watch caches and their event handler registrations
//! - Leadership transitions, which are fatal when they cannot be completed
//!
//! Per-event errors are classified as transient or configuration errors so the
//! reconciler can log and count them appropriately; both kinds are retried through
//! the event queue.

use std::time::Duration;
use thiserror::Error;

/// Errors produced while validating a label selector.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    /// Operator is not one of `In`, `NotIn`, `Exists`, `DoesNotExist`
    #[error("unknown operator '{operator}' for key '{key}'")]
    UnknownOperator {
        /// Label key of the offending requirement
        key: String,
        /// The operator that was supplied
        operator: String,
    },

    /// `In`/`NotIn` without values, or `Exists`/`DoesNotExist` with values
    #[error("operator '{operator}' for key '{key}' {reason}")]
    InvalidValues {
        /// Label key of the offending requirement
        key: String,
        /// The operator of the requirement
        operator: String,
        /// What is wrong with the values
        reason: &'static str,
    },
}

/// Errors produced by a watch cache ([`crate::informer::Informer`]).
#[derive(Error, Debug, Clone)]
pub enum InformerError {
    /// The handler table lock was poisoned by a panicking handler
    #[error("event handler table for {kind} watch is poisoned")]
    HandlerLockPoisoned {
        /// Kind of the watched resource
        kind: String,
    },

    /// The watch task has terminated; handlers can no longer be served
    #[error("{kind} watch has stopped")]
    Stopped {
        /// Kind of the watched resource
        kind: String,
    },

    /// The initial list did not complete in time
    #[error("{kind} watch cache did not sync within {timeout:?}")]
    SyncTimeout {
        /// Kind of the watched resource
        kind: String,
        /// How long we waited
        timeout: Duration,
    },
}

/// Errors that can occur while materializing a `Link` into a remote cluster connection.
#[derive(Error, Debug)]
pub enum ClusterError {
    /// The credentials secret referenced by the Link does not exist
    #[error("credentials secret '{secret}' for cluster '{cluster}' not found in namespace {namespace}")]
    SecretNotFound {
        /// Remote cluster name
        cluster: String,
        /// Secret name
        secret: String,
        /// Namespace searched
        namespace: String,
    },

    /// The credentials secret has no kubeconfig entry
    #[error("credentials secret '{secret}' for cluster '{cluster}' has no '{key}' entry")]
    MissingKubeconfig {
        /// Remote cluster name
        cluster: String,
        /// Secret name
        secret: String,
        /// Expected data key
        key: String,
    },

    /// The kubeconfig could not be parsed or turned into a client configuration
    #[error("invalid kubeconfig for cluster '{cluster}': {reason}")]
    InvalidKubeconfig {
        /// Remote cluster name
        cluster: String,
        /// Parse or load failure
        reason: String,
    },

    /// The Link's cluster-agnostic selector is malformed
    #[error("invalid cluster-agnostic selector for cluster '{cluster}': {source}")]
    InvalidSelector {
        /// Remote cluster name
        cluster: String,
        /// Validation failure
        #[source]
        source: SelectorError,
    },

    /// The remote API server could not be reached
    #[error("remote API server for cluster '{cluster}' is unreachable: {source}")]
    Unreachable {
        /// Remote cluster name
        cluster: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// Reading the credentials secret from the local API server failed
    #[error("failed to read credentials for cluster '{cluster}': {source}")]
    LocalApi {
        /// Remote cluster name
        cluster: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// The remote service watch refused the event handler
    #[error("failed to register service handler for cluster '{cluster}': {source}")]
    Handler {
        /// Remote cluster name
        cluster: String,
        /// Underlying watch error
        #[source]
        source: InformerError,
    },
}

impl ClusterError {
    /// Returns true if the failure is expected to clear up on its own.
    ///
    /// Configuration errors (bad kubeconfig, bad selector) need an operator to fix
    /// the Link or its secret; they are still retried but logged at error level.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::SecretNotFound { .. }
            | Self::Unreachable { .. }
            | Self::LocalApi { .. }
            | Self::Handler { .. } => true,
            Self::MissingKubeconfig { .. }
            | Self::InvalidKubeconfig { .. }
            | Self::InvalidSelector { .. } => false,
        }
    }

    /// Category label used for metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::SecretNotFound { .. } => "secret_not_found",
            Self::MissingKubeconfig { .. } => "missing_kubeconfig",
            Self::InvalidKubeconfig { .. } => "invalid_kubeconfig",
            Self::InvalidSelector { .. } => "invalid_selector",
            Self::Unreachable { .. } => "remote_unreachable",
            Self::LocalApi { .. } => "api_error",
            Self::Handler { .. } => "handler_error",
        }
    }
}

/// Errors that can occur while persisting a `ServiceImport`.
#[derive(Error, Debug)]
pub enum ImportError {
    /// Another writer changed the object since it was read (HTTP 409)
    #[error("conflicting write to ServiceImport {namespace}/{name}")]
    Conflict {
        /// `ServiceImport` namespace
        namespace: String,
        /// `ServiceImport` name
        name: String,
    },

    /// Listing `ServiceImport`s failed
    #[error("failed to list ServiceImports: {source}")]
    List {
        /// Underlying client error
        #[source]
        source: kube::Error,
    },

    /// Any other API failure
    #[error("ServiceImport {namespace}/{name}: {source}")]
    Api {
        /// `ServiceImport` namespace
        namespace: String,
        /// `ServiceImport` name
        name: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },
}

impl ImportError {
    /// Builds an [`ImportError`] from a client error, mapping HTTP 409 to `Conflict`.
    #[must_use]
    pub fn from_kube(namespace: &str, name: &str, err: kube::Error) -> Self {
        match err {
            kube::Error::Api(ref status) if status.code == 409 => Self::Conflict {
                namespace: namespace.to_string(),
                name: name.to_string(),
            },
            source => Self::Api {
                namespace: namespace.to_string(),
                name: name.to_string(),
                source,
            },
        }
    }

    /// Returns true for optimistic-concurrency conflicts.
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Error returned while processing one queued event.
#[derive(Error, Debug)]
pub enum ReconcileError {
    /// Registering or deregistering a remote cluster failed
    #[error(transparent)]
    Cluster(#[from] ClusterError),

    /// Reconciling a `ServiceImport` failed
    #[error(transparent)]
    Import(#[from] ImportError),
}

impl ReconcileError {
    /// Category label used for metrics.
    #[must_use]
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Cluster(err) => err.error_type(),
            Self::Import(ImportError::Conflict { .. }) => "conflict",
            Self::Import(ImportError::Api { .. } | ImportError::List { .. }) => "api_error",
        }
    }

    /// Returns true if the failure is expected to clear up on its own.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Cluster(err) => err.is_transient(),
            Self::Import(_) => true,
        }
    }
}

/// Leadership transitions that could not be completed.
///
/// A replica that fails to install its watches after winning the lease, or fails to
/// remove them after losing it, can no longer prove it is the only writer. These
/// errors are never retried; the process exits.
#[derive(Error, Debug)]
pub enum LeadershipError {
    /// Event callbacks could not be registered after acquiring the lease
    #[error("failed to register event callbacks after acquiring leadership: {0}")]
    CallbackRegistration(#[source] InformerError),

    /// Event callbacks could not be removed after losing the lease
    #[error("failed to deregister event callbacks after losing leadership: {0}")]
    CallbackDeregistration(#[source] InformerError),
}

/// Invalid process configuration.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Leader election timings violate `0 < retry < renew < lease`
    #[error("invalid leader election timings: {0}")]
    LeaderElection(String),
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
