// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the meshimport controller.
//!
//! This module contains all numeric and string constants used throughout the codebase.
//! Constants are organized by category for easy maintenance.

// ============================================================================
// API Constants
// ============================================================================

/// API group of the `Link` CRD
pub const LINK_API_GROUP: &str = "multicluster.linkerd.io";

/// API version of the `Link` CRD
pub const LINK_API_VERSION: &str = "v1alpha1";

/// API group of the `ServiceImport` CRD
pub const SERVICE_IMPORT_API_GROUP: &str = "multicluster.x-k8s.io";

/// API version of the `ServiceImport` CRD
pub const SERVICE_IMPORT_API_VERSION: &str = "v1alpha1";

/// Kind name for `Link` resource
pub const KIND_LINK: &str = "Link";

/// Kind name for `ServiceImport` resource
pub const KIND_SERVICE_IMPORT: &str = "ServiceImport";

/// `ServiceImport` type for services with a cluster IP
pub const IMPORT_TYPE_CLUSTER_SET_IP: &str = "ClusterSetIP";

/// `ServiceImport` type for headless services (`clusterIP: None`)
pub const IMPORT_TYPE_HEADLESS: &str = "Headless";

/// Default protocol for service ports that omit one
pub const DEFAULT_PORT_PROTOCOL: &str = "TCP";

// ============================================================================
// Credentials Secret Constants
// ============================================================================

/// Key under which the credentials secret stores the serialized kubeconfig
pub const KUBECONFIG_SECRET_KEY: &str = "kubeconfig";

/// Default namespace holding `Link` and credentials `Secret` objects
pub const DEFAULT_CONTROLLER_NAMESPACE: &str = "linkerd-multicluster";

// ============================================================================
// Event Queue Constants
// ============================================================================

/// Base delay for the per-event failure backoff (500ms)
pub const QUEUE_BASE_DELAY_MILLIS: u64 = 500;

/// Maximum delay for the per-event failure backoff (5 minutes)
pub const QUEUE_MAX_DELAY_SECS: u64 = 300;

/// Number of times a failed event is retried before it is dropped
pub const DEFAULT_REQUEUE_LIMIT: u32 = 5;

/// Maximum time to wait for a watch cache to complete its initial list
pub const DEFAULT_CACHE_SYNC_TIMEOUT_SECS: u64 = 60;

// ============================================================================
// Leader Election Constants
// ============================================================================

/// Default name of the leader election `Lease`
pub const DEFAULT_LEASE_NAME: &str = "meshimport-controller";

/// Default leader election lease duration (15 seconds)
pub const DEFAULT_LEASE_DURATION_SECS: u64 = 15;

/// Default leader election renew deadline (10 seconds)
pub const DEFAULT_LEASE_RENEW_DEADLINE_SECS: u64 = 10;

/// Default leader election retry period (2 seconds)
pub const DEFAULT_LEASE_RETRY_PERIOD_SECS: u64 = 2;

// ============================================================================
// Runtime Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Admin Server Constants
// ============================================================================

/// Default bind address for the admin HTTP server
pub const DEFAULT_ADMIN_ADDR: &str = "0.0.0.0:9990";

/// Path for Prometheus metrics endpoint
pub const ADMIN_METRICS_PATH: &str = "/metrics";

/// Path for the liveness probe
pub const ADMIN_LIVENESS_PATH: &str = "/live";

/// Path for the readiness probe
pub const ADMIN_READINESS_PATH: &str = "/ready";

/// Field manager name used for writes to the API server
pub const FIELD_MANAGER: &str = "meshimport";
