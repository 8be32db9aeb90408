// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Common label and annotation constants.
//!
//! This module defines the standard Kubernetes labels applied to objects the
//! controller creates, and the multicluster labels it reads from remote services.

// ============================================================================
// Kubernetes Standard Labels
// https://kubernetes.io/docs/concepts/overview/working-with-objects/common-labels/
// ============================================================================

/// Standard label for the tool being used to manage the operation of an application
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of a higher-level application this one is part of
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Value for `app.kubernetes.io/managed-by` on objects written by this controller
pub const MANAGED_BY_MESHIMPORT: &str = "meshimport";

/// Value for `app.kubernetes.io/part-of` on objects written by this controller
pub const PART_OF_MULTICLUSTER: &str = "multicluster";

// ============================================================================
// Multicluster Labels
// ============================================================================

/// Label remote services carry to opt into cluster-agnostic discovery
pub const EXPORTED_LABEL: &str = "mirror.linkerd.io/exported";

/// Value of [`EXPORTED_LABEL`] selected when a `Link` omits its selector
pub const EXPORTED_REMOTE_DISCOVERY: &str = "remote-discovery";
