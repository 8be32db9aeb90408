// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! `ServiceImport` membership reconciliation.
//!
//! A `ServiceImport` lists the clusters exporting its service. One export or
//! unexport notification adds or removes one cluster name; when the list already
//! reflects the notification nothing is written, so replayed notifications are
//! harmless.

use crate::context::Context;
use crate::errors::ImportError;
use crate::events::RemoteService;
use crate::imports::{build_service_import, service_owner_reference};
use crate::metrics;
use tracing::{debug, info};

/// Records that `cluster` does or does not export `service`.
///
/// Creates the `ServiceImport` on the first export. An unexport for a service with
/// no `ServiceImport` is a no-op.
///
/// # Errors
///
/// Returns [`ImportError::Conflict`] if the object changed since it was read, or
/// [`ImportError::Api`] for any other API failure.
pub async fn reconcile_service_import(
    ctx: &Context,
    cluster: &str,
    service: &RemoteService,
    exported: bool,
) -> Result<(), ImportError> {
    let namespace = &service.namespace;
    let name = &service.name;

    let import = match ctx.imports.get(namespace, name).await? {
        Some(import) => import,
        None if !exported => {
            debug!(cluster = %cluster, service = %service, "No ServiceImport to remove cluster from");
            return Ok(());
        }
        None => {
            let owner = ctx
                .imports
                .local_service(namespace, name)
                .await?
                .as_ref()
                .and_then(service_owner_reference);
            if owner.is_none() {
                debug!(service = %service, "No local Service found, creating ServiceImport without owner");
            }
            let created = ctx
                .imports
                .create(&build_service_import(service, owner))
                .await?;
            metrics::record_service_import_write("create");
            info!(service = %service, "Created ServiceImport");
            created
        }
    };

    let mut clusters = import.clusters().to_vec();
    let is_member = clusters.iter().any(|c| c == cluster);
    let operation = match (exported, is_member) {
        (true, true) | (false, false) => {
            debug!(cluster = %cluster, service = %service, exported, "ServiceImport already up to date");
            return Ok(());
        }
        (true, false) => {
            clusters.push(cluster.to_string());
            "add_cluster"
        }
        (false, true) => {
            clusters.retain(|c| c != cluster);
            "remove_cluster"
        }
    };

    ctx.imports.update_clusters(&import, clusters).await?;
    metrics::record_service_import_write(operation);
    info!(cluster = %cluster, service = %service, exported, "Updated ServiceImport clusters");
    Ok(())
}
