// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Remote cluster registration and deregistration.

use crate::context::Context;
use crate::errors::ClusterError;
use crate::events::LinkSnapshot;
use crate::metrics;
use tracing::{error, info, warn};

/// Connects (or reconnects) to the cluster a Link points at.
///
/// Used for both new Links and updated ones: an updated Link rebuilds the
/// connection from its new spec, leaving recorded export state in place.
///
/// # Errors
///
/// Returns the registration failure so the event is retried.
pub async fn reconcile_cluster_registration(
    ctx: &Context,
    link: &LinkSnapshot,
) -> Result<(), ClusterError> {
    let cluster = link.cluster_name();
    info!(cluster = %cluster, link = %link.name, "Registering remote cluster");

    match ctx
        .registry
        .register_cluster(link, ctx.connector.as_ref(), &ctx.queue)
        .await
    {
        Ok(()) => {
            metrics::record_cluster_registration("success");
            Ok(())
        }
        Err(e) => {
            metrics::record_cluster_registration("error");
            if e.is_transient() {
                warn!(cluster = %cluster, error = %e, "Remote cluster registration failed");
            } else {
                error!(cluster = %cluster, error = %e, "Remote cluster is misconfigured");
            }
            Err(e)
        }
    }
}

/// Drops the connection for a deleted Link after unexporting its services.
///
/// # Errors
///
/// Returns an error if the remote service handler could not be removed.
pub async fn reconcile_cluster_deletion(
    ctx: &Context,
    link: &LinkSnapshot,
) -> Result<(), ClusterError> {
    info!(cluster = %link.cluster_name(), link = %link.name, "Link deleted, deregistering remote cluster");
    ctx.registry
        .deregister_cluster(link.cluster_name(), &ctx.queue)
        .await
}
