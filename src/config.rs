// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line and environment configuration.
//!
//! Every option can also be set through the environment variable shown in
//! `meshimport --help`. Defaults live in [`crate::constants`].

use crate::constants::{
    DEFAULT_ADMIN_ADDR, DEFAULT_CACHE_SYNC_TIMEOUT_SECS, DEFAULT_CONTROLLER_NAMESPACE,
    DEFAULT_LEASE_DURATION_SECS, DEFAULT_LEASE_NAME, DEFAULT_LEASE_RENEW_DEADLINE_SECS,
    DEFAULT_LEASE_RETRY_PERIOD_SECS, DEFAULT_REQUEUE_LIMIT,
};
use crate::errors::ConfigError;
use crate::leader::LeaderElectionConfig;
use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Log output format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Compact human-readable lines
    #[default]
    Text,
    /// One JSON object per line
    Json,
}

/// Multi-cluster `ServiceImport` controller.
#[derive(Clone, Debug, Parser)]
#[command(name = "meshimport", version, about)]
pub struct Args {
    /// Path to the kubeconfig for the local cluster (in-cluster config when unset)
    #[arg(long, env = "KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// Namespace holding Link and credentials Secret objects
    #[arg(long, env = "CONTROLLER_NAMESPACE", default_value = DEFAULT_CONTROLLER_NAMESPACE)]
    pub namespace: String,

    /// Bind address of the admin server (probes and metrics)
    #[arg(long, env = "ADMIN_ADDR", default_value = DEFAULT_ADMIN_ADDR)]
    pub admin_addr: SocketAddr,

    /// Name of the leader election Lease
    #[arg(long, env = "LEASE_NAME", default_value = DEFAULT_LEASE_NAME)]
    pub lease_name: String,

    /// Lease holder identity (defaults to the pod name or hostname)
    #[arg(long, env = "POD_NAME")]
    pub lease_identity: Option<String>,

    /// Seconds a lease stays valid without renewal
    #[arg(long, env = "LEASE_DURATION_SECONDS", default_value_t = DEFAULT_LEASE_DURATION_SECS)]
    pub lease_duration_secs: u64,

    /// Seconds the leader keeps renewing before giving up
    #[arg(long, env = "LEASE_RENEW_DEADLINE_SECONDS", default_value_t = DEFAULT_LEASE_RENEW_DEADLINE_SECS)]
    pub renew_deadline_secs: u64,

    /// Seconds to wait before rejoining the election after losing the lease;
    /// does not affect lease renewal
    #[arg(long, env = "LEASE_RETRY_PERIOD_SECONDS", default_value_t = DEFAULT_LEASE_RETRY_PERIOD_SECS)]
    pub retry_period_secs: u64,

    /// Retries for a failed event before it is dropped
    #[arg(long, env = "REQUEUE_LIMIT", default_value_t = DEFAULT_REQUEUE_LIMIT)]
    pub requeue_limit: u32,

    /// Seconds to wait for a watch cache to sync
    #[arg(long, env = "CACHE_SYNC_TIMEOUT_SECONDS", default_value_t = DEFAULT_CACHE_SYNC_TIMEOUT_SECS)]
    pub cache_sync_timeout_secs: u64,

    /// Log output format
    #[arg(long, env = "RUST_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    /// Holder identity: `--lease-identity`, then `HOSTNAME`, then a random name.
    #[must_use]
    pub fn identity(&self) -> String {
        self.lease_identity
            .clone()
            .filter(|id| !id.is_empty())
            .or_else(|| std::env::var("HOSTNAME").ok().filter(|h| !h.is_empty()))
            .unwrap_or_else(|| format!("meshimport-{:08x}", rand::random::<u32>()))
    }

    /// Leader election settings.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::LeaderElection`] unless `0 < retry < renew < lease`.
    pub fn leader_election(&self) -> Result<LeaderElectionConfig, ConfigError> {
        let config = LeaderElectionConfig {
            lease_name: self.lease_name.clone(),
            namespace: self.namespace.clone(),
            identity: self.identity(),
            lease_duration: Duration::from_secs(self.lease_duration_secs),
            renew_deadline: Duration::from_secs(self.renew_deadline_secs),
            retry_period: Duration::from_secs(self.retry_period_secs),
        };
        config.validate()?;
        Ok(config)
    }

    /// How long to wait for a watch cache to sync.
    #[must_use]
    pub fn cache_sync_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_sync_timeout_secs)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
