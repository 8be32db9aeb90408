// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `config.rs`

use crate::config::{Args, LogFormat};
use crate::errors::ConfigError;
use clap::Parser;
use std::time::Duration;

#[test]
fn test_explicit_flags_are_parsed() {
    let args = Args::try_parse_from([
        "meshimport",
        "--namespace",
        "mc",
        "--admin-addr",
        "127.0.0.1:9000",
        "--lease-identity",
        "replica-1",
        "--requeue-limit",
        "3",
        "--log-format",
        "json",
    ])
    .unwrap();

    assert_eq!(args.namespace, "mc");
    assert_eq!(args.admin_addr.port(), 9000);
    assert_eq!(args.identity(), "replica-1");
    assert_eq!(args.requeue_limit, 3);
    assert_eq!(args.log_format, LogFormat::Json);
}

#[test]
fn test_leader_election_uses_timings() {
    let args = Args::try_parse_from([
        "meshimport",
        "--namespace",
        "mc",
        "--lease-identity",
        "replica-1",
        "--lease-duration-secs",
        "30",
        "--renew-deadline-secs",
        "20",
        "--retry-period-secs",
        "4",
    ])
    .unwrap();

    let config = args.leader_election().unwrap();
    assert_eq!(config.namespace, "mc");
    assert_eq!(config.identity, "replica-1");
    assert_eq!(config.lease_duration, Duration::from_secs(30));
    assert_eq!(config.renew_deadline, Duration::from_secs(20));
    assert_eq!(config.retry_period, Duration::from_secs(4));
}

#[test]
fn test_leader_election_rejects_renew_not_below_lease() {
    let args = Args::try_parse_from([
        "meshimport",
        "--lease-identity",
        "replica-1",
        "--lease-duration-secs",
        "10",
        "--renew-deadline-secs",
        "10",
    ])
    .unwrap();

    assert!(matches!(
        args.leader_election(),
        Err(ConfigError::LeaderElection(_))
    ));
}

#[test]
fn test_invalid_admin_addr_is_rejected() {
    assert!(Args::try_parse_from(["meshimport", "--admin-addr", "not-an-address"]).is_err());
}

#[test]
fn test_cache_sync_timeout() {
    let args =
        Args::try_parse_from(["meshimport", "--cache-sync-timeout-secs", "7"]).unwrap();
    assert_eq!(args.cache_sync_timeout(), Duration::from_secs(7));
}
