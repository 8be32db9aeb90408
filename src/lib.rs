// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # meshimport - Multi-cluster `ServiceImport` controller
//!
//! meshimport watches `Link` resources describing remote clusters, watches the
//! `Service` objects of every linked cluster, and keeps one `ServiceImport` per
//! exported service in the local cluster. Each `ServiceImport` lists the linked
//! clusters currently exporting that service in `status.clusters`.
//!
//! ## Overview
//!
//! - A `Link` add, update or delete becomes a cluster event on the [`queue`]
//! - Registering a cluster connects to it with the kubeconfig from its credentials
//!   `Secret` and starts an [`informer`] on its services
//! - Service changes that match the link's selector become export/unexport events
//! - A single [`reconcilers::Reconciler`] drains the queue and converges
//!   `ServiceImport` objects, retrying failures with per-event backoff
//! - Only the [`leader`] replica registers clusters; losing the lease stops every
//!   remote watch and discards queued events
//!
//! ## Modules
//!
//! - [`crd`] - `Link` and `ServiceImport` resource types
//! - [`selector`] - Label selector matching
//! - [`events`] - Queue event types
//! - [`queue`] - Ordered work queue with per-entry backoff
//! - [`informer`] - Watch cache with handler fan-out
//! - [`remote`] - Remote cluster connection and service handler
//! - [`registry`] - Registered remote clusters
//! - [`imports`] - `ServiceImport` storage and construction
//! - [`reconcilers`] - Event processing
//! - [`leader`] - Lease based leader election
//! - [`controller`] - Wiring between leadership and the `Link` watch
//! - [`admin`] - Probes and metrics endpoint

pub mod admin;
pub mod config;
pub mod constants;
pub mod context;
pub mod controller;
pub mod crd;
pub mod errors;
pub mod events;
pub mod imports;
pub mod informer;
pub mod labels;
pub mod leader;
pub mod metrics;
pub mod queue;
pub mod reconcilers;
pub mod registry;
pub mod remote;
pub mod selector;

#[cfg(test)]
mod fakes;
