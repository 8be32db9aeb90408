// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Shared context for the reconciler and the leadership hooks.
//!
//! Everything that processes queue events receives an `Arc<Context>` holding:
//! - the event queue every watch callback feeds
//! - the registry of live remote cluster connections
//! - the seams to the outside world (remote cluster connector, `ServiceImport` store)
//! - the leadership gate, open only while this replica holds the lease

use crate::events::Event;
use crate::imports::ServiceImportStore;
use crate::leader::LeadershipGate;
use crate::queue::EventQueue;
use crate::registry::LinkRegistry;
use crate::remote::ClusterConnector;
use std::sync::Arc;

/// Shared context passed to the reconciler and the leadership hooks.
#[derive(Clone)]
pub struct Context {
    /// Queue of pending events
    pub queue: EventQueue<Event>,

    /// Live remote cluster connections
    pub registry: Arc<LinkRegistry>,

    /// Builds remote cluster connections from Links
    pub connector: Arc<dyn ClusterConnector>,

    /// Reads and writes `ServiceImport` objects
    pub imports: Arc<dyn ServiceImportStore>,

    /// Open while this replica leads; events are only applied while open
    pub leadership: LeadershipGate,
}

impl Context {
    /// Creates a context with an empty registry and a closed leadership gate.
    #[must_use]
    pub fn new(
        queue: EventQueue<Event>,
        connector: Arc<dyn ClusterConnector>,
        imports: Arc<dyn ServiceImportStore>,
    ) -> Self {
        Self {
            queue,
            registry: Arc::new(LinkRegistry::new()),
            connector,
            imports,
            leadership: LeadershipGate::new(),
        }
    }
}

#[cfg(test)]
#[path = "context_tests.rs"]
mod context_tests;
