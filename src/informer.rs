// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Watched resources with callback registration.
//!
//! An [`Informer`] runs a kube-rs watcher for one resource type, keeps the objects
//! in a reflector [`Store`], and turns the watch stream into `on_add` / `on_update`
//! / `on_delete` calls on every registered [`ResourceEventHandler`].
//!
//! # Event translation
//!
//! - `Apply` of an object missing from the cache is an add, otherwise an update
//!   with the cached object as the old state
//! - `Delete` is a delete
//! - a re-list (`Init` .. `InitDone`) reports relisted objects as adds or updates,
//!   and objects that vanished while the watch was down as deletes
//!
//! Registering a handler replays the current view, including objects of a re-list
//! in progress, to it as adds, so a late handler still observes every object.
//! Cache updates and handler dispatch happen under the same lock that registration
//! takes, so a handler never misses an event between its replay and its first live
//! event.

use crate::errors::InformerError;
use futures::{Stream, StreamExt};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

/// Callbacks invoked for changes to a watched resource.
///
/// Implementations must not block: they run on the watch task.
pub trait ResourceEventHandler<K>: Send + Sync {
    /// An object appeared.
    fn on_add(&self, obj: &K);

    /// An object changed.
    fn on_update(&self, old: &K, new: &K);

    /// An object was removed.
    fn on_delete(&self, obj: &K);
}

/// Identifies a registered handler for later removal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

struct Handlers<K> {
    next_id: u64,
    entries: Vec<(HandlerId, Arc<dyn ResourceEventHandler<K>>)>,
}

impl<K> Default for Handlers<K> {
    fn default() -> Self {
        Self {
            next_id: 0,
            entries: Vec::new(),
        }
    }
}

impl<K> Handlers<K> {
    fn insert(&mut self, handler: Arc<dyn ResourceEventHandler<K>>) -> HandlerId {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.entries.push((id, handler));
        id
    }

    fn remove(&mut self, id: HandlerId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(entry, _)| *entry != id);
        self.entries.len() != before
    }

    fn add(&self, obj: &K) {
        for (_, handler) in &self.entries {
            handler.on_add(obj);
        }
    }

    fn update(&self, old: &K, new: &K) {
        for (_, handler) in &self.entries {
            handler.on_update(old, new);
        }
    }

    fn delete(&self, obj: &K) {
        for (_, handler) in &self.entries {
            handler.on_delete(obj);
        }
    }
}

/// State shared between the watch task and handler registration.
///
/// The reflector store only reflects a re-list at `InitDone`; objects already
/// dispatched during the re-list are kept in `relisted` until then.
struct Shared<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    handlers: Handlers<K>,
    relisted: HashMap<ObjectRef<K>, Arc<K>>,
}

impl<K> Default for Shared<K>
where
    K: Resource + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    fn default() -> Self {
        Self {
            handlers: Handlers::default(),
            relisted: HashMap::new(),
        }
    }
}

/// Applies watcher events to the cache and fans them out to handlers.
struct Dispatcher<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    kind: String,
    writer: Writer<K>,
    reader: Store<K>,
    shared: Arc<RwLock<Shared<K>>>,
}

impl<K> Dispatcher<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    /// Returns false once the shared state is unusable.
    fn handle(&mut self, event: &watcher::Event<K>) -> bool {
        let Ok(mut shared) = self.shared.write() else {
            error!(kind = %self.kind, "Event handler table poisoned, stopping watch");
            return false;
        };

        match event {
            watcher::Event::Init => {
                debug!(kind = %self.kind, "Watch (re)listing");
                shared.relisted.clear();
                self.writer.apply_watcher_event(event);
            }
            watcher::Event::InitApply(obj) => {
                let key = ObjectRef::from_obj(obj);
                let old = shared
                    .relisted
                    .get(&key)
                    .cloned()
                    .or_else(|| self.reader.get(&key));
                shared.relisted.insert(key, Arc::new(obj.clone()));
                self.writer.apply_watcher_event(event);
                match old {
                    Some(old) => shared.handlers.update(&old, obj),
                    None => shared.handlers.add(obj),
                }
            }
            watcher::Event::Apply(obj) => {
                let old = self.reader.get(&ObjectRef::from_obj(obj));
                self.writer.apply_watcher_event(event);
                match old {
                    Some(old) => shared.handlers.update(&old, obj),
                    None => shared.handlers.add(obj),
                }
            }
            watcher::Event::Delete(obj) => {
                self.writer.apply_watcher_event(event);
                shared.handlers.delete(obj);
            }
            watcher::Event::InitDone => {
                let stale: Vec<Arc<K>> = self
                    .reader
                    .state()
                    .into_iter()
                    .filter(|obj| !shared.relisted.contains_key(&ObjectRef::from_obj(obj.as_ref())))
                    .collect();
                self.writer.apply_watcher_event(event);
                shared.relisted.clear();
                for obj in stale {
                    shared.handlers.delete(&obj);
                }
                debug!(kind = %self.kind, objects = self.reader.state().len(), "Watch cache synced");
            }
        }
        true
    }
}

/// A live, cached watch over one resource type.
///
/// Dropping the informer stops its watch.
pub struct Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    kind: String,
    store: Store<K>,
    shared: Arc<RwLock<Shared<K>>>,
    task: JoinHandle<()>,
}

impl<K> Debug for Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl<K> Informer<K>
where
    K: Resource + Clone + Debug + DeserializeOwned + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    /// Starts watching `api` with the default watcher backoff.
    #[must_use]
    pub fn spawn(api: Api<K>, config: watcher::Config) -> Self {
        let kind = K::kind(&K::DynamicType::default()).to_string();
        Self::from_stream(kind, watcher(api, config).default_backoff())
    }
}

impl<K> Informer<K>
where
    K: Resource + Clone + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone + Send + Sync,
{
    /// Builds an informer over an arbitrary watcher event stream.
    ///
    /// Stream errors are logged and skipped; the stream itself is expected to retry.
    pub fn from_stream<S>(kind: impl Into<String>, stream: S) -> Self
    where
        S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
    {
        let kind = kind.into();
        let (store, writer) = reflector::store();
        let shared = Arc::new(RwLock::new(Shared::default()));

        let mut dispatcher = Dispatcher {
            kind: kind.clone(),
            writer,
            reader: store.clone(),
            shared: Arc::clone(&shared),
        };

        let task = tokio::spawn(async move {
            let mut stream = std::pin::pin!(stream);
            while let Some(result) = stream.next().await {
                match result {
                    Ok(event) => {
                        if !dispatcher.handle(&event) {
                            return;
                        }
                    }
                    Err(error) => {
                        warn!(kind = %dispatcher.kind, %error, "Watch error, retrying");
                    }
                }
            }
            debug!(kind = %dispatcher.kind, "Watch stream ended");
        });

        Self {
            kind,
            store,
            shared,
            task,
        }
    }

    /// Kind of the watched resource.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Registers a handler and replays the current cache to it as adds.
    ///
    /// # Errors
    ///
    /// Fails if the watch has stopped or the handler table is poisoned.
    pub fn add_handler(
        &self,
        handler: Arc<dyn ResourceEventHandler<K>>,
    ) -> Result<HandlerId, InformerError> {
        if self.task.is_finished() {
            return Err(InformerError::Stopped {
                kind: self.kind.clone(),
            });
        }
        let mut shared = self
            .shared
            .write()
            .map_err(|_| InformerError::HandlerLockPoisoned {
                kind: self.kind.clone(),
            })?;

        for obj in self.store.state() {
            if !shared.relisted.contains_key(&ObjectRef::from_obj(obj.as_ref())) {
                handler.on_add(&obj);
            }
        }
        for obj in shared.relisted.values() {
            handler.on_add(obj);
        }
        Ok(shared.handlers.insert(handler))
    }

    /// Removes a handler. Returns false if it was not registered.
    ///
    /// Once this returns, the handler receives no further callbacks.
    ///
    /// # Errors
    ///
    /// Fails if the handler table is poisoned.
    pub fn remove_handler(&self, id: HandlerId) -> Result<bool, InformerError> {
        let mut shared = self
            .shared
            .write()
            .map_err(|_| InformerError::HandlerLockPoisoned {
                kind: self.kind.clone(),
            })?;
        Ok(shared.handlers.remove(id))
    }

    /// Snapshot of the cached objects.
    #[must_use]
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    /// Waits until the initial list has completed.
    ///
    /// # Errors
    ///
    /// Fails on timeout or if the watch stopped before syncing.
    pub async fn wait_until_synced(&self, timeout: Duration) -> Result<(), InformerError> {
        match tokio::time::timeout(timeout, self.store.wait_until_ready()).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(InformerError::Stopped {
                kind: self.kind.clone(),
            }),
            Err(_) => Err(InformerError::SyncTimeout {
                kind: self.kind.clone(),
                timeout,
            }),
        }
    }

    /// Cancels the watch. Handlers receive no further callbacks.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Returns true once the watch task has ended.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.task.is_finished()
    }
}

impl<K> Drop for Informer<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "informer_tests.rs"]
mod informer_tests;
