// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Ordered, retryable work queue.
//!
//! All watch callbacks push into one [`EventQueue`]; a single consumer drains it.
//! The queue guarantees:
//!
//! - **Identity** - every [`EventQueue::add`] creates a distinct [`Queued`] entry,
//!   even for equal values, so a later notification is never absorbed by an
//!   earlier one. Only a retried entry re-added while still pending collapses.
//! - **Single processing** - an entry handed out by [`EventQueue::get`] is not handed
//!   out again until [`EventQueue::done`] is called; a retry arriving in the
//!   meantime is parked and re-queued on `done`
//! - **Per-entry backoff** - [`EventQueue::add_rate_limited`] re-adds an entry after
//!   an exponentially growing delay tracked per entry until [`EventQueue::forget`]
//! - **Drain on shutdown** - after shutdown, no new items are accepted but entries
//!   already queued are still handed out; [`EventQueue::shut_down_with_drain`]
//!   waits until they are all processed
//!
//! # Example
//!
//! ```rust,no_run
//! use meshimport::queue::EventQueue;
//!
//! # async fn example() {
//! let queue = EventQueue::<String>::new();
//! queue.add("east".to_string());
//!
//! while let Some(entry) = queue.get().await {
//!     // process entry.item()...
//!     queue.forget(&entry);
//!     queue.done(&entry);
//! }
//! # }
//! ```

use crate::constants::{QUEUE_BASE_DELAY_MILLIS, QUEUE_MAX_DELAY_SECS};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::Deref;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tracing::trace;

/// Per-item exponential backoff.
///
/// The n-th consecutive failure of an item waits `base * 2^n`, capped at `max`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialBackoff {
    /// Delay after the first failure
    pub base: Duration,
    /// Upper bound for any delay
    pub max: Duration,
}

impl ExponentialBackoff {
    /// Delay before the retry that follows `failures` previous failures.
    #[must_use]
    pub fn delay(&self, failures: u32) -> Duration {
        let factor = 2u32.checked_pow(failures).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.max)
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            base: Duration::from_millis(QUEUE_BASE_DELAY_MILLIS),
            max: Duration::from_secs(QUEUE_MAX_DELAY_SECS),
        }
    }
}

/// An entry handed out by [`EventQueue::get`].
///
/// Entries are ordered by sequence number: a higher number was added later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Queued<T> {
    seq: u64,
    item: T,
}

impl<T> Queued<T> {
    /// Position of this entry in the order of [`EventQueue::add`] calls.
    #[must_use]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// The queued value.
    #[must_use]
    pub fn item(&self) -> &T {
        &self.item
    }

    /// Unwraps the queued value.
    #[must_use]
    pub fn into_inner(self) -> T {
        self.item
    }
}

impl<T> Deref for Queued<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.item
    }
}

struct State<T> {
    queue: VecDeque<Queued<T>>,
    pending: HashSet<u64>,
    processing: HashSet<u64>,
    parked: HashMap<u64, Queued<T>>,
    failures: HashMap<u64, u32>,
    next_seq: u64,
    // Bumped by `clear`; retries scheduled before that are discarded.
    generation: u64,
    shutting_down: bool,
}

impl<T> State<T> {
    fn is_drained(&self) -> bool {
        self.queue.is_empty() && self.processing.is_empty()
    }
}

struct Shared<T> {
    state: Mutex<State<T>>,
    backoff: ExponentialBackoff,
    item_ready: Notify,
    drained: Notify,
}

/// Multi-producer, single-consumer work queue. Cloning yields another handle to
/// the same queue.
pub struct EventQueue<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for EventQueue<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for EventQueue<T>
where
    T: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> EventQueue<T>
where
    T: Clone + Send + 'static,
{
    /// Creates an empty queue with the default backoff.
    #[must_use]
    pub fn new() -> Self {
        Self::with_backoff(ExponentialBackoff::default())
    }

    /// Creates an empty queue with a custom retry backoff.
    #[must_use]
    pub fn with_backoff(backoff: ExponentialBackoff) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    pending: HashSet::new(),
                    processing: HashSet::new(),
                    parked: HashMap::new(),
                    failures: HashMap::new(),
                    next_seq: 0,
                    generation: 0,
                    shutting_down: false,
                }),
                backoff,
                item_ready: Notify::new(),
                drained: Notify::new(),
            }),
        }
    }

    // A panic while holding the lock cannot leave the collections half-updated,
    // so a poisoned lock is still usable.
    fn lock(&self) -> MutexGuard<'_, State<T>> {
        self.shared
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds an item as a new entry. Never blocks.
    ///
    /// Returns `false` if the queue is shutting down and the item was rejected.
    pub fn add(&self, item: T) -> bool {
        let mut state = self.lock();
        if state.shutting_down {
            return false;
        }
        let seq = state.next_seq;
        state.next_seq += 1;
        state.pending.insert(seq);
        state.queue.push_back(Queued { seq, item });
        drop(state);
        self.shared.item_ready.notify_one();
        true
    }

    fn readd(&self, entry: Queued<T>, generation: u64) {
        let mut state = self.lock();
        if state.shutting_down || state.generation != generation {
            return;
        }
        if !state.pending.insert(entry.seq) {
            trace!(seq = entry.seq, "entry already queued, collapsing");
            return;
        }
        if state.processing.contains(&entry.seq) {
            // Re-queued by `done`.
            state.parked.insert(entry.seq, entry);
            return;
        }
        state.queue.push_back(entry);
        drop(state);
        self.shared.item_ready.notify_one();
    }

    /// Re-adds an entry after its backoff delay and records one more failure for it.
    pub fn add_rate_limited(&self, entry: Queued<T>) {
        let (delay, generation) = {
            let mut state = self.lock();
            if state.shutting_down {
                return;
            }
            let failures = state.failures.entry(entry.seq).or_insert(0);
            let delay = self.shared.backoff.delay(*failures);
            *failures += 1;
            (delay, state.generation)
        };

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            queue.readd(entry, generation);
        });
    }

    /// Clears the failure history of an entry.
    pub fn forget(&self, entry: &Queued<T>) {
        self.lock().failures.remove(&entry.seq);
    }

    /// Number of times an entry has been re-added through [`Self::add_rate_limited`].
    #[must_use]
    pub fn num_requeues(&self, entry: &Queued<T>) -> u32 {
        self.lock().failures.get(&entry.seq).copied().unwrap_or(0)
    }

    /// Waits for the next entry.
    ///
    /// Returns `None` once the queue is shut down and empty.
    pub async fn get(&self) -> Option<Queued<T>> {
        loop {
            let notified = self.shared.item_ready.notified();
            {
                let mut state = self.lock();
                if let Some(entry) = state.queue.pop_front() {
                    state.pending.remove(&entry.seq);
                    state.processing.insert(entry.seq);
                    return Some(entry);
                }
                if state.shutting_down {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// Marks an entry handed out by [`Self::get`] as finished.
    pub fn done(&self, entry: &Queued<T>) {
        let mut state = self.lock();
        state.processing.remove(&entry.seq);
        if let Some(parked) = state.parked.remove(&entry.seq) {
            state.queue.push_back(parked);
            self.shared.item_ready.notify_one();
        }
        if state.is_drained() {
            self.shared.drained.notify_waiters();
        }
    }

    /// Discards every waiting entry and every scheduled retry.
    ///
    /// Entries being processed are unaffected. Returns the number of entries
    /// discarded from the queue.
    pub fn clear(&self) -> usize {
        let mut state = self.lock();
        let discarded = state.queue.len() + state.parked.len();
        state.queue.clear();
        state.parked.clear();
        state.pending.clear();
        state.failures.clear();
        state.generation += 1;
        if state.is_drained() {
            self.shared.drained.notify_waiters();
        }
        discarded
    }

    /// Stops accepting new items. Queued entries are still handed out.
    pub fn shut_down(&self) {
        self.lock().shutting_down = true;
        self.shared.item_ready.notify_waiters();
        self.shared.item_ready.notify_one();
    }

    /// Stops accepting new items and waits until every queued and in-flight entry
    /// has been marked done.
    pub async fn shut_down_with_drain(&self) {
        self.shut_down();
        loop {
            let drained = self.shared.drained.notified();
            if self.lock().is_drained() {
                return;
            }
            drained.await;
        }
    }

    /// Returns true once shutdown has been requested.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.lock().shutting_down
    }

    /// Number of entries waiting to be handed out.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Returns true when no entry is waiting.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod queue_tests;
