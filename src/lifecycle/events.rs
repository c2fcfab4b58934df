// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! Subscription registries
//!
//! Handlers run synchronously, outside any lock held by the notifier. A
//! panicking handler is logged and skipped; the remaining handlers still run.
//!
//! State owners queue their notifications in an [`Outbox`] while still holding
//! their state lock, so delivery follows commit order. Notifications tagged
//! with a generation are dropped if that generation was superseded before
//! delivery.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error};

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Identifies one registered handler; unique across all registries in the process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    fn next() -> Self {
        SubscriptionId(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Handlers for one kind of notification
pub struct Subscribers<T> {
    name: &'static str,
    handlers: Mutex<Vec<(SubscriptionId, Handler<T>)>>,
}

impl<T> Subscribers<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            handlers: Mutex::new(Vec::new()),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = SubscriptionId::next();
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns whether `id` was registered here
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(existing, _)| *existing != id);
        handlers.len() != before
    }

    pub fn len(&self) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Call every handler with `event`; returns how many of them panicked
    pub fn emit(&self, event: &T) -> usize {
        // Snapshot so handlers may (un)subscribe without deadlocking
        let snapshot: Vec<(SubscriptionId, Handler<T>)> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut panicked = 0;
        for (id, handler) in snapshot {
            if catch_unwind(AssertUnwindSafe(|| handler(event))).is_err() {
                panicked += 1;
                error!(registry = self.name, subscription = %id, "Subscriber panicked, continuing");
            }
        }
        panicked
    }
}

/// Event whose kind can be used to filter subscriptions
pub trait Event {
    type Kind: Copy + PartialEq + fmt::Debug + Send + Sync + 'static;

    fn kind(&self) -> Self::Kind;
}

/// Subscriptions keyed by event kind
pub struct EventRegistry<E: Event> {
    subscribers: Subscribers<E>,
}

impl<E: Event + 'static> EventRegistry<E> {
    pub fn new(name: &'static str) -> Self {
        Self {
            subscribers: Subscribers::new(name),
        }
    }

    pub fn on<F>(&self, kind: E::Kind, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.subscribers.subscribe(move |event: &E| {
            if event.kind() == kind {
                handler(event);
            }
        })
    }

    pub fn off(&self, id: SubscriptionId) -> bool {
        self.subscribers.unsubscribe(id)
    }

    pub fn emit(&self, event: &E) -> usize {
        self.subscribers.emit(event)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

struct OutboxState<T> {
    queue: VecDeque<(Option<u64>, T)>,
    draining: bool,
}

/// Ordered notification queue with a single deliverer at a time
///
/// A caller that finds delivery already running (on another thread, or
/// further up its own stack when a handler calls back into the owner) leaves
/// its notifications to the running deliverer.
pub(crate) struct Outbox<T> {
    state: Mutex<OutboxState<T>>,
}

impl<T> Outbox<T> {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(OutboxState {
                queue: VecDeque::new(),
                draining: false,
            }),
        }
    }

    /// Queue `notes`; call with the owner's state lock held.
    /// `origin` ties them to a generation, `None` means always deliver.
    pub(crate) fn push(&self, origin: Option<u64>, notes: impl IntoIterator<Item = T>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.queue.extend(notes.into_iter().map(|note| (origin, note)));
    }

    /// Deliver everything queued, in order; call without the state lock.
    /// `current` reads the owner's live generation.
    pub(crate) fn drain(&self, current: impl Fn() -> u64, mut deliver: impl FnMut(T)) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.draining {
                return;
            }
            state.draining = true;
        }

        loop {
            let next = {
                let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
                match state.queue.pop_front() {
                    Some(entry) => entry,
                    None => {
                        state.draining = false;
                        return;
                    }
                }
            };
            // Read after the pop: a supersede that already happened is always seen
            match next {
                (Some(origin), _) if origin != current() => {
                    debug!(origin, "Dropping notification from superseded generation");
                }
                (_, note) => deliver(note),
            }
        }
    }
}

/// Run a one-off callback with the same panic isolation as subscribers
pub(crate) fn call_isolated(label: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!(callback = label, "Callback panicked, continuing");
    }
}
