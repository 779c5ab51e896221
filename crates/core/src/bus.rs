// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-process pub/sub for domain events.
//!
//! One logical channel (`"agent"`). Delivery is synchronous on the emitting
//! thread: listeners must not block — long work belongs on a task the
//! listener spawns. Fan-out is unordered and at-most-once per registration.
//!
//! The listener list is snapshotted before dispatch, so a listener may
//! unsubscribe itself (or any other) mid-dispatch without corrupting the
//! iteration; the removed listener can still receive the event currently
//! in flight.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

use crate::event::DomainEvent;

type Listener = Arc<dyn Fn(&DomainEvent) + Send + Sync>;

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(u64, Listener)>,
}

/// Synchronous fan-out of [`DomainEvent`]s. Cheap to clone; all clones
/// share one listener table.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. The returned [`Subscription`] is the only way
    /// to remove it.
    pub fn subscribe(
        &self,
        listener: impl Fn(&DomainEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        Subscription { id, bus: Arc::downgrade(&self.inner) }
    }

    /// Emit an event to every registered listener.
    pub fn emit(&self, event: &DomainEvent) {
        // Snapshot under the lock, dispatch outside it, so listeners can
        // subscribe/unsubscribe (or emit) without deadlocking.
        let snapshot: Vec<Listener> =
            self.inner.lock().listeners.iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in snapshot {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.lock().listeners.len()
    }
}

/// Value-typed handle for one bus registration. Can be stored, compared,
/// and disposed; dropping it without calling [`Subscription::unsubscribe`]
/// leaves the listener registered.
#[derive(Clone)]
pub struct Subscription {
    id: u64,
    bus: Weak<Mutex<BusInner>>,
}

impl Subscription {
    /// Remove the listener. Safe to call while a dispatch is in flight and
    /// after the bus itself has been dropped.
    pub fn unsubscribe(self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.lock().listeners.retain(|(id, _)| *id != self.id);
        }
    }
}

impl PartialEq for Subscription {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Weak::ptr_eq(&self.bus, &other.bus)
    }
}

impl Eq for Subscription {}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "bus_tests.rs"]
mod tests;
