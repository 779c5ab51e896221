// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Registration table for adapter callbacks.
//!
//! Same discipline as the domain event bus: synchronous dispatch on the
//! emitting task, snapshot before invoking so a handler can remove itself
//! (or any other) mid-dispatch.

use parking_lot::Mutex;
use std::sync::{Arc, Weak};

type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Inner<T> {
    next_id: u64,
    handlers: Vec<(u64, Handler<T>)>,
}

impl<T> Default for Inner<T> {
    fn default() -> Self {
        Self { next_id: 0, handlers: Vec::new() }
    }
}

/// A set of registered handlers for one callback kind.
pub struct HandlerSet<T> {
    inner: Arc<Mutex<Inner<T>>>,
}

impl<T> Default for HandlerSet<T> {
    fn default() -> Self {
        Self { inner: Arc::new(Mutex::new(Inner::default())) }
    }
}

impl<T: 'static> HandlerSet<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, handler: impl Fn(&T) + Send + Sync + 'static) -> HandlerSubscription {
        let mut inner = self.inner.lock();
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, Arc::new(handler)));
        HandlerSubscription { id, set: Arc::downgrade(&self.inner) as Weak<dyn Unregister> }
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Handler<T>> =
            self.inner.lock().handlers.iter().map(|(_, h)| Arc::clone(h)).collect();
        for handler in snapshot {
            handler(value);
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

trait Unregister: Send + Sync {
    fn unregister(&self, id: u64);
}

impl<T> Unregister for Mutex<Inner<T>> {
    fn unregister(&self, id: u64) {
        self.lock().handlers.retain(|(hid, _)| *hid != id);
    }
}

/// Value-typed handle for one registration; disposing it removes the
/// handler. Type-erased so callers can hold subscriptions to differently
/// typed handler sets in one collection.
pub struct HandlerSubscription {
    id: u64,
    set: Weak<dyn Unregister>,
}

impl HandlerSubscription {
    pub fn unsubscribe(self) {
        if let Some(set) = self.set.upgrade() {
            set.unregister(self.id);
        }
    }
}

impl std::fmt::Debug for HandlerSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSubscription").field("id", &self.id).finish()
    }
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
