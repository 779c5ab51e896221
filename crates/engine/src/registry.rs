// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory index of live executions with reservation-based admission.
//!
//! The triple index (`id → ctx`, `thread_id → id`, `chat_id → ids`) and
//! the reservation table live behind one lock, so `try_reserve*` is a
//! single critical section. Reservations close the TOCTOU window between
//! the capacity check and the moment the adapter's async setup completes
//! and the context is actually registered; they count against both limits
//! and must be released on every failure path.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use forks_core::ChatId;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// What kind of execution a context tracks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionType {
    Subagent,
    Attempt,
}

forks_core::display_as! {
    ExecutionType {
        Subagent => "subagent",
        Attempt => "attempt",
    }
}

/// One live execution. `id` is the subagent or attempt id; `thread_id`
/// uniquely identifies the execution while it lives.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub id: String,
    pub chat_id: ChatId,
    pub execution_type: ExecutionType,
    pub thread_id: String,
    pub run_id: String,
    pub cwd: PathBuf,
    pub cancel: CancellationToken,
}

#[derive(Default)]
struct Indexes {
    contexts: HashMap<String, ExecutionContext>,
    by_thread: HashMap<String, String>,
    by_chat: HashMap<ChatId, HashSet<String>>,
    reservations: HashMap<String, ChatId>,
}

impl Indexes {
    fn chat_load(&self, chat_id: &ChatId) -> usize {
        let live = self.by_chat.get(chat_id).map(|s| s.len()).unwrap_or(0);
        let reserved = self.reservations.values().filter(|c| *c == chat_id).count();
        live + reserved
    }

    fn total_load(&self) -> usize {
        self.contexts.len() + self.reservations.len()
    }
}

/// O(1) lookup of active executions by id, thread, and chat.
#[derive(Default)]
pub struct ExecutionRegistry {
    inner: Mutex<Indexes>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<ExecutionContext> {
        self.inner.lock().contexts.get(id).cloned()
    }

    pub fn get_by_thread(&self, thread_id: &str) -> Option<ExecutionContext> {
        let inner = self.inner.lock();
        let id = inner.by_thread.get(thread_id)?;
        inner.contexts.get(id).cloned()
    }

    pub fn get_all_by_chat(&self, chat_id: &ChatId) -> Vec<ExecutionContext> {
        let inner = self.inner.lock();
        inner
            .by_chat
            .get(chat_id)
            .map(|ids| ids.iter().filter_map(|id| inner.contexts.get(id).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn count_by_chat(&self, chat_id: &ChatId) -> usize {
        self.inner.lock().by_chat.get(chat_id).map(|s| s.len()).unwrap_or(0)
    }

    pub fn values(&self) -> Vec<ExecutionContext> {
        self.inner.lock().contexts.values().cloned().collect()
    }

    /// Live contexts plus outstanding reservations.
    pub fn size(&self) -> usize {
        self.inner.lock().total_load()
    }

    /// Atomically reserve one slot for `chat_id`. Returns false when either
    /// limit would be exceeded or the id is already present.
    pub fn try_reserve_for_chat(
        &self,
        id: &str,
        chat_id: &ChatId,
        max_global: usize,
        max_per_chat: usize,
    ) -> bool {
        let mut inner = self.inner.lock();
        if inner.contexts.contains_key(id) || inner.reservations.contains_key(id) {
            return false;
        }
        if inner.total_load() >= max_global || inner.chat_load(chat_id) >= max_per_chat {
            return false;
        }
        inner.reservations.insert(id.to_string(), *chat_id);
        true
    }

    /// Atomically reserve slots for a whole batch against one chat; all or
    /// nothing.
    pub fn try_reserve_batch(
        &self,
        ids: &[String],
        chat_id: &ChatId,
        max_global: usize,
        max_per_chat: usize,
    ) -> bool {
        let mut inner = self.inner.lock();
        let duplicate = ids
            .iter()
            .any(|id| inner.contexts.contains_key(id) || inner.reservations.contains_key(id));
        if duplicate {
            return false;
        }
        if inner.total_load() + ids.len() > max_global
            || inner.chat_load(chat_id) + ids.len() > max_per_chat
        {
            return false;
        }
        for id in ids {
            inner.reservations.insert(id.clone(), *chat_id);
        }
        true
    }

    /// Promote a reservation to a live context, creating the thread and
    /// chat indices. Also accepts contexts that were never reserved (the
    /// reservation, if any, is consumed).
    pub fn set(&self, ctx: ExecutionContext) {
        let mut inner = self.inner.lock();
        inner.reservations.remove(&ctx.id);
        inner.by_thread.insert(ctx.thread_id.clone(), ctx.id.clone());
        inner.by_chat.entry(ctx.chat_id).or_default().insert(ctx.id.clone());
        inner.contexts.insert(ctx.id.clone(), ctx);
    }

    pub fn release_reservation(&self, id: &str) {
        self.inner.lock().reservations.remove(id);
    }

    /// Drop a live context and all its index entries.
    pub fn remove(&self, id: &str) -> Option<ExecutionContext> {
        let mut inner = self.inner.lock();
        let ctx = inner.contexts.remove(id)?;
        inner.by_thread.remove(&ctx.thread_id);
        if let Some(ids) = inner.by_chat.get_mut(&ctx.chat_id) {
            ids.remove(id);
            if ids.is_empty() {
                inner.by_chat.remove(&ctx.chat_id);
            }
        }
        Some(ctx)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.contexts.clear();
        inner.by_thread.clear();
        inner.by_chat.clear();
        inner.reservations.clear();
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
