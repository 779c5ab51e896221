// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The approval broker: a synchronous "ask the user" over an asynchronous
//! event system.
//!
//! Each adapter request becomes a persisted approval row plus a waiter
//! keyed by token. The user's decision (or a timeout, or thread death)
//! resolves the waiter; the adapter only ever hears `accept` or `decline`.
//! A process-wide session cache keyed on `(type, command, cwd)` lets
//! child subagents inherit grants made on the parent thread.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forks_adapters::{AdapterDecision, AgentAdapter, ApprovalRequest};
use forks_core::{Approval, ApprovalType, ErrorKind};
use forks_storage::Store;
use forks_wire::ApprovalDecision;
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::registry::ExecutionRegistry;

/// How long a request may sit pending before it is cancelled.
pub const DEFAULT_APPROVAL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Cache key for a session grant. Deliberately excludes request ids,
/// tokens, and thread ids: the point is to recognize identical
/// invocations across threads.
type GrantKey = (ApprovalType, Option<String>, Option<PathBuf>);

struct Waiter {
    thread_id: String,
    tx: oneshot::Sender<AdapterDecision>,
}

pub struct ApprovalBroker {
    store: Arc<dyn Store>,
    adapter: Arc<dyn AgentAdapter>,
    registry: Arc<ExecutionRegistry>,
    waiters: Mutex<HashMap<String, Waiter>>,
    session_cache: Mutex<HashSet<GrantKey>>,
    timeout: Duration,
    stopping: AtomicBool,
}

impl ApprovalBroker {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<dyn AgentAdapter>,
        registry: Arc<ExecutionRegistry>,
    ) -> Self {
        Self::with_timeout(store, adapter, registry, DEFAULT_APPROVAL_TIMEOUT)
    }

    pub fn with_timeout(
        store: Arc<dyn Store>,
        adapter: Arc<dyn AgentAdapter>,
        registry: Arc<ExecutionRegistry>,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            adapter,
            registry,
            waiters: Mutex::new(HashMap::new()),
            session_cache: Mutex::new(HashSet::new()),
            timeout,
            stopping: AtomicBool::new(false),
        }
    }

    /// Handle one adapter approval request to completion. Runs as its own
    /// task; everything it awaits is bounded.
    pub async fn handle_request(&self, request: ApprovalRequest) {
        if self.stopping.load(Ordering::SeqCst) {
            self.respond(&request, AdapterDecision::Decline).await;
            return;
        }

        let key = grant_key(&request);
        if self.session_cache.lock().contains(&key) {
            tracing::debug!(token = %request.token, "session cache hit; auto-accepting");
            self.respond(&request, AdapterDecision::Accept).await;
            return;
        }

        // Resolve the owning chat; a request from a thread nobody owns is
        // declined outright.
        let Some(ctx) = self.registry.get_by_thread(&request.params.thread_id) else {
            tracing::warn!(
                thread_id = %request.params.thread_id,
                "approval request for unowned thread; declining"
            );
            self.respond(&request, AdapterDecision::Decline).await;
            return;
        };

        let mut approval = Approval::new(
            ctx.chat_id,
            request.approval_type,
            request.params.thread_id.as_str(),
            request.params.turn_id.as_str(),
            request.params.item_id.as_str(),
        );
        approval.token = request.token.clone();
        approval.command = request.params.command.clone();
        approval.cwd = request.params.cwd.clone();
        approval.reason = request.params.reason.clone();
        approval.data = request.params.data.clone();
        let approval_id = approval.id;

        // Row first, `requested` event second (the store emits it); only
        // then is the waiter armed.
        if let Err(e) = self.store.create_approval(approval) {
            tracing::error!(error = %e, "failed to persist approval; declining");
            self.respond(&request, AdapterDecision::Decline).await;
            return;
        }

        let (tx, rx) = oneshot::channel();
        self.waiters.lock().insert(
            request.token.as_str().to_string(),
            Waiter { thread_id: request.params.thread_id.clone(), tx },
        );

        let decision = match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(decision)) => decision,
            // Waiter dropped without a decision (shutdown race).
            Ok(Err(_)) => AdapterDecision::Decline,
            Err(_) => {
                self.waiters.lock().remove(request.token.as_str());
                self.expire(&approval_id)
            }
        };

        self.respond(&request, decision).await;
    }

    /// Resolve a pending approval from the user's response. Validates the
    /// token shape, transitions the row, updates the session cache, and
    /// unblocks the waiter.
    pub fn resolve(&self, token: &str, decision: ApprovalDecision) -> Result<Approval, ErrorKind> {
        if !forks_core::ApprovalToken::is_valid_shape(token) {
            return Err(ErrorKind::InvalidApprovalToken);
        }
        let row = self.store.get_approval_by_token(token).ok_or(ErrorKind::NotFound)?;
        let row = self
            .store
            .respond_to_approval(&row.id, decision.is_accept())
            .ok_or(ErrorKind::NotPending)?;

        if decision == ApprovalDecision::AcceptForSession {
            self.session_cache.lock().insert((
                row.approval_type,
                row.command.clone(),
                row.cwd.clone(),
            ));
        }

        self.notify(token, decision);
        Ok(row)
    }

    /// Unblock the waiter for `token`, if one is registered.
    fn notify(&self, token: &str, decision: ApprovalDecision) -> bool {
        let Some(waiter) = self.waiters.lock().remove(token) else {
            return false;
        };
        let adapter_decision =
            if decision.is_accept() { AdapterDecision::Accept } else { AdapterDecision::Decline };
        waiter.tx.send(adapter_decision).is_ok()
    }

    /// Decline and cancel every pending approval bound to a thread
    /// (execution cancelled or thread died).
    pub fn cancel_for_thread(&self, thread_id: &str) {
        let doomed: Vec<(String, Waiter)> = {
            let mut waiters = self.waiters.lock();
            let tokens: Vec<String> = waiters
                .iter()
                .filter(|(_, w)| w.thread_id == thread_id)
                .map(|(token, _)| token.clone())
                .collect();
            tokens
                .into_iter()
                .filter_map(|token| waiters.remove(&token).map(|w| (token, w)))
                .collect()
        };
        for (_, waiter) in doomed {
            let _ = waiter.tx.send(AdapterDecision::Decline);
        }

        // Rows transition to cancelled regardless of whether a waiter was
        // still alive for them.
        for row in self.store.pending_approvals_for_thread(thread_id) {
            self.store.cancel_approval(&row.id);
        }
    }

    /// Decline all waiters, cancel their rows, clear the session cache.
    pub fn shutdown(&self) {
        self.stopping.store(true, Ordering::SeqCst);
        let drained: Vec<(String, Waiter)> = self.waiters.lock().drain().collect();
        for (token, waiter) in drained {
            let _ = waiter.tx.send(AdapterDecision::Decline);
            if let Some(row) = self.store.get_approval_by_token(&token) {
                self.store.cancel_approval(&row.id);
            }
        }
        self.session_cache.lock().clear();
    }

    pub fn pending_waiters(&self) -> usize {
        self.waiters.lock().len()
    }

    pub fn session_cache_len(&self) -> usize {
        self.session_cache.lock().len()
    }

    /// Timeout expiry: re-read the row; if it is still pending, cancel it.
    /// A row resolved out-of-band wins over the timeout.
    fn expire(&self, approval_id: &forks_core::ApprovalId) -> AdapterDecision {
        match self.store.get_approval(approval_id).map(|row| row.status) {
            Some(forks_core::ApprovalStatus::Accepted) => AdapterDecision::Accept,
            Some(forks_core::ApprovalStatus::Pending) => {
                tracing::info!(approval = %approval_id, "approval timed out; cancelling");
                self.store.cancel_approval(approval_id);
                AdapterDecision::Decline
            }
            // Declined, cancelled, or gone.
            _ => AdapterDecision::Decline,
        }
    }

    async fn respond(&self, request: &ApprovalRequest, decision: AdapterDecision) {
        if let Err(e) = self.adapter.respond_to_approval(request.token.as_str(), decision).await {
            tracing::warn!(
                token = %request.token,
                %decision,
                error = %e,
                "failed to deliver approval decision to adapter"
            );
        }
    }
}

fn grant_key(request: &ApprovalRequest) -> GrantKey {
    (request.approval_type, request.params.command.clone(), request.params.cwd.clone())
}

#[cfg(test)]
#[path = "approval_tests.rs"]
mod tests;
