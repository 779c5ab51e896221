// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Recording fake adapter for engine and gateway tests.
//!
//! Threads and runs get sequential ids (`th-1`, `run-1`). Tests inject
//! events with [`FakeAgentAdapter::emit_event`] and observe the calls the
//! code under test made.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::agent::{
    AdapterDecision, AdapterError, AdapterEvent, AgentAdapter, ApprovalRequest, ForkOptions,
    ThreadHandle, TurnOptions,
};
use crate::handlers::{HandlerSet, HandlerSubscription};

/// One `send_turn` call as observed by the fake.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedTurn {
    pub thread_id: String,
    pub prompt: String,
    pub cwd: Option<PathBuf>,
    pub run_id: String,
}

#[derive(Default)]
struct Recorded {
    started_threads: Vec<String>,
    forked_threads: Vec<(String, String)>,
    turns: Vec<RecordedTurn>,
    cancelled_runs: Vec<String>,
    approval_responses: Vec<(String, AdapterDecision)>,
}

#[derive(Default)]
pub struct FakeAgentAdapter {
    next_thread: AtomicU64,
    next_run: AtomicU64,
    recorded: Mutex<Recorded>,
    /// Tokens the fake treats as known for `respond_to_approval`.
    known_tokens: Mutex<HashSet<String>>,
    fail_start_thread: AtomicBool,
    fail_send_turn: AtomicBool,
    events: HandlerSet<AdapterEvent>,
    approvals: HandlerSet<ApprovalRequest>,
}

impl FakeAgentAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `start_thread` calls fail.
    pub fn fail_start_thread(&self, fail: bool) {
        self.fail_start_thread.store(fail, Ordering::SeqCst);
    }

    /// Make the next `send_turn` calls fail.
    pub fn fail_send_turn(&self, fail: bool) {
        self.fail_send_turn.store(fail, Ordering::SeqCst);
    }

    /// Deliver an event to every registered handler, as the real adapter
    /// bridge would.
    pub fn emit_event(&self, event: AdapterEvent) {
        self.events.emit(&event);
    }

    /// Deliver an approval request to every registered handler.
    pub fn emit_approval_request(&self, request: ApprovalRequest) {
        self.known_tokens.lock().insert(request.token.as_str().to_string());
        self.approvals.emit(&request);
    }

    pub fn started_threads(&self) -> Vec<String> {
        self.recorded.lock().started_threads.clone()
    }

    pub fn forked_threads(&self) -> Vec<(String, String)> {
        self.recorded.lock().forked_threads.clone()
    }

    pub fn turns(&self) -> Vec<RecordedTurn> {
        self.recorded.lock().turns.clone()
    }

    pub fn cancelled_runs(&self) -> Vec<String> {
        self.recorded.lock().cancelled_runs.clone()
    }

    pub fn approval_responses(&self) -> Vec<(String, AdapterDecision)> {
        self.recorded.lock().approval_responses.clone()
    }

    fn next_thread_id(&self) -> String {
        format!("th-{}", self.next_thread.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl AgentAdapter for FakeAgentAdapter {
    async fn start_thread(&self) -> Result<ThreadHandle, AdapterError> {
        if self.fail_start_thread.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("fake: start_thread disabled".into()));
        }
        let id = self.next_thread_id();
        self.recorded.lock().started_threads.push(id.clone());
        Ok(ThreadHandle { id })
    }

    async fn fork_thread(
        &self,
        parent_thread_id: &str,
        _opts: ForkOptions,
    ) -> Result<ThreadHandle, AdapterError> {
        let id = self.next_thread_id();
        self.recorded.lock().forked_threads.push((parent_thread_id.to_string(), id.clone()));
        Ok(ThreadHandle { id })
    }

    async fn send_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        opts: TurnOptions,
    ) -> Result<String, AdapterError> {
        if self.fail_send_turn.load(Ordering::SeqCst) {
            return Err(AdapterError::Unavailable("fake: send_turn disabled".into()));
        }
        let run_id = format!("run-{}", self.next_run.fetch_add(1, Ordering::SeqCst) + 1);
        self.recorded.lock().turns.push(RecordedTurn {
            thread_id: thread_id.to_string(),
            prompt: prompt.to_string(),
            cwd: opts.cwd,
            run_id: run_id.clone(),
        });
        Ok(run_id)
    }

    async fn cancel(&self, run_id: &str) -> Result<(), AdapterError> {
        self.recorded.lock().cancelled_runs.push(run_id.to_string());
        Ok(())
    }

    async fn respond_to_approval(
        &self,
        token: &str,
        decision: AdapterDecision,
    ) -> Result<bool, AdapterError> {
        self.recorded.lock().approval_responses.push((token.to_string(), decision));
        Ok(self.known_tokens.lock().contains(token))
    }

    fn on_event(
        &self,
        handler: Box<dyn Fn(&AdapterEvent) + Send + Sync>,
    ) -> HandlerSubscription {
        self.events.register(handler)
    }

    fn on_approval_request(
        &self,
        handler: Box<dyn Fn(&ApprovalRequest) + Send + Sync>,
    ) -> HandlerSubscription {
        self.approvals.register(handler)
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
