// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The orchestrator: drives the agent adapter and translates its event
//! stream into store updates.
//!
//! Admission goes through registry reservations so the capacity check and
//! the eventual registration cannot race. Every failure path releases its
//! reservation, drops accumulator state, and reclaims any partially
//! created worktree; after any completed path the registry is stable.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use forks_adapters::{
    AdapterEvent, AgentAdapter, ApprovalRequest, HandlerSubscription, TurnOptions,
};
use forks_core::{
    Attempt, AttemptId, AttemptStatus, ChatId, ErrorKind, Subagent, SubagentStatus,
};
use forks_storage::{AttemptPatch, Store, SubagentPatch};
use futures_util::future::join_all;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::accumulator::Accumulator;
use crate::approval::ApprovalBroker;
use crate::registry::{ExecutionContext, ExecutionRegistry, ExecutionType};
use crate::worktree::WorktreeManager;
use crate::{
    MAX_GLOBAL_EXECUTIONS, MAX_PER_CHAT_EXECUTIONS, MAX_RESULT_LEN, MAX_TASK_LEN,
};

/// Drain budget for cancelling all live executions on `stop`.
const STOP_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of one execution, as written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
}

pub struct Runner {
    store: Arc<dyn Store>,
    adapter: Arc<dyn AgentAdapter>,
    registry: Arc<ExecutionRegistry>,
    broker: Arc<ApprovalBroker>,
    worktrees: Arc<WorktreeManager>,
    accumulator: Accumulator,
    stopping: AtomicBool,
    subscriptions: Mutex<Vec<HandlerSubscription>>,
}

impl Runner {
    pub fn new(
        store: Arc<dyn Store>,
        adapter: Arc<dyn AgentAdapter>,
        registry: Arc<ExecutionRegistry>,
        broker: Arc<ApprovalBroker>,
        worktrees: Arc<WorktreeManager>,
    ) -> Self {
        Self {
            store,
            adapter,
            registry,
            broker,
            worktrees,
            accumulator: Accumulator::new(),
            stopping: AtomicBool::new(false),
            subscriptions: Mutex::new(Vec::new()),
        }
    }

    /// Subscribe to the adapter. Events queue onto a worker task so the
    /// adapter's dispatch thread never blocks; per-execution ordering is
    /// preserved because the worker drains sequentially.
    pub fn start(self: &Arc<Self>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel::<AdapterEvent>();
        let event_sub = self.adapter.on_event(Box::new(move |event| {
            let _ = event_tx.send(event.clone());
        }));

        let runner = Arc::clone(self);
        tokio::spawn(event_worker(runner, event_rx));

        let broker = Arc::clone(&self.broker);
        let approval_sub = self.adapter.on_approval_request(Box::new(move |request: &ApprovalRequest| {
            let broker = Arc::clone(&broker);
            let request = request.clone();
            tokio::spawn(async move { broker.handle_request(request).await });
        }));

        let mut subs = self.subscriptions.lock();
        subs.push(event_sub);
        subs.push(approval_sub);
    }

    // --- subagents ---

    /// Spawn a streamed subagent task under its parent chat.
    pub async fn execute_subagent(&self, subagent: Subagent) -> Result<(), ErrorKind> {
        let id = subagent.id;
        if self.store.get_subagent(&id).is_none() {
            self.store.create_subagent(subagent.clone());
        }

        if self.stopping.load(Ordering::SeqCst) {
            self.fail_subagent(&id, "Runner is stopping");
            return Err(ErrorKind::Internal("runner is stopping".into()));
        }
        if subagent.task.len() > MAX_TASK_LEN {
            self.fail_subagent(&id, "Task exceeds maximum length");
            return Err(ErrorKind::PayloadTooLarge(format!(
                "task is {} bytes (max {MAX_TASK_LEN})",
                subagent.task.len(),
            )));
        }

        let Some(chat) = self.store.get_chat(&subagent.parent_chat_id) else {
            self.fail_subagent(&id, "Parent chat not found");
            return Err(ErrorKind::NotFound);
        };

        if !self.registry.try_reserve_for_chat(
            id.as_str(),
            &chat.id,
            MAX_GLOBAL_EXECUTIONS,
            MAX_PER_CHAT_EXECUTIONS,
        ) {
            self.fail_subagent(&id, "Registry or concurrency limit exceeded");
            return Err(ErrorKind::ResourceExhausted("execution limit reached".into()));
        }

        match self.start_subagent_thread(&subagent, &chat.workspace_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.registry.release_reservation(id.as_str());
                self.fail_subagent(&id, &e.to_string());
                Err(e)
            }
        }
    }

    /// The async setup half of `execute_subagent`: everything after the
    /// reservation that can fail and must release it.
    async fn start_subagent_thread(
        &self,
        subagent: &Subagent,
        workspace_id: &forks_core::WorkspaceId,
    ) -> Result<(), ErrorKind> {
        let workspace = self.store.get_workspace(workspace_id).ok_or(ErrorKind::NotFound)?;
        let cwd = workspace.path.clone();

        let thread = self
            .adapter
            .start_thread()
            .await
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;
        if thread.id.is_empty() {
            return Err(ErrorKind::Internal("adapter returned an empty thread id".into()));
        }

        // Send before registering so no event can observe a context with a
        // missing run id.
        let run_id = self
            .adapter
            .send_turn(&thread.id, &subagent.task, TurnOptions { cwd: Some(cwd.clone()) })
            .await
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;

        self.registry.set(ExecutionContext {
            id: subagent.id.as_str().to_string(),
            chat_id: subagent.parent_chat_id,
            execution_type: ExecutionType::Subagent,
            thread_id: thread.id.clone(),
            run_id,
            cwd,
            cancel: CancellationToken::new(),
        });
        self.accumulator.init(&thread.id);
        Ok(())
    }

    // --- attempts ---

    /// Fan a task out over a batch of attempts, each on its own forked
    /// thread in its own worktree.
    pub async fn execute_attempt_batch(
        &self,
        attempts: Vec<Attempt>,
        task: &str,
        parent_summary: &str,
    ) -> Result<(), ErrorKind> {
        let Some(first) = attempts.first() else {
            return Ok(());
        };
        let chat_id = first.chat_id;

        for attempt in &attempts {
            if self.store.get_attempt(&attempt.id).is_none() {
                self.store.create_attempt(attempt.clone());
            }
        }

        if self.stopping.load(Ordering::SeqCst) {
            self.fail_attempts(&attempts, "Runner is stopping");
            return Err(ErrorKind::Internal("runner is stopping".into()));
        }
        if task.len() > MAX_TASK_LEN {
            self.fail_attempts(&attempts, "Task exceeds maximum length");
            return Err(ErrorKind::PayloadTooLarge(format!(
                "task is {} bytes (max {MAX_TASK_LEN})",
                task.len(),
            )));
        }

        let ids: Vec<String> = attempts.iter().map(|a| a.id.as_str().to_string()).collect();
        if !self.registry.try_reserve_batch(
            &ids,
            &chat_id,
            MAX_GLOBAL_EXECUTIONS,
            MAX_PER_CHAT_EXECUTIONS,
        ) {
            self.fail_attempts(&attempts, "Registry or concurrency limit exceeded");
            return Err(ErrorKind::ResourceExhausted("execution limit reached".into()));
        }

        let (chat, workspace) = match self.chat_workspace(&chat_id) {
            Ok(pair) => pair,
            Err(e) => {
                for attempt in &attempts {
                    self.registry.release_reservation(attempt.id.as_str());
                }
                self.fail_attempts(&attempts, "Chat or workspace not found");
                return Err(e);
            }
        };
        let Some(parent_thread_id) = chat.adapter_thread_id.clone() else {
            for attempt in &attempts {
                self.registry.release_reservation(attempt.id.as_str());
            }
            self.fail_attempts(&attempts, "Chat has no adapter thread to fork");
            return Err(ErrorKind::Conflict);
        };

        let prompt = compose_prompt(task, parent_summary);

        join_all(attempts.iter().map(|attempt| {
            let prompt = prompt.clone();
            let parent_thread_id = parent_thread_id.clone();
            let workspace = workspace.clone();
            async move {
                if let Err(e) =
                    self.start_attempt(attempt, &workspace, &parent_thread_id, &prompt).await
                {
                    tracing::warn!(attempt = %attempt.id, error = %e, "attempt setup failed");
                }
            }
        }))
        .await;
        Ok(())
    }

    /// Set up one attempt: worktree → row update → fork → row update →
    /// turn → registration. Any failure marks the attempt completed with
    /// an error, reclaims the partial worktree, and releases the slot.
    async fn start_attempt(
        &self,
        attempt: &Attempt,
        workspace: &forks_core::Workspace,
        parent_thread_id: &str,
        prompt: &str,
    ) -> Result<(), ErrorKind> {
        let result = self
            .start_attempt_inner(attempt, workspace, parent_thread_id, prompt)
            .await;
        if let Err(ref e) = result {
            self.store.update_attempt(
                &attempt.id,
                AttemptPatch {
                    status: Some(AttemptStatus::Completed),
                    error: Some(truncate(&e.to_string())),
                    ..Default::default()
                },
            );
            if let Some(updated) = self.store.get_attempt(&attempt.id) {
                if let Some(path) = updated.worktree_path {
                    let _ = self
                        .worktrees
                        .cleanup(&path, updated.branch.as_deref(), &workspace.path)
                        .await;
                }
            }
            self.registry.release_reservation(attempt.id.as_str());
            self.registry.remove(attempt.id.as_str());
        }
        result
    }

    async fn start_attempt_inner(
        &self,
        attempt: &Attempt,
        workspace: &forks_core::Workspace,
        parent_thread_id: &str,
        prompt: &str,
    ) -> Result<(), ErrorKind> {
        let (path, branch) = self
            .worktrees
            .create(&attempt.id, workspace)
            .await
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;

        self.store.update_attempt(
            &attempt.id,
            AttemptPatch {
                worktree_path: Some(path.clone()),
                branch: Some(branch),
                status: Some(AttemptStatus::Running),
                ..Default::default()
            },
        );

        let thread = self
            .adapter
            .fork_thread(
                parent_thread_id,
                forks_adapters::ForkOptions { cwd: Some(path.clone()) },
            )
            .await
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;
        if thread.id.is_empty() {
            return Err(ErrorKind::Internal("adapter returned an empty thread id".into()));
        }

        self.store.update_attempt(
            &attempt.id,
            AttemptPatch { adapter_thread_id: Some(thread.id.clone()), ..Default::default() },
        );

        let run_id = self
            .adapter
            .send_turn(&thread.id, prompt, TurnOptions { cwd: Some(path.clone()) })
            .await
            .map_err(|e| ErrorKind::Internal(e.to_string()))?;

        self.registry.set(ExecutionContext {
            id: attempt.id.as_str().to_string(),
            chat_id: attempt.chat_id,
            execution_type: ExecutionType::Attempt,
            thread_id: thread.id.clone(),
            run_id,
            cwd: path,
            cancel: CancellationToken::new(),
        });
        self.accumulator.init(&thread.id);
        Ok(())
    }

    // --- adapter events ---

    /// Process one adapter event. Events whose thread is unknown belong to
    /// a peer process and are ignored.
    pub async fn handle_event(&self, event: AdapterEvent) {
        if let AdapterEvent::AttemptPick { attempt_id, .. } = &event {
            self.pick_attempt(attempt_id).await;
            return;
        }

        let Some(thread_id) = event.thread_id().map(str::to_string) else {
            if let AdapterEvent::Error { message, .. } = &event {
                tracing::warn!(message, "adapter error without a thread");
            }
            return;
        };
        let Some(ctx) = self.registry.get_by_thread(&thread_id) else {
            tracing::debug!(thread_id, "event for unknown thread; ignoring");
            return;
        };

        match event {
            AdapterEvent::AgentMessageDelta { delta, .. } => {
                self.accumulator.append(&thread_id, &delta);
            }
            AdapterEvent::DiffUpdated { diff, .. } => {
                self.accumulator.set_diff(&thread_id, &diff);
            }
            AdapterEvent::TurnCompleted { .. } => {
                let joined = self.accumulator.joined(&thread_id);
                self.complete_execution(&ctx, Outcome::Completed, joined).await;
            }
            AdapterEvent::Error { message, .. } => {
                self.complete_execution(&ctx, Outcome::Failed, Some(message)).await;
            }
            AdapterEvent::ThreadStarted { .. }
            | AdapterEvent::ItemStarted { .. }
            | AdapterEvent::ItemCompleted { .. } => {}
            AdapterEvent::AttemptPick { .. } => {}
        }
    }

    /// Terminal write for one execution, then full in-memory cleanup.
    async fn complete_execution(
        &self,
        ctx: &ExecutionContext,
        outcome: Outcome,
        message: Option<String>,
    ) {
        let message = message.map(|m| truncate(&m));
        match ctx.execution_type {
            ExecutionType::Subagent => {
                let id = forks_core::SubagentId::from_string(&ctx.id);
                let status = match outcome {
                    Outcome::Completed => SubagentStatus::Completed,
                    Outcome::Failed => SubagentStatus::Failed,
                };
                self.store.update_subagent(
                    &id,
                    SubagentPatch {
                        status: Some(status),
                        result: message.clone(),
                        error: if outcome == Outcome::Failed { message } else { None },
                    },
                );
            }
            ExecutionType::Attempt => {
                let id = AttemptId::from_string(&ctx.id);
                // Attempts always land on `completed`; pick/discard come
                // later through the pick path.
                let patch = match outcome {
                    Outcome::Completed => {
                        let payload = serde_json::json!({
                            "summary": message,
                            "unifiedDiff": self.accumulator.diff(&ctx.thread_id),
                        });
                        AttemptPatch {
                            status: Some(AttemptStatus::Completed),
                            result: Some(truncate(&payload.to_string())),
                            ..Default::default()
                        }
                    }
                    Outcome::Failed => {
                        let raw = message.unwrap_or_else(|| "unknown error".to_string());
                        AttemptPatch {
                            status: Some(AttemptStatus::Completed),
                            result: Some(truncate(&format!("[FAILED] {raw}"))),
                            error: Some(raw),
                            ..Default::default()
                        }
                    }
                };
                self.store.update_attempt(&id, patch);
            }
        }

        self.accumulator.remove(&ctx.thread_id);
        self.registry.remove(&ctx.id);
        self.broker.cancel_for_thread(&ctx.thread_id);
    }

    /// Best-effort failure of whatever execution owns a thread, used when
    /// event processing itself blew up.
    async fn fail_thread(&self, thread_id: &str) {
        let Some(ctx) = self.registry.get_by_thread(thread_id) else {
            return;
        };
        self.complete_execution(&ctx, Outcome::Failed, Some("Internal runner error".into()))
            .await;
    }

    // --- cancellation ---

    /// Cancel one live execution: trigger its token, tell the adapter,
    /// update the store, clean up in-memory state.
    pub async fn cancel(&self, context_id: &str) -> Result<(), ErrorKind> {
        let Some(ctx) = self.registry.get(context_id) else {
            return Err(ErrorKind::NotFound);
        };
        ctx.cancel.cancel();

        if let Err(e) = self.adapter.cancel(&ctx.run_id).await {
            tracing::warn!(run_id = %ctx.run_id, error = %e, "adapter cancel failed");
        }

        match ctx.execution_type {
            ExecutionType::Subagent => {
                let id = forks_core::SubagentId::from_string(&ctx.id);
                self.store.update_subagent(
                    &id,
                    SubagentPatch { status: Some(SubagentStatus::Cancelled), ..Default::default() },
                );
            }
            ExecutionType::Attempt => {
                let id = AttemptId::from_string(&ctx.id);
                self.store.update_attempt(
                    &id,
                    AttemptPatch { status: Some(AttemptStatus::Discarded), ..Default::default() },
                );
            }
        }

        self.accumulator.remove(&ctx.thread_id);
        self.registry.remove(&ctx.id);
        self.broker.cancel_for_thread(&ctx.thread_id);
        Ok(())
    }

    // --- pick ---

    /// Pick one attempt as the winner: atomically transition it, reset the
    /// workspace onto its branch, discard the siblings, and reclaim every
    /// attempt worktree in the background.
    pub async fn pick_attempt(&self, attempt_id: &AttemptId) -> Option<Attempt> {
        let picked = self.store.pick_attempt(attempt_id)?;
        let chat_id = picked.chat_id;

        if let Ok((_, workspace)) = self.chat_workspace(&chat_id) {
            // The picked attempt's changes move into the workspace first;
            // without the reset, reclaiming its worktree would lose work.
            if let Some(branch) = picked.branch.as_deref() {
                if let Err(e) = self.worktrees.reset_workspace(&workspace.path, branch).await {
                    tracing::warn!(branch, error = %e, "workspace reset after pick failed");
                }
            }

            self.store.discard_other_attempts(&chat_id, &picked.id);

            // Cancel whatever sibling executions are still live.
            for ctx in self.registry.get_all_by_chat(&chat_id) {
                if ctx.execution_type == ExecutionType::Attempt && ctx.id != picked.id.as_str() {
                    if let Err(e) = self.cancel(&ctx.id).await {
                        tracing::debug!(context = %ctx.id, error = %e, "sibling cancel failed");
                    }
                }
            }

            // All attempt worktrees, the picked one included, go away in
            // the background; failures are logged, never propagated.
            let worktrees = Arc::clone(&self.worktrees);
            let workspace_id = workspace.id;
            let repo_path = workspace.path.clone();
            tokio::spawn(async move {
                if let Err(e) =
                    worktrees.cleanup_for_workspace(&workspace_id, &[], &repo_path).await
                {
                    tracing::warn!(workspace = %workspace_id, error = %e, "attempt cleanup failed");
                }
            });
        }

        Some(picked)
    }

    // --- shutdown ---

    /// Cancel all live executions in parallel (bounded drain), unsubscribe
    /// from the adapter, decline all pending approvals, clear all state.
    pub async fn stop(&self) {
        self.stopping.store(true, Ordering::SeqCst);

        let ids: Vec<String> = self.registry.values().into_iter().map(|c| c.id).collect();
        let cancels = join_all(ids.iter().map(|id| self.cancel(id)));
        if tokio::time::timeout(STOP_DRAIN_TIMEOUT, cancels).await.is_err() {
            tracing::warn!("stop drain exceeded {STOP_DRAIN_TIMEOUT:?}; forcing cleanup");
        }

        for sub in self.subscriptions.lock().drain(..) {
            sub.unsubscribe();
        }

        self.broker.shutdown();
        self.accumulator.clear();
        self.registry.clear();
    }

    // --- helpers ---

    fn chat_workspace(
        &self,
        chat_id: &ChatId,
    ) -> Result<(forks_core::Chat, forks_core::Workspace), ErrorKind> {
        let chat = self.store.get_chat(chat_id).ok_or(ErrorKind::NotFound)?;
        let workspace =
            self.store.get_workspace(&chat.workspace_id).ok_or(ErrorKind::NotFound)?;
        Ok((chat, workspace))
    }

    fn fail_subagent(&self, id: &forks_core::SubagentId, message: &str) {
        self.store.update_subagent(
            id,
            SubagentPatch {
                status: Some(SubagentStatus::Failed),
                result: Some(message.to_string()),
                error: Some(message.to_string()),
            },
        );
    }

    fn fail_attempts(&self, attempts: &[Attempt], message: &str) {
        for attempt in attempts {
            self.store.update_attempt(
                &attempt.id,
                AttemptPatch {
                    status: Some(AttemptStatus::Completed),
                    error: Some(message.to_string()),
                    ..Default::default()
                },
            );
        }
    }
}

/// Sequential event drain. Each event runs in its own task so a panic in
/// one cannot corrupt the worker; the broken execution is failed
/// best-effort and the stream continues.
async fn event_worker(runner: Arc<Runner>, mut rx: mpsc::UnboundedReceiver<AdapterEvent>) {
    while let Some(event) = rx.recv().await {
        let thread_id = event.thread_id().map(str::to_string);
        let handler = {
            let runner = Arc::clone(&runner);
            tokio::spawn(async move { runner.handle_event(event).await })
        };
        if let Err(join_err) = handler.await {
            tracing::error!(error = %join_err, "event processing panicked; dropping event");
            if let Some(thread_id) = thread_id {
                runner.fail_thread(&thread_id).await;
            }
        }
    }
}

fn compose_prompt(task: &str, parent_summary: &str) -> String {
    if parent_summary.is_empty() {
        task.to_string()
    } else {
        format!("Context from parent conversation:\n{parent_summary}\n\nTask:\n{task}")
    }
}

fn truncate(s: &str) -> String {
    crate::accumulator::truncate_to_char_boundary(s, MAX_RESULT_LEN).to_string()
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
