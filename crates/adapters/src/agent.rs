// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The agent adapter contract.
//!
//! Threads are adapter-side conversation handles; a run is one turn of
//! execution addressed by `run_id` for cancellation. Events carry the
//! owning `thread_id`; events for threads this process does not own are
//! expected and must be ignored by consumers.

use async_trait::async_trait;
use forks_core::{ApprovalToken, ApprovalType, AttemptId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

use crate::handlers::HandlerSubscription;

#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    #[error("adapter unavailable: {0}")]
    Unavailable(String),

    #[error("adapter protocol error: {0}")]
    Protocol(String),

    #[error("unknown thread: {0}")]
    ThreadNotFound(String),
}

/// Handle returned by `start_thread` / `fork_thread`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadHandle {
    pub id: String,
}

#[derive(Debug, Clone, Default)]
pub struct ForkOptions {
    /// Working directory the forked thread should operate in.
    pub cwd: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct TurnOptions {
    pub cwd: Option<PathBuf>,
}

/// The two decisions an adapter understands. Store-level `cancelled`
/// collapses to `Decline` at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterDecision {
    Accept,
    Decline,
}

forks_core::display_as! {
    AdapterDecision {
        Accept => "accept",
        Decline => "decline",
    }
}

/// Events streamed from the adapter process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AdapterEvent {
    #[serde(rename = "thread/started")]
    ThreadStarted {
        #[serde(rename = "threadId")]
        thread_id: String,
    },

    #[serde(rename = "turn/completed")]
    #[serde(rename_all = "camelCase")]
    TurnCompleted {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        turn_id: Option<String>,
        /// Token usage report, passed through opaquely.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<serde_json::Value>,
    },

    #[serde(rename = "item/started")]
    #[serde(rename_all = "camelCase")]
    ItemStarted {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    #[serde(rename = "item/completed")]
    #[serde(rename_all = "camelCase")]
    ItemCompleted {
        thread_id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        item_id: Option<String>,
    },

    /// Incremental agent prose. High-frequency; consumers accumulate.
    #[serde(rename = "item/agentMessage/delta")]
    #[serde(rename_all = "camelCase")]
    AgentMessageDelta { thread_id: String, delta: String },

    /// Full working-tree diff snapshot. Last writer wins per thread.
    #[serde(rename = "turn/diff/updated")]
    #[serde(rename_all = "camelCase")]
    DiffUpdated { thread_id: String, diff: String },

    #[serde(rename = "error")]
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        message: String,
    },

    /// In-band notification that the agent picked an attempt.
    #[serde(rename = "attempt_pick")]
    #[serde(rename_all = "camelCase")]
    AttemptPick {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        thread_id: Option<String>,
        attempt_id: AttemptId,
    },
}

impl AdapterEvent {
    /// The owning thread, when the event carries one.
    pub fn thread_id(&self) -> Option<&str> {
        match self {
            AdapterEvent::ThreadStarted { thread_id }
            | AdapterEvent::TurnCompleted { thread_id, .. }
            | AdapterEvent::ItemStarted { thread_id, .. }
            | AdapterEvent::ItemCompleted { thread_id, .. }
            | AdapterEvent::AgentMessageDelta { thread_id, .. }
            | AdapterEvent::DiffUpdated { thread_id, .. } => Some(thread_id),
            AdapterEvent::Error { thread_id, .. }
            | AdapterEvent::AttemptPick { thread_id, .. } => thread_id.as_deref(),
        }
    }
}

/// An approval request raised by the adapter mid-turn. The adapter mints
/// the token; the broker persists it and answers through
/// [`AgentAdapter::respond_to_approval`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalRequest {
    pub token: ApprovalToken,
    #[serde(rename = "type")]
    pub approval_type: ApprovalType,
    pub params: ApprovalParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalParams {
    pub thread_id: String,
    pub turn_id: String,
    pub item_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// The downstream AI-process adapter.
#[async_trait]
pub trait AgentAdapter: Send + Sync {
    /// Start a fresh conversation thread.
    async fn start_thread(&self) -> Result<ThreadHandle, AdapterError>;

    /// Fork an existing thread, optionally rebinding its working directory.
    async fn fork_thread(
        &self,
        parent_thread_id: &str,
        opts: ForkOptions,
    ) -> Result<ThreadHandle, AdapterError>;

    /// Send a prompt; returns the `run_id` addressing this turn.
    async fn send_turn(
        &self,
        thread_id: &str,
        prompt: &str,
        opts: TurnOptions,
    ) -> Result<String, AdapterError>;

    /// Best-effort cancellation of a running turn.
    async fn cancel(&self, run_id: &str) -> Result<(), AdapterError>;

    /// Idempotent; returns whether the token was known to the adapter.
    async fn respond_to_approval(
        &self,
        token: &str,
        decision: AdapterDecision,
    ) -> Result<bool, AdapterError>;

    /// Register an event handler. Handlers must not block.
    fn on_event(
        &self,
        handler: Box<dyn Fn(&AdapterEvent) + Send + Sync>,
    ) -> HandlerSubscription;

    /// Register an approval-request handler. Handlers must not block.
    fn on_approval_request(
        &self,
        handler: Box<dyn Fn(&ApprovalRequest) + Send + Sync>,
    ) -> HandlerSubscription;
}

#[cfg(test)]
#[path = "agent_tests.rs"]
mod tests;
