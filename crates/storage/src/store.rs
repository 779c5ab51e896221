// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The repository interface the engine depends on.
//!
//! Compound operations (`pick_attempt`, `claim_task`, `respond_to_approval`
//! and friends) must each execute as a single transaction: under concurrent
//! callers exactly one observes the pending row and transitions it, every
//! other caller gets `None`.

use std::path::PathBuf;

use forks_core::{
    Approval, ApprovalId, Attempt, AttemptId, AttemptStatus, Chat, ChatId, ChatStatus,
    CollaborationMode, EventBus, Plan, PlanId, Project, ProjectId, Question, QuestionId, Subagent,
    SubagentId, SubagentStatus, SubagentStatusCounts, Task, TaskId, Workspace, WorkspaceId,
};
use thiserror::Error;

/// Store failures the core reacts to. Anything else is fatal and surfaces
/// as `Internal`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,

    #[error("not pending")]
    NotPending,

    #[error("conflict")]
    Conflict,

    #[error("internal store error: {0}")]
    Internal(String),
}

/// Partial update for a chat row. `None` fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct ChatPatch {
    pub adapter_thread_id: Option<String>,
    pub title: Option<String>,
    pub status: Option<ChatStatus>,
    pub collaboration_mode: Option<CollaborationMode>,
}

/// Partial update for an attempt row.
#[derive(Debug, Clone, Default)]
pub struct AttemptPatch {
    pub adapter_thread_id: Option<String>,
    pub worktree_path: Option<PathBuf>,
    pub branch: Option<String>,
    pub status: Option<AttemptStatus>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Partial update for a subagent row.
#[derive(Debug, Clone, Default)]
pub struct SubagentPatch {
    pub status: Option<SubagentStatus>,
    pub result: Option<String>,
    pub error: Option<String>,
}

/// Repository of persisted entities. All methods are safe to call
/// concurrently; every mutation publishes a domain event on [`Store::bus`].
pub trait Store: Send + Sync {
    /// The event emitter mutations publish on (the `"agent"` channel).
    fn bus(&self) -> &EventBus;

    // --- projects ---

    fn create_project(&self, project: Project);
    fn get_project(&self, id: &ProjectId) -> Option<Project>;
    fn list_projects(&self) -> Vec<Project>;
    /// Deleting a project cascades to its workspaces.
    fn delete_project(&self, id: &ProjectId) -> Option<Project>;

    // --- workspaces ---

    fn create_workspace(&self, workspace: Workspace);
    fn get_workspace(&self, id: &WorkspaceId) -> Option<Workspace>;
    fn list_workspaces(&self, project_id: &ProjectId) -> Vec<Workspace>;
    fn archive_workspace(&self, id: &WorkspaceId) -> Option<Workspace>;
    /// Bump `last_accessed_at`.
    fn touch_workspace(&self, id: &WorkspaceId) -> Option<Workspace>;
    fn delete_workspace(&self, id: &WorkspaceId) -> Option<Workspace>;

    // --- chats ---

    fn create_chat(&self, chat: Chat);
    fn get_chat(&self, id: &ChatId) -> Option<Chat>;
    fn update_chat(&self, id: &ChatId, patch: ChatPatch) -> Option<Chat>;

    // --- attempts ---

    fn create_attempt(&self, attempt: Attempt);
    fn get_attempt(&self, id: &AttemptId) -> Option<Attempt>;
    fn list_attempts_by_chat(&self, chat_id: &ChatId) -> Vec<Attempt>;
    fn update_attempt(&self, id: &AttemptId, patch: AttemptPatch) -> Option<Attempt>;

    /// Transition one attempt `completed → picked`. Returns `None` if the
    /// attempt is missing, not completed, or a sibling already holds
    /// `picked`. Single transaction.
    fn pick_attempt(&self, id: &AttemptId) -> Option<Attempt>;

    /// Batch transition of sibling attempts to `discarded`. Running and
    /// completed siblings are discarded; the picked attempt is untouched.
    fn discard_other_attempts(&self, chat_id: &ChatId, picked: &AttemptId) -> Vec<Attempt>;

    // --- subagents ---

    fn create_subagent(&self, subagent: Subagent);
    fn get_subagent(&self, id: &SubagentId) -> Option<Subagent>;
    fn update_subagent(&self, id: &SubagentId, patch: SubagentPatch) -> Option<Subagent>;
    /// Single aggregate query, used for await-style polling.
    fn subagent_status_counts(&self, chat_id: &ChatId) -> SubagentStatusCounts;
    /// Cheap poll probe.
    fn count_running_subagents(&self, chat_id: &ChatId) -> usize;

    // --- plans ---

    fn create_plan(&self, plan: Plan);
    fn get_plan(&self, id: &PlanId) -> Option<Plan>;
    /// Pending-only. Approval additionally requires at least one task
    /// associated with the plan; otherwise the call fails with `None`.
    fn respond_to_plan(&self, id: &PlanId, approved: bool, feedback: Option<String>)
        -> Option<Plan>;
    fn cancel_plan(&self, id: &PlanId) -> Option<Plan>;

    // --- questions ---

    fn create_question(&self, question: Question);
    fn get_question(&self, id: &QuestionId) -> Option<Question>;
    /// Pending-only.
    fn answer_question(&self, id: &QuestionId, answer: &str) -> Option<Question>;
    fn cancel_question(&self, id: &QuestionId) -> Option<Question>;

    // --- tasks ---

    fn create_task(&self, task: Task);
    fn get_task(&self, id: &TaskId) -> Option<Task>;
    fn list_tasks_by_chat(&self, chat_id: &ChatId) -> Vec<Task>;
    fn count_tasks_for_plan(&self, plan_id: &PlanId) -> usize;

    /// `pending → claimed`, exactly once under concurrency.
    fn claim_task(&self, id: &TaskId, agent_id: &str) -> Option<Task>;
    /// Claimant-only; no-op (`None`) for the wrong claimant.
    fn unclaim_task(&self, id: &TaskId, agent_id: &str, reason: Option<String>) -> Option<Task>;
    fn complete_task(&self, id: &TaskId, agent_id: &str, result: Option<String>) -> Option<Task>;
    fn fail_task(&self, id: &TaskId, agent_id: &str, result: Option<String>) -> Option<Task>;

    // --- approvals ---

    /// Fails with `Conflict` if the token is already bound to another row.
    fn create_approval(&self, approval: Approval) -> Result<(), StoreError>;
    fn get_approval(&self, id: &ApprovalId) -> Option<Approval>;
    /// Token lookup for the auth boundary; comparison never short-circuits.
    fn get_approval_by_token(&self, token: &str) -> Option<Approval>;
    /// Pending-only: `pending → accepted|declined`.
    fn respond_to_approval(&self, id: &ApprovalId, accepted: bool) -> Option<Approval>;
    /// Pending-only: `pending → cancelled` (timeout, thread death).
    fn cancel_approval(&self, id: &ApprovalId) -> Option<Approval>;
    fn pending_approvals_for_thread(&self, thread_id: &str) -> Vec<Approval>;
}
