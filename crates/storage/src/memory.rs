// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory reference implementation of [`Store`].
//!
//! All tables live behind a single mutex. That makes every compound
//! operation trivially one transaction, which is exactly what the pick /
//! claim / respond invariants need. Events are emitted after the lock
//! drops so listeners can re-read the store without deadlocking; the
//! mutated row is always visible before its event.

use std::collections::HashMap;

use chrono::Utc;
use forks_core::{
    Approval, ApprovalId, ApprovalStatus, Attempt, AttemptId, AttemptStatus, Chat, ChatId,
    DomainEvent, EventBus, EventVerb, Plan, PlanId, PlanStatus, Project, ProjectId, Question,
    QuestionId, QuestionStatus, Subagent, SubagentId, SubagentStatus, SubagentStatusCounts, Task,
    TaskId, TaskStatus, Workspace, WorkspaceId, WorkspaceStatus,
};
use parking_lot::Mutex;

use crate::store::{AttemptPatch, ChatPatch, Store, StoreError, SubagentPatch};

#[derive(Default)]
struct State {
    projects: HashMap<ProjectId, Project>,
    workspaces: HashMap<WorkspaceId, Workspace>,
    chats: HashMap<ChatId, Chat>,
    attempts: HashMap<AttemptId, Attempt>,
    subagents: HashMap<SubagentId, Subagent>,
    plans: HashMap<PlanId, Plan>,
    questions: HashMap<QuestionId, Question>,
    tasks: HashMap<TaskId, Task>,
    approvals: HashMap<ApprovalId, Approval>,
}

/// The in-memory store. Cheap to clone via `Arc` at the call sites; the
/// struct itself is not `Clone` so there is exactly one table set.
pub struct MemoryStore {
    state: Mutex<State>,
    bus: EventBus,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(EventBus::new())
    }
}

impl MemoryStore {
    pub fn new(bus: EventBus) -> Self {
        Self { state: Mutex::new(State::default()), bus }
    }

    /// Run `f` under the state lock, then emit whatever events it queued.
    fn transact<T>(&self, f: impl FnOnce(&mut State, &mut Vec<DomainEvent>) -> T) -> T {
        let mut events = Vec::new();
        let out = {
            let mut state = self.state.lock();
            f(&mut state, &mut events)
        };
        for event in events {
            self.bus.emit(&event);
        }
        out
    }
}

impl Store for MemoryStore {
    fn bus(&self) -> &EventBus {
        &self.bus
    }

    // --- projects ---

    fn create_project(&self, project: Project) {
        self.transact(|state, _| {
            state.projects.insert(project.id, project);
        });
    }

    fn get_project(&self, id: &ProjectId) -> Option<Project> {
        self.state.lock().projects.get(id).cloned()
    }

    fn list_projects(&self) -> Vec<Project> {
        self.state.lock().projects.values().cloned().collect()
    }

    fn delete_project(&self, id: &ProjectId) -> Option<Project> {
        self.transact(|state, _| {
            let project = state.projects.remove(id)?;
            state.workspaces.retain(|_, ws| ws.project_id != project.id);
            Some(project)
        })
    }

    // --- workspaces ---

    fn create_workspace(&self, workspace: Workspace) {
        self.transact(|state, _| {
            state.workspaces.insert(workspace.id, workspace);
        });
    }

    fn get_workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.state.lock().workspaces.get(id).cloned()
    }

    fn list_workspaces(&self, project_id: &ProjectId) -> Vec<Workspace> {
        self.state
            .lock()
            .workspaces
            .values()
            .filter(|ws| ws.project_id == *project_id)
            .cloned()
            .collect()
    }

    fn archive_workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.transact(|state, _| {
            let ws = state.workspaces.get_mut(id)?;
            ws.status = WorkspaceStatus::Archived;
            Some(ws.clone())
        })
    }

    fn touch_workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.transact(|state, _| {
            let ws = state.workspaces.get_mut(id)?;
            ws.last_accessed_at = Utc::now();
            Some(ws.clone())
        })
    }

    fn delete_workspace(&self, id: &WorkspaceId) -> Option<Workspace> {
        self.transact(|state, _| state.workspaces.remove(id))
    }

    // --- chats ---

    fn create_chat(&self, chat: Chat) {
        self.transact(|state, events| {
            events.push(DomainEvent::Chat { event: EventVerb::Created, chat: chat.clone() });
            state.chats.insert(chat.id, chat);
        });
    }

    fn get_chat(&self, id: &ChatId) -> Option<Chat> {
        self.state.lock().chats.get(id).cloned()
    }

    fn update_chat(&self, id: &ChatId, patch: ChatPatch) -> Option<Chat> {
        self.transact(|state, events| {
            let chat = state.chats.get_mut(id)?;
            if let Some(thread_id) = patch.adapter_thread_id {
                chat.adapter_thread_id = Some(thread_id);
            }
            if let Some(title) = patch.title {
                chat.title = Some(title);
            }
            if let Some(status) = patch.status {
                chat.status = status;
            }
            if let Some(mode) = patch.collaboration_mode {
                chat.collaboration_mode = Some(mode);
            }
            chat.updated_at = Utc::now();
            let chat = chat.clone();
            events.push(DomainEvent::Chat { event: EventVerb::Updated, chat: chat.clone() });
            Some(chat)
        })
    }

    // --- attempts ---

    fn create_attempt(&self, attempt: Attempt) {
        self.transact(|state, events| {
            events.push(DomainEvent::Attempt {
                event: EventVerb::Created,
                attempt: attempt.clone(),
            });
            state.attempts.insert(attempt.id, attempt);
        });
    }

    fn get_attempt(&self, id: &AttemptId) -> Option<Attempt> {
        self.state.lock().attempts.get(id).cloned()
    }

    fn list_attempts_by_chat(&self, chat_id: &ChatId) -> Vec<Attempt> {
        self.state
            .lock()
            .attempts
            .values()
            .filter(|a| a.chat_id == *chat_id)
            .cloned()
            .collect()
    }

    fn update_attempt(&self, id: &AttemptId, patch: AttemptPatch) -> Option<Attempt> {
        self.transact(|state, events| {
            let attempt = state.attempts.get_mut(id)?;
            if let Some(thread_id) = patch.adapter_thread_id {
                attempt.adapter_thread_id = Some(thread_id);
            }
            if let Some(path) = patch.worktree_path {
                attempt.worktree_path = Some(path);
            }
            if let Some(branch) = patch.branch {
                attempt.branch = Some(branch);
            }
            if let Some(status) = patch.status {
                attempt.status = status;
            }
            if let Some(result) = patch.result {
                attempt.result = Some(result);
            }
            if let Some(error) = patch.error {
                attempt.error = Some(error);
            }
            attempt.updated_at = Utc::now();
            let attempt = attempt.clone();
            events.push(DomainEvent::Attempt {
                event: EventVerb::Updated,
                attempt: attempt.clone(),
            });
            Some(attempt)
        })
    }

    fn pick_attempt(&self, id: &AttemptId) -> Option<Attempt> {
        self.transact(|state, events| {
            let chat_id = {
                let attempt = state.attempts.get(id)?;
                if attempt.status != AttemptStatus::Completed {
                    return None;
                }
                attempt.chat_id
            };
            // A sibling already picked means this pick lost the race.
            let sibling_picked = state
                .attempts
                .values()
                .any(|a| a.chat_id == chat_id && a.status == AttemptStatus::Picked);
            if sibling_picked {
                return None;
            }
            let attempt = state.attempts.get_mut(id)?;
            attempt.status = AttemptStatus::Picked;
            attempt.updated_at = Utc::now();
            let attempt = attempt.clone();
            events.push(DomainEvent::Attempt {
                event: EventVerb::Updated,
                attempt: attempt.clone(),
            });
            Some(attempt)
        })
    }

    fn discard_other_attempts(&self, chat_id: &ChatId, picked: &AttemptId) -> Vec<Attempt> {
        self.transact(|state, events| {
            let now = Utc::now();
            let mut discarded = Vec::new();
            for attempt in state.attempts.values_mut() {
                if attempt.chat_id == *chat_id
                    && attempt.id != *picked
                    && !attempt.status.is_terminal()
                {
                    attempt.status = AttemptStatus::Discarded;
                    attempt.updated_at = now;
                    discarded.push(attempt.clone());
                }
            }
            if !discarded.is_empty() {
                events.push(DomainEvent::AttemptBatch {
                    event: EventVerb::Updated,
                    chat_id: *chat_id,
                    attempts: discarded.clone(),
                });
            }
            discarded
        })
    }

    // --- subagents ---

    fn create_subagent(&self, subagent: Subagent) {
        self.transact(|state, events| {
            events.push(DomainEvent::Subagent {
                event: EventVerb::Created,
                subagent: subagent.clone(),
            });
            state.subagents.insert(subagent.id, subagent);
        });
    }

    fn get_subagent(&self, id: &SubagentId) -> Option<Subagent> {
        self.state.lock().subagents.get(id).cloned()
    }

    fn update_subagent(&self, id: &SubagentId, patch: SubagentPatch) -> Option<Subagent> {
        self.transact(|state, events| {
            let subagent = state.subagents.get_mut(id)?;
            if let Some(status) = patch.status {
                subagent.status = status;
            }
            if let Some(result) = patch.result {
                subagent.result = Some(result);
            }
            if let Some(error) = patch.error {
                subagent.error = Some(error);
            }
            subagent.updated_at = Utc::now();
            let subagent = subagent.clone();
            events.push(DomainEvent::Subagent {
                event: EventVerb::Updated,
                subagent: subagent.clone(),
            });
            Some(subagent)
        })
    }

    fn subagent_status_counts(&self, chat_id: &ChatId) -> SubagentStatusCounts {
        let state = self.state.lock();
        let mut counts = SubagentStatusCounts::default();
        for subagent in state.subagents.values() {
            if subagent.parent_chat_id == *chat_id {
                counts.record(subagent.status);
            }
        }
        counts
    }

    fn count_running_subagents(&self, chat_id: &ChatId) -> usize {
        self.state
            .lock()
            .subagents
            .values()
            .filter(|s| s.parent_chat_id == *chat_id && s.status == SubagentStatus::Running)
            .count()
    }

    // --- plans ---

    fn create_plan(&self, plan: Plan) {
        self.transact(|state, events| {
            events.push(DomainEvent::Plan { event: EventVerb::Created, plan: plan.clone() });
            state.plans.insert(plan.id, plan);
        });
    }

    fn get_plan(&self, id: &PlanId) -> Option<Plan> {
        self.state.lock().plans.get(id).cloned()
    }

    fn respond_to_plan(
        &self,
        id: &PlanId,
        approved: bool,
        feedback: Option<String>,
    ) -> Option<Plan> {
        self.transact(|state, events| {
            // Approving a plan with no tasks would leave nothing to execute.
            if approved {
                let has_task = state.tasks.values().any(|t| t.plan_id == Some(*id));
                if !has_task {
                    return None;
                }
            }
            let plan = state.plans.get_mut(id)?;
            if plan.status != PlanStatus::Pending {
                return None;
            }
            plan.status = if approved { PlanStatus::Approved } else { PlanStatus::Rejected };
            plan.feedback = feedback;
            plan.responded_at = Some(Utc::now());
            let plan = plan.clone();
            events.push(DomainEvent::Plan { event: EventVerb::Updated, plan: plan.clone() });
            Some(plan)
        })
    }

    fn cancel_plan(&self, id: &PlanId) -> Option<Plan> {
        self.transact(|state, events| {
            let plan = state.plans.get_mut(id)?;
            if plan.status != PlanStatus::Pending {
                return None;
            }
            plan.status = PlanStatus::Cancelled;
            plan.responded_at = Some(Utc::now());
            let plan = plan.clone();
            events.push(DomainEvent::Plan { event: EventVerb::Cancelled, plan: plan.clone() });
            Some(plan)
        })
    }

    // --- questions ---

    fn create_question(&self, question: Question) {
        self.transact(|state, events| {
            events.push(DomainEvent::Question {
                event: EventVerb::Created,
                question: question.clone(),
            });
            state.questions.insert(question.id, question);
        });
    }

    fn get_question(&self, id: &QuestionId) -> Option<Question> {
        self.state.lock().questions.get(id).cloned()
    }

    fn answer_question(&self, id: &QuestionId, answer: &str) -> Option<Question> {
        self.transact(|state, events| {
            let question = state.questions.get_mut(id)?;
            if question.status != QuestionStatus::Pending {
                return None;
            }
            question.status = QuestionStatus::Answered;
            question.answer = Some(answer.to_string());
            let question = question.clone();
            events.push(DomainEvent::Question {
                event: EventVerb::Updated,
                question: question.clone(),
            });
            Some(question)
        })
    }

    fn cancel_question(&self, id: &QuestionId) -> Option<Question> {
        self.transact(|state, events| {
            let question = state.questions.get_mut(id)?;
            if question.status != QuestionStatus::Pending {
                return None;
            }
            question.status = QuestionStatus::Cancelled;
            let question = question.clone();
            events.push(DomainEvent::Question {
                event: EventVerb::Cancelled,
                question: question.clone(),
            });
            Some(question)
        })
    }

    // --- tasks ---

    fn create_task(&self, task: Task) {
        self.transact(|state, events| {
            events.push(DomainEvent::Task { event: EventVerb::Created, task: task.clone() });
            state.tasks.insert(task.id, task);
        });
    }

    fn get_task(&self, id: &TaskId) -> Option<Task> {
        self.state.lock().tasks.get(id).cloned()
    }

    fn list_tasks_by_chat(&self, chat_id: &ChatId) -> Vec<Task> {
        self.state.lock().tasks.values().filter(|t| t.chat_id == *chat_id).cloned().collect()
    }

    fn count_tasks_for_plan(&self, plan_id: &PlanId) -> usize {
        self.state.lock().tasks.values().filter(|t| t.plan_id == Some(*plan_id)).count()
    }

    fn claim_task(&self, id: &TaskId, agent_id: &str) -> Option<Task> {
        self.transact(|state, events| {
            let task = state.tasks.get_mut(id)?;
            if task.status != TaskStatus::Pending {
                return None;
            }
            task.status = TaskStatus::Claimed;
            task.claimed_by = Some(agent_id.to_string());
            task.updated_at = Utc::now();
            let task = task.clone();
            events.push(DomainEvent::Task { event: EventVerb::Updated, task: task.clone() });
            Some(task)
        })
    }

    fn unclaim_task(&self, id: &TaskId, agent_id: &str, reason: Option<String>) -> Option<Task> {
        self.transact(|state, events| {
            let task = state.tasks.get_mut(id)?;
            if task.status != TaskStatus::Claimed || task.claimed_by.as_deref() != Some(agent_id) {
                return None;
            }
            task.status = TaskStatus::Pending;
            task.claimed_by = None;
            // Leftover context for the next claimant.
            task.unclaim_reason = reason;
            task.updated_at = Utc::now();
            let task = task.clone();
            events.push(DomainEvent::Task { event: EventVerb::Updated, task: task.clone() });
            Some(task)
        })
    }

    fn complete_task(&self, id: &TaskId, agent_id: &str, result: Option<String>) -> Option<Task> {
        self.resolve_task(id, agent_id, TaskStatus::Completed, result)
    }

    fn fail_task(&self, id: &TaskId, agent_id: &str, result: Option<String>) -> Option<Task> {
        self.resolve_task(id, agent_id, TaskStatus::Failed, result)
    }

    // --- approvals ---

    fn create_approval(&self, approval: Approval) -> Result<(), StoreError> {
        self.transact(|state, events| {
            let duplicate = state
                .approvals
                .values()
                .any(|a| a.token == approval.token && a.id != approval.id);
            if duplicate {
                tracing::debug!(approval = %approval.id, "approval token already bound");
                return Err(StoreError::Conflict);
            }
            events.push(DomainEvent::Approval {
                event: EventVerb::Requested,
                approval: approval.clone(),
            });
            state.approvals.insert(approval.id, approval);
            Ok(())
        })
    }

    fn get_approval(&self, id: &ApprovalId) -> Option<Approval> {
        self.state.lock().approvals.get(id).cloned()
    }

    fn get_approval_by_token(&self, token: &str) -> Option<Approval> {
        // Constant-time comparison per row; no early exit on prefix match.
        self.state.lock().approvals.values().find(|a| a.token.matches(token)).cloned()
    }

    fn respond_to_approval(&self, id: &ApprovalId, accepted: bool) -> Option<Approval> {
        self.transact(|state, events| {
            let approval = state.approvals.get_mut(id)?;
            if approval.status != ApprovalStatus::Pending {
                return None;
            }
            approval.status =
                if accepted { ApprovalStatus::Accepted } else { ApprovalStatus::Declined };
            approval.responded_at = Some(Utc::now());
            let approval = approval.clone();
            let verb = if accepted { EventVerb::Accepted } else { EventVerb::Declined };
            events.push(DomainEvent::Approval { event: verb, approval: approval.clone() });
            Some(approval)
        })
    }

    fn cancel_approval(&self, id: &ApprovalId) -> Option<Approval> {
        self.transact(|state, events| {
            let approval = state.approvals.get_mut(id)?;
            if approval.status != ApprovalStatus::Pending {
                return None;
            }
            approval.status = ApprovalStatus::Cancelled;
            approval.responded_at = Some(Utc::now());
            let approval = approval.clone();
            events.push(DomainEvent::Approval {
                event: EventVerb::Cancelled,
                approval: approval.clone(),
            });
            Some(approval)
        })
    }

    fn pending_approvals_for_thread(&self, thread_id: &str) -> Vec<Approval> {
        self.state
            .lock()
            .approvals
            .values()
            .filter(|a| a.status == ApprovalStatus::Pending && a.thread_id == thread_id)
            .cloned()
            .collect()
    }
}

impl MemoryStore {
    /// Shared claimant-only terminal transition for complete/fail.
    fn resolve_task(
        &self,
        id: &TaskId,
        agent_id: &str,
        status: TaskStatus,
        result: Option<String>,
    ) -> Option<Task> {
        self.transact(|state, events| {
            let task = state.tasks.get_mut(id)?;
            if task.status != TaskStatus::Claimed || task.claimed_by.as_deref() != Some(agent_id) {
                return None;
            }
            task.status = status;
            task.result = result;
            task.updated_at = Utc::now();
            let task = task.clone();
            events.push(DomainEvent::Task { event: EventVerb::Updated, task: task.clone() });
            Some(task)
        })
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
