// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forks_core::{Approval, ApprovalType, Attempt, Chat, Plan, Question, Task, Workspace};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn store() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::default())
}

fn completed_attempt(store: &MemoryStore, chat_id: ChatId) -> Attempt {
    let mut attempt = Attempt::new(chat_id);
    attempt.status = AttemptStatus::Completed;
    store.create_attempt(attempt.clone());
    attempt
}

// --- atomic pick (P1) ---

#[test]
fn concurrent_picks_have_exactly_one_winner() {
    let store = store();
    let chat_id = ChatId::new();
    let attempt = completed_attempt(&store, chat_id);

    let winners = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|_| {
            let store = Arc::clone(&store);
            let winners = Arc::clone(&winners);
            let id = attempt.id;
            std::thread::spawn(move || {
                if store.pick_attempt(&id).is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    assert_eq!(store.get_attempt(&attempt.id).unwrap().status, AttemptStatus::Picked);
}

#[test]
fn pick_refuses_second_sibling() {
    let store = store();
    let chat_id = ChatId::new();
    let a1 = completed_attempt(&store, chat_id);
    let a2 = completed_attempt(&store, chat_id);

    assert!(store.pick_attempt(&a1.id).is_some());
    assert!(store.pick_attempt(&a2.id).is_none());

    let picked: Vec<_> = store
        .list_attempts_by_chat(&chat_id)
        .into_iter()
        .filter(|a| a.status == AttemptStatus::Picked)
        .collect();
    assert_eq!(picked.len(), 1);
}

#[test]
fn pick_requires_completed() {
    let store = store();
    let attempt = Attempt::new(ChatId::new());
    store.create_attempt(attempt.clone());
    assert!(store.pick_attempt(&attempt.id).is_none());
}

#[test]
fn discard_other_attempts_skips_picked_and_terminal() {
    let store = store();
    let chat_id = ChatId::new();
    let picked = completed_attempt(&store, chat_id);
    let running = Attempt::new(chat_id);
    store.create_attempt(running.clone());
    let done = completed_attempt(&store, chat_id);

    assert!(store.pick_attempt(&picked.id).is_some());
    let discarded = store.discard_other_attempts(&chat_id, &picked.id);

    let ids: Vec<_> = discarded.iter().map(|a| a.id).collect();
    assert!(ids.contains(&running.id));
    assert!(ids.contains(&done.id));
    assert_eq!(store.get_attempt(&picked.id).unwrap().status, AttemptStatus::Picked);
}

// --- atomic claim (P2) ---

#[test]
fn concurrent_claims_have_exactly_one_winner() {
    let store = store();
    let task = Task::new(ChatId::new(), "do it");
    store.create_task(task.clone());

    let winners = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let store = Arc::clone(&store);
            let winners = Arc::clone(&winners);
            let id = task.id;
            std::thread::spawn(move || {
                if store.claim_task(&id, &format!("agent-{i}")).is_some() {
                    winners.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(winners.load(Ordering::SeqCst), 1);
    let task = store.get_task(&task.id).unwrap();
    assert_eq!(task.status, TaskStatus::Claimed);
    assert!(task.claimed_by.is_some());
}

#[test]
fn task_resolution_is_claimant_only() {
    let store = store();
    let task = Task::new(ChatId::new(), "t");
    store.create_task(task.clone());
    store.claim_task(&task.id, "agent-a").unwrap();

    assert!(store.complete_task(&task.id, "agent-b", None).is_none());
    assert!(store.fail_task(&task.id, "agent-b", None).is_none());
    assert!(store.unclaim_task(&task.id, "agent-b", None).is_none());

    let done = store.complete_task(&task.id, "agent-a", Some("ok".into())).unwrap();
    assert_eq!(done.status, TaskStatus::Completed);
    assert_eq!(done.result.as_deref(), Some("ok"));
}

#[test]
fn unclaim_returns_task_to_pending_with_handoff_context() {
    let store = store();
    let task = Task::new(ChatId::new(), "t");
    store.create_task(task.clone());
    store.claim_task(&task.id, "agent-a").unwrap();

    let back = store.unclaim_task(&task.id, "agent-a", Some("blocked on review".into())).unwrap();
    assert_eq!(back.status, TaskStatus::Pending);
    assert!(back.claimed_by.is_none());
    assert_eq!(back.unclaim_reason.as_deref(), Some("blocked on review"));

    // Re-claimable by someone else.
    assert!(store.claim_task(&task.id, "agent-b").is_some());
}

// --- approval once (P3) ---

fn pending_approval(store: &MemoryStore) -> Approval {
    let approval = Approval::new(ChatId::new(), ApprovalType::CommandExecution, "th", "tu", "it");
    store.create_approval(approval.clone()).unwrap();
    approval
}

#[test]
fn approval_resolves_at_most_once() {
    let store = store();
    let approval = pending_approval(&store);

    let resolved = Arc::new(AtomicUsize::new(0));
    let handles: Vec<_> = (0..12)
        .map(|i| {
            let store = Arc::clone(&store);
            let resolved = Arc::clone(&resolved);
            let id = approval.id;
            std::thread::spawn(move || {
                let won = match i % 3 {
                    0 => store.respond_to_approval(&id, true).is_some(),
                    1 => store.respond_to_approval(&id, false).is_some(),
                    _ => store.cancel_approval(&id).is_some(),
                };
                if won {
                    resolved.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(resolved.load(Ordering::SeqCst), 1);
    assert!(store.get_approval(&approval.id).unwrap().status.is_terminal());
}

#[test]
fn duplicate_token_is_a_conflict() {
    let store = store();
    let a = pending_approval(&store);
    let mut b = Approval::new(ChatId::new(), ApprovalType::FileChange, "th2", "tu2", "it2");
    b.token = a.token.clone();
    assert_eq!(store.create_approval(b), Err(StoreError::Conflict));
}

#[test]
fn token_lookup_finds_exact_row() {
    let store = store();
    let a = pending_approval(&store);
    let _b = pending_approval(&store);

    let found = store.get_approval_by_token(a.token.as_str()).unwrap();
    assert_eq!(found.id, a.id);
    assert!(store.get_approval_by_token("nope").is_none());
}

#[test]
fn pending_approvals_filtered_by_thread() {
    let store = store();
    let a = pending_approval(&store);
    let other = Approval::new(ChatId::new(), ApprovalType::CommandExecution, "thX", "tu", "it");
    store.create_approval(other).unwrap();
    store.respond_to_approval(&a.id, true);

    let pending = store.pending_approvals_for_thread("thX");
    assert_eq!(pending.len(), 1);
    assert!(store.pending_approvals_for_thread("th").is_empty());
}

// --- plans / questions ---

#[test]
fn plan_approval_requires_a_task() {
    let store = store();
    let plan = Plan::new(forks_core::ProjectId::new(), ChatId::new(), "agent-1", "plan", "steps");
    store.create_plan(plan.clone());

    assert!(store.respond_to_plan(&plan.id, true, None).is_none());

    store.create_task(Task::for_plan(plan.chat_id, plan.id, "step 1"));
    let approved = store.respond_to_plan(&plan.id, true, None).unwrap();
    assert_eq!(approved.status, PlanStatus::Approved);
    assert!(approved.responded_at.is_some());
}

#[test]
fn plan_rejection_needs_no_task_and_is_pending_only() {
    let store = store();
    let plan = Plan::new(forks_core::ProjectId::new(), ChatId::new(), "agent-1", "plan", "steps");
    store.create_plan(plan.clone());

    let rejected = store.respond_to_plan(&plan.id, false, Some("too big".into())).unwrap();
    assert_eq!(rejected.status, PlanStatus::Rejected);
    assert_eq!(rejected.feedback.as_deref(), Some("too big"));

    assert!(store.respond_to_plan(&plan.id, false, None).is_none());
}

#[test]
fn question_answer_is_pending_only() {
    let store = store();
    let q = Question::new(ChatId::new(), "agent-1", "which db?");
    store.create_question(q.clone());

    let answered = store.answer_question(&q.id, "postgres").unwrap();
    assert_eq!(answered.status, QuestionStatus::Answered);
    assert_eq!(answered.answer.as_deref(), Some("postgres"));

    assert!(store.answer_question(&q.id, "mysql").is_none());
    assert!(store.cancel_question(&q.id).is_none());
}

// --- aggregates ---

#[test]
fn subagent_counts_by_chat() {
    let store = store();
    let chat_id = ChatId::new();
    for status in [SubagentStatus::Running, SubagentStatus::Running, SubagentStatus::Completed] {
        let mut s = Subagent::new(chat_id, "t");
        s.status = status;
        store.create_subagent(s);
    }
    let other = Subagent::new(ChatId::new(), "t");
    store.create_subagent(other);

    let counts = store.subagent_status_counts(&chat_id);
    assert_eq!(counts.running, 2);
    assert_eq!(counts.completed, 1);
    assert_eq!(counts.total(), 3);
    assert_eq!(store.count_running_subagents(&chat_id), 2);
}

// --- events ---

#[test]
fn mutations_emit_on_agent_channel() {
    let bus = EventBus::new();
    let seen: Arc<parking_lot::Mutex<Vec<String>>> = Arc::new(parking_lot::Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let _sub = bus.subscribe(move |event| {
        seen2.lock().push(format!("{}:{}", event.entity(), event.verb()));
    });

    let store = MemoryStore::new(bus);
    let chat = Chat::new(forks_core::WorkspaceId::new());
    store.create_chat(chat.clone());
    store.update_chat(&chat.id, ChatPatch { title: Some("t".into()), ..Default::default() });
    let approval = pending_approval(&store);
    store.cancel_approval(&approval.id);

    let seen = seen.lock();
    assert_eq!(
        seen.as_slice(),
        ["chat:created", "chat:updated", "approval:requested", "approval:cancelled"],
    );
}

#[test]
fn row_is_visible_before_its_event() {
    let bus = EventBus::new();
    let store = Arc::new(MemoryStore::new(bus.clone()));
    let store2 = Arc::clone(&store);
    let observed = Arc::new(AtomicUsize::new(0));
    let observed2 = Arc::clone(&observed);
    let _sub = bus.subscribe(move |event| {
        if let DomainEvent::Approval { approval, .. } = event {
            // The listener must be able to look the row up by token.
            if store2.get_approval_by_token(approval.token.as_str()).is_some() {
                observed2.fetch_add(1, Ordering::SeqCst);
            }
        }
    });

    pending_approval(&store);
    assert_eq!(observed.load(Ordering::SeqCst), 1);
}

#[test]
fn delete_project_cascades_workspaces() {
    let store = store();
    let project = forks_core::Project::new("/tmp/r".into(), "r", "main");
    store.create_project(project.clone());
    let ws = Workspace::new(project.id, "/tmp/ws".into(), "main", "ws");
    store.create_workspace(ws.clone());

    store.delete_project(&project.id).unwrap();
    assert!(store.get_workspace(&ws.id).is_none());
}
