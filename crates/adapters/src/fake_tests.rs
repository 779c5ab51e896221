// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

#[tokio::test]
async fn threads_and_runs_are_sequential() {
    let fake = FakeAgentAdapter::new();
    let t1 = fake.start_thread().await.unwrap();
    let t2 = fake.start_thread().await.unwrap();
    assert_eq!(t1.id, "th-1");
    assert_eq!(t2.id, "th-2");

    let run = fake.send_turn(&t1.id, "hello", TurnOptions::default()).await.unwrap();
    assert_eq!(run, "run-1");

    let turns = fake.turns();
    assert_eq!(turns.len(), 1);
    assert_eq!(turns[0].thread_id, "th-1");
    assert_eq!(turns[0].prompt, "hello");
}

#[tokio::test]
async fn injected_failures_surface() {
    let fake = FakeAgentAdapter::new();
    fake.fail_start_thread(true);
    assert!(fake.start_thread().await.is_err());
    fake.fail_start_thread(false);
    assert!(fake.start_thread().await.is_ok());
}

#[tokio::test]
async fn events_reach_registered_handlers() {
    let fake = FakeAgentAdapter::new();
    let count = Arc::new(AtomicUsize::new(0));
    let c = Arc::clone(&count);
    let sub = fake.on_event(Box::new(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    }));

    fake.emit_event(AdapterEvent::ThreadStarted { thread_id: "th-1".into() });
    sub.unsubscribe();
    fake.emit_event(AdapterEvent::ThreadStarted { thread_id: "th-1".into() });

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn approval_response_reports_token_knowledge() {
    let fake = FakeAgentAdapter::new();
    let req = ApprovalRequest {
        token: forks_core::ApprovalToken::generate(),
        approval_type: forks_core::ApprovalType::CommandExecution,
        params: crate::agent::ApprovalParams {
            thread_id: "th-1".into(),
            turn_id: "t".into(),
            item_id: "i".into(),
            command: None,
            cwd: None,
            reason: None,
            data: None,
        },
    };
    fake.emit_approval_request(req.clone());

    assert!(fake
        .respond_to_approval(req.token.as_str(), AdapterDecision::Accept)
        .await
        .unwrap());
    assert!(!fake.respond_to_approval("unknown", AdapterDecision::Decline).await.unwrap());
}
