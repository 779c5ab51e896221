// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::registry::{ExecutionContext, ExecutionType};
use forks_adapters::{ApprovalParams, FakeAgentAdapter};
use forks_core::{ApprovalStatus, ApprovalToken, ChatId, EventBus};
use forks_storage::MemoryStore;
use tokio_util::sync::CancellationToken;

struct Fixture {
    store: Arc<MemoryStore>,
    adapter: Arc<FakeAgentAdapter>,
    registry: Arc<ExecutionRegistry>,
    broker: Arc<ApprovalBroker>,
    chat_id: ChatId,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new(EventBus::new()));
    let adapter = Arc::new(FakeAgentAdapter::new());
    let registry = Arc::new(ExecutionRegistry::new());
    let broker = Arc::new(ApprovalBroker::new(
        Arc::clone(&store) as Arc<dyn Store>,
        Arc::clone(&adapter) as Arc<dyn AgentAdapter>,
        Arc::clone(&registry),
    ));

    // One live execution owning thread "th-1".
    let chat_id = ChatId::new();
    registry.set(ExecutionContext {
        id: "s1".into(),
        chat_id,
        execution_type: ExecutionType::Subagent,
        thread_id: "th-1".into(),
        run_id: "run-1".into(),
        cwd: "/w".into(),
        cancel: CancellationToken::new(),
    });

    Fixture { store, adapter, registry, broker, chat_id }
}

fn request(thread_id: &str, command: &str) -> ApprovalRequest {
    ApprovalRequest {
        token: ApprovalToken::generate(),
        approval_type: forks_core::ApprovalType::CommandExecution,
        params: ApprovalParams {
            thread_id: thread_id.into(),
            turn_id: "turn-1".into(),
            item_id: "item-1".into(),
            command: Some(command.into()),
            cwd: Some("/w".into()),
            reason: None,
            data: None,
        },
    }
}

async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn accept_flow_persists_and_responds() {
    let f = fixture();
    let req = request("th-1", "git status");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;

    // Row exists, pending, bound to the owning chat.
    let row = f.store.get_approval_by_token(req.token.as_str()).unwrap();
    assert_eq!(row.status, ApprovalStatus::Pending);
    assert_eq!(row.chat_id, f.chat_id);
    assert_eq!(f.broker.pending_waiters(), 1);

    let resolved = f.broker.resolve(req.token.as_str(), ApprovalDecision::Accept).unwrap();
    assert_eq!(resolved.status, ApprovalStatus::Accepted);

    task.await.unwrap();
    assert_eq!(
        f.adapter.approval_responses(),
        [(req.token.as_str().to_string(), AdapterDecision::Accept)],
    );
    assert_eq!(f.broker.pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn accept_for_session_caches_identical_invocations() {
    let f = fixture();
    let first = request("th-1", "git status");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = first.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;
    f.broker.resolve(first.token.as_str(), ApprovalDecision::AcceptForSession).unwrap();
    task.await.unwrap();
    assert_eq!(f.broker.session_cache_len(), 1);

    // Identical follow-up: accepted immediately, no new row persisted.
    let second = request("th-1", "git status");
    f.broker.handle_request(second.clone()).await;
    assert!(f.store.get_approval_by_token(second.token.as_str()).is_none());
    assert_eq!(f.adapter.approval_responses().len(), 2);
    assert_eq!(f.adapter.approval_responses()[1].1, AdapterDecision::Accept);

    // A different command still prompts.
    let third = request("th-1", "rm -rf target");
    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = third.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;
    assert!(f.store.get_approval_by_token(third.token.as_str()).is_some());
    f.broker.resolve(third.token.as_str(), ApprovalDecision::Decline).unwrap();
    task.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn unknown_thread_is_declined_without_a_row() {
    let f = fixture();
    let req = request("th-unowned", "ls");
    f.broker.handle_request(req.clone()).await;

    assert!(f.store.get_approval_by_token(req.token.as_str()).is_none());
    assert_eq!(
        f.adapter.approval_responses(),
        [(req.token.as_str().to_string(), AdapterDecision::Decline)],
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_cancels_the_row_and_declines() {
    let f = fixture();
    let req = request("th-1", "make deploy");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;
    assert_eq!(f.broker.pending_waiters(), 1);

    // No response for the full window; paused clock fast-forwards.
    tokio::time::sleep(DEFAULT_APPROVAL_TIMEOUT + std::time::Duration::from_secs(1)).await;
    task.await.unwrap();

    let row = f.store.get_approval_by_token(req.token.as_str()).unwrap();
    assert_eq!(row.status, ApprovalStatus::Cancelled);
    assert_eq!(f.adapter.approval_responses().last().unwrap().1, AdapterDecision::Decline);
    assert_eq!(f.broker.pending_waiters(), 0);
}

#[tokio::test(start_paused = true)]
async fn out_of_band_resolution_wins_over_timeout() {
    let f = fixture();
    let req = request("th-1", "ls");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;

    // Resolve through the store directly (another daemon surface), leaving
    // the waiter in place to hit the timeout path.
    let row = f.store.get_approval_by_token(req.token.as_str()).unwrap();
    f.store.respond_to_approval(&row.id, true).unwrap();

    tokio::time::sleep(DEFAULT_APPROVAL_TIMEOUT + std::time::Duration::from_secs(1)).await;
    task.await.unwrap();

    // The out-of-band accept is honored at expiry.
    assert_eq!(f.adapter.approval_responses().last().unwrap().1, AdapterDecision::Accept);
    let row = f.store.get_approval(&row.id).unwrap();
    assert_eq!(row.status, ApprovalStatus::Accepted);
}

#[tokio::test(start_paused = true)]
async fn thread_cancellation_declines_and_cancels_rows() {
    let f = fixture();
    let req = request("th-1", "ls");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;

    f.broker.cancel_for_thread("th-1");
    task.await.unwrap();

    let row = f.store.get_approval_by_token(req.token.as_str()).unwrap();
    assert_eq!(row.status, ApprovalStatus::Cancelled);
    assert_eq!(f.adapter.approval_responses().last().unwrap().1, AdapterDecision::Decline);
}

#[tokio::test(start_paused = true)]
async fn shutdown_declines_everything_and_clears_the_cache() {
    let f = fixture();
    let req = request("th-1", "ls");

    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;

    f.broker.shutdown();
    task.await.unwrap();

    assert_eq!(f.broker.pending_waiters(), 0);
    assert_eq!(f.broker.session_cache_len(), 0);
    let row = f.store.get_approval_by_token(req.token.as_str()).unwrap();
    assert_eq!(row.status, ApprovalStatus::Cancelled);

    // New requests while stopped are declined immediately.
    let late = request("th-1", "ls");
    f.broker.handle_request(late.clone()).await;
    assert!(f.store.get_approval_by_token(late.token.as_str()).is_none());
}

#[tokio::test(start_paused = true)]
async fn resolve_validates_token_shape_and_state() {
    let f = fixture();
    assert_eq!(
        f.broker.resolve("short", ApprovalDecision::Accept).unwrap_err(),
        forks_core::ErrorKind::InvalidApprovalToken,
    );

    let missing = ApprovalToken::generate();
    assert_eq!(
        f.broker.resolve(missing.as_str(), ApprovalDecision::Accept).unwrap_err(),
        forks_core::ErrorKind::NotFound,
    );

    // Already-resolved rows cannot be re-resolved.
    let req = request("th-1", "ls");
    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;
    f.broker.resolve(req.token.as_str(), ApprovalDecision::Decline).unwrap();
    task.await.unwrap();
    assert_eq!(
        f.broker.resolve(req.token.as_str(), ApprovalDecision::Accept).unwrap_err(),
        forks_core::ErrorKind::NotPending,
    );
}

#[tokio::test(start_paused = true)]
async fn registry_is_left_untouched_by_broker_flows() {
    let f = fixture();
    let req = request("th-1", "ls");
    let broker = Arc::clone(&f.broker);
    let task = tokio::spawn({
        let req = req.clone();
        async move { broker.handle_request(req).await }
    });
    settle().await;
    f.broker.resolve(req.token.as_str(), ApprovalDecision::Accept).unwrap();
    task.await.unwrap();
    assert_eq!(f.registry.size(), 1);
}
