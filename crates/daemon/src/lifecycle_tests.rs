// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forks_adapters::{ApprovalParams, ApprovalRequest, FakeAgentAdapter};
use forks_core::{ApprovalStatus, ApprovalToken, Chat, Subagent, SubagentStatus, Workspace};
use forks_engine::ExecutionContext;

fn build(tmp: &std::path::Path) -> (Daemon, Arc<FakeAgentAdapter>) {
    let adapter = Arc::new(FakeAgentAdapter::new());
    let daemon = Daemon::build(
        Arc::clone(&adapter) as Arc<dyn AgentAdapter>,
        &tmp.join(".forks"),
        GatewayConfig::default(),
    )
    .unwrap();
    (daemon, adapter)
}

#[tokio::test(flavor = "multi_thread")]
async fn second_instance_is_refused() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, _) = build(tmp.path());

    let adapter = Arc::new(FakeAgentAdapter::new());
    let err = Daemon::build(
        adapter as Arc<dyn AgentAdapter>,
        &tmp.path().join(".forks"),
        GatewayConfig::default(),
    )
    .unwrap_err();
    assert!(matches!(err, LifecycleError::AlreadyRunning(_)));
    drop(daemon);
}

#[tokio::test(flavor = "multi_thread")]
async fn approval_response_resolves_through_the_broker() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, adapter) = build(tmp.path());

    // One live execution so the request resolves to a chat.
    let chat_id = forks_core::ChatId::new();
    daemon.registry.set(ExecutionContext {
        id: "s1".into(),
        chat_id,
        execution_type: forks_engine::ExecutionType::Subagent,
        thread_id: "th-1".into(),
        run_id: "run-1".into(),
        cwd: "/w".into(),
        cancel: tokio_util::sync::CancellationToken::new(),
    });

    let request = ApprovalRequest {
        token: ApprovalToken::generate(),
        approval_type: forks_core::ApprovalType::CommandExecution,
        params: ApprovalParams {
            thread_id: "th-1".into(),
            turn_id: "t".into(),
            item_id: "i".into(),
            command: Some("ls".into()),
            cwd: None,
            reason: None,
            data: None,
        },
    };
    let broker = Arc::clone(&daemon.broker);
    let handle = tokio::spawn({
        let request = request.clone();
        async move { broker.handle_request(request).await }
    });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    // Bad token shape is rejected before any lookup.
    assert!(daemon.respond_to_approval("nope", ApprovalDecision::Accept).is_err());

    let row = daemon
        .respond_to_approval(request.token.as_str(), ApprovalDecision::Accept)
        .unwrap();
    assert_eq!(row.status, ApprovalStatus::Accepted);
    handle.await.unwrap();
    assert_eq!(adapter.approval_responses().len(), 1);
}

fn init_repo(dir: &std::path::Path) {
    for args in [
        vec!["init", "-b", "main"],
        vec!["commit", "--allow-empty", "-m", "init"],
    ] {
        let status = std::process::Command::new("git")
            .arg("-C")
            .arg(dir)
            .args(["-c", "user.email=t@t", "-c", "user.name=t"])
            .args(&args)
            .status()
            .unwrap();
        assert!(status.success());
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn project_and_workspace_provisioning_round_trip() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, _adapter) = build(tmp.path());

    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();

    // Not a repository yet.
    assert!(matches!(
        daemon.register_project(&repo, "proj").await,
        Err(forks_core::ErrorKind::InvalidPath(_)),
    ));

    init_repo(&repo);
    let project = daemon.register_project(&repo, "proj").await.unwrap();
    assert_eq!(project.default_branch, "main");

    let workspace = daemon.create_workspace(&project.id, "feature", "feature-1").await.unwrap();
    assert!(workspace.path.starts_with(daemon.worktrees.workspaces_root()));
    assert!(workspace.path.join(".git").exists());

    daemon.delete_workspace(&workspace.id).await.unwrap();
    assert!(!workspace.path.exists());
    assert!(daemon.store.get_workspace(&workspace.id).is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn workspace_outside_the_root_cannot_be_deleted() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, _adapter) = build(tmp.path());

    let repo = tmp.path().join("repo");
    std::fs::create_dir_all(&repo).unwrap();
    init_repo(&repo);
    let project = daemon.register_project(&repo, "proj").await.unwrap();

    // A workspace row whose path escaped the layout.
    let rogue = Workspace::new(project.id, tmp.path().join("elsewhere"), "main", "rogue");
    daemon.store.create_workspace(rogue.clone());

    assert!(matches!(
        daemon.delete_workspace(&rogue.id).await,
        Err(forks_core::ErrorKind::InvalidPath(_)),
    ));
    assert!(daemon.store.get_workspace(&rogue.id).is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn terminal_round_trip_through_a_real_shell() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, _adapter) = build(tmp.path());

    let id = match daemon.create_terminal(
        tmp.path(),
        80,
        24,
        forks_core::TerminalOwner::User,
        true,
        Some("echo forksd-$((40+2))"),
    ) {
        Ok(id) => id,
        Err(e) => {
            // PTY allocation may be restricted in some sandboxes.
            eprintln!("skipping test due to restricted PTY: {e}");
            return;
        }
    };

    for _ in 0..200 {
        if let Some(history) = daemon.pty.get_history(&id) {
            if String::from_utf8_lossy(&history).contains("forksd-42") {
                return;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(25)).await;
    }
    panic!("shell output never reached the session history");
}

#[tokio::test(flavor = "multi_thread")]
async fn shutdown_drains_runner_state() {
    let tmp = tempfile::tempdir().unwrap();
    let (daemon, _adapter) = build(tmp.path());
    daemon.runner.start();

    let ws_path = tmp.path().join("w");
    std::fs::create_dir_all(&ws_path).unwrap();
    let project = forks_core::Project::new(ws_path.clone(), "p", "main");
    daemon.store.create_project(project.clone());
    let workspace = Workspace::new(project.id, ws_path, "main", "w");
    daemon.store.create_workspace(workspace.clone());
    let chat = Chat::new(workspace.id);
    daemon.store.create_chat(chat.clone());

    let subagent = Subagent::new(chat.id, "t");
    let id = subagent.id;
    daemon.runner.execute_subagent(subagent).await.unwrap();
    assert_eq!(daemon.registry.size(), 1);

    daemon.shutdown().await;

    assert_eq!(daemon.registry.size(), 0);
    assert_eq!(daemon.store.get_subagent(&id).unwrap().status, SubagentStatus::Cancelled);
}
