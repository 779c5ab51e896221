// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon assembly and ordered shutdown.
//!
//! Startup: take the single-instance lock, build the store/bus/engine
//! around the provided adapter, bind the gateway. Shutdown: stop the
//! runner (cancels live executions, declines approvals), shut the PTYs
//! down, then stop accepting connections.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use forks_adapters::subprocess::{run_with_timeout, GIT_WORKTREE_TIMEOUT};
use forks_adapters::AgentAdapter;
use forks_core::{
    Approval, ErrorKind, EventBus, Project, ProjectId, Workspace, WorkspaceId,
};
use forks_engine::{ApprovalBroker, ExecutionRegistry, Runner, WorktreeManager, WorktreeRoots};
use forks_pty::PtyManager;
use forks_storage::{MemoryStore, Store};
use forks_wire::ApprovalDecision;
use fs2::FileExt;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::gateway::{Gateway, GatewayConfig};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot determine the forks root (no home directory)")]
    NoRoot,

    #[error("another forksd instance holds the lock at {0}")]
    AlreadyRunning(PathBuf),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The assembled daemon.
pub struct Daemon {
    pub bus: EventBus,
    pub store: Arc<dyn Store>,
    pub adapter: Arc<dyn AgentAdapter>,
    pub registry: Arc<ExecutionRegistry>,
    pub broker: Arc<ApprovalBroker>,
    pub runner: Arc<Runner>,
    pub worktrees: Arc<WorktreeManager>,
    pub pty: Arc<PtyManager>,
    pub gateway: Arc<Gateway>,
    shutdown: CancellationToken,
    /// Held for the daemon's lifetime; releasing it frees the instance
    /// slot.
    _instance_lock: File,
}

impl std::fmt::Debug for Daemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Daemon").finish_non_exhaustive()
    }
}

impl Daemon {
    /// Build every component around the provided adapter. `root` is the
    /// forks home (usually `~/.forks`).
    pub fn build(
        adapter: Arc<dyn AgentAdapter>,
        root: &Path,
        gateway_config: GatewayConfig,
    ) -> Result<Self, LifecycleError> {
        std::fs::create_dir_all(root)?;
        let lock_path = root.join("forksd.lock");
        let instance_lock = File::create(&lock_path)?;
        if instance_lock.try_lock_exclusive().is_err() {
            return Err(LifecycleError::AlreadyRunning(lock_path));
        }

        let bus = EventBus::new();
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new(bus.clone()));
        let registry = Arc::new(ExecutionRegistry::new());
        let broker = Arc::new(ApprovalBroker::new(
            Arc::clone(&store),
            Arc::clone(&adapter),
            Arc::clone(&registry),
        ));
        let worktrees = Arc::new(WorktreeManager::new(WorktreeRoots::new(
            root.join("workspaces"),
            root.join("attempts"),
        )));
        let runner = Arc::new(Runner::new(
            Arc::clone(&store),
            Arc::clone(&adapter),
            Arc::clone(&registry),
            Arc::clone(&broker),
            Arc::clone(&worktrees),
        ));
        let pty = Arc::new(PtyManager::new(bus.clone()));
        let gateway =
            Gateway::new(bus.clone(), Arc::clone(&adapter), Arc::clone(&pty), gateway_config);

        Ok(Self {
            bus,
            store,
            adapter,
            registry,
            broker,
            runner,
            worktrees,
            pty,
            gateway,
            shutdown: CancellationToken::new(),
            _instance_lock: instance_lock,
        })
    }

    /// Serve until [`Daemon::shutdown`] is called.
    pub async fn run(&self, listener: TcpListener) {
        self.runner.start();
        Arc::clone(&self.gateway).run(listener, self.shutdown.clone()).await;
    }

    /// The thin HTTP gateway's entry point for `POST
    /// /approval/{token}/respond`.
    pub fn respond_to_approval(
        &self,
        token: &str,
        decision: ApprovalDecision,
    ) -> Result<Approval, ErrorKind> {
        self.broker.resolve(token, decision)
    }

    /// Spawn a shell on a fresh PTY and adopt it. Entry point for the
    /// terminal-creation surface of the HTTP layer.
    pub fn create_terminal(
        &self,
        cwd: &Path,
        cols: u16,
        rows: u16,
        owner: forks_core::TerminalOwner,
        visible: bool,
        command: Option<&str>,
    ) -> Result<forks_core::TerminalId, forks_pty::PtyError> {
        let io = forks_pty::spawn_shell(cwd, cols, rows, command)?;
        let id = forks_core::TerminalId::new();
        self.pty.register(
            id,
            io,
            forks_pty::RegisterOptions {
                cwd: cwd.to_path_buf(),
                owner,
                visible,
                command: command.map(str::to_string),
                on_close: None,
            },
        );
        Ok(id)
    }

    /// Register a git repository as a project.
    pub async fn register_project(
        &self,
        path: &Path,
        name: &str,
    ) -> Result<Project, ErrorKind> {
        if !path.join(".git").exists() {
            return Err(ErrorKind::InvalidPath(
                "path is not a git repository".to_string(),
            ));
        }
        let default_branch = detect_default_branch(path).await;
        let project = Project::new(path.to_path_buf(), name, default_branch);
        self.store.create_project(project.clone());
        Ok(project)
    }

    /// Allocate a long-lived workspace worktree for a project.
    pub async fn create_workspace(
        &self,
        project_id: &ProjectId,
        name: &str,
        branch: &str,
    ) -> Result<Workspace, ErrorKind> {
        let project = self.store.get_project(project_id).ok_or(ErrorKind::NotFound)?;
        let workspace_id = WorkspaceId::new();
        let path = self
            .worktrees
            .create_workspace_worktree(&project.path, &project.slug(), &workspace_id, branch)
            .await
            .map_err(map_worktree_error)?;

        let mut workspace = Workspace::new(project.id, path, branch, name);
        workspace.id = workspace_id;
        self.store.create_workspace(workspace.clone());
        Ok(workspace)
    }

    /// Tear a workspace down: worktree first (containment-checked — a
    /// workspace whose directory escaped the workspaces root is refused),
    /// then the row.
    pub async fn delete_workspace(&self, id: &WorkspaceId) -> Result<(), ErrorKind> {
        let workspace = self.store.get_workspace(id).ok_or(ErrorKind::NotFound)?;
        let project = self.store.get_project(&workspace.project_id).ok_or(ErrorKind::NotFound)?;

        self.worktrees
            .remove_workspace_worktree(&workspace.path, Some(&workspace.branch), &project.path)
            .await
            .map_err(map_worktree_error)?;
        self.store.delete_workspace(id);
        Ok(())
    }

    /// Ordered shutdown: drain executions, close PTYs, stop the gateway.
    pub async fn shutdown(&self) {
        tracing::info!("forksd shutting down");
        self.runner.stop().await;
        self.pty.shutdown_all().await;
        self.shutdown.cancel();
    }
}

/// `git symbolic-ref --short HEAD` in the repo, falling back to `main`.
async fn detect_default_branch(repo: &Path) -> String {
    let mut cmd = tokio::process::Command::new("git");
    cmd.args(["-C", &repo.display().to_string(), "symbolic-ref", "--short", "HEAD"])
        .env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE");
    match run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git symbolic-ref").await {
        Ok(output) if output.status.success() => {
            String::from_utf8_lossy(&output.stdout).trim().to_string()
        }
        _ => "main".to_string(),
    }
}

fn map_worktree_error(error: forks_engine::worktree::WorktreeError) -> ErrorKind {
    use forks_engine::worktree::WorktreeError;
    match error {
        WorktreeError::InvalidId(id) => ErrorKind::InvalidId(id),
        WorktreeError::InvalidBranch(branch) => ErrorKind::InvalidBranch(branch),
        WorktreeError::InvalidPath(path) => {
            ErrorKind::InvalidPath(path.display().to_string())
        }
        other => ErrorKind::Internal(other.to_string()),
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
