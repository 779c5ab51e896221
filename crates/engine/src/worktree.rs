// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Worktree allocation and reclamation under the daemon's two roots.
//!
//! `workspaces_root` holds long-lived worktrees, `attempts_root` the
//! ephemeral per-attempt ones. Every public method validates identifier
//! components and checks full containment under the declared root before
//! touching the filesystem; a path like `ROOT-evil` must never pass.

use std::path::{Component, Path, PathBuf};

use forks_adapters::subprocess::{run_with_timeout, SubprocessError, GIT_WORKTREE_TIMEOUT};
use forks_core::{AttemptId, Workspace, WorkspaceId};
use futures_util::StreamExt;
use thiserror::Error;
use tokio::process::Command;

/// Concurrent worktree removals during bulk cleanup.
const CLEANUP_PARALLELISM: usize = 4;

const MAX_COMPONENT_LEN: usize = 256;

#[derive(Debug, Error)]
pub enum WorktreeError {
    #[error("invalid id: {0}")]
    InvalidId(String),

    #[error("invalid branch: {0}")]
    InvalidBranch(String),

    #[error("path escapes root: {0}")]
    InvalidPath(PathBuf),

    #[error("{context}: {detail}")]
    Git { context: &'static str, detail: String },

    #[error(transparent)]
    Subprocess(#[from] SubprocessError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The two rooted directories all worktrees live under.
#[derive(Debug, Clone)]
pub struct WorktreeRoots {
    pub workspaces_root: PathBuf,
    pub attempts_root: PathBuf,
}

impl WorktreeRoots {
    pub fn new(workspaces_root: PathBuf, attempts_root: PathBuf) -> Self {
        Self { workspaces_root, attempts_root }
    }

    /// The default layout under the user's home: `~/.forks/workspaces`
    /// and `~/.forks/attempts`.
    pub fn under(home: &Path) -> Self {
        let base = home.join(".forks");
        Self { workspaces_root: base.join("workspaces"), attempts_root: base.join("attempts") }
    }
}

pub struct WorktreeManager {
    roots: WorktreeRoots,
}

impl WorktreeManager {
    pub fn new(roots: WorktreeRoots) -> Self {
        Self { roots }
    }

    pub fn workspaces_root(&self) -> &Path {
        &self.roots.workspaces_root
    }

    pub fn attempts_root(&self) -> &Path {
        &self.roots.attempts_root
    }

    /// Allocate a long-lived workspace worktree at
    /// `workspaces_root/<project-slug>/<workspace-id>`, creating the
    /// branch if it does not exist yet.
    pub async fn create_workspace_worktree(
        &self,
        repo_path: &Path,
        project_slug: &str,
        workspace_id: &WorkspaceId,
        branch: &str,
    ) -> Result<PathBuf, WorktreeError> {
        validate_component(project_slug)?;
        validate_component(workspace_id.as_str())?;
        validate_branch(branch)?;

        let path = self.roots.workspaces_root.join(project_slug).join(workspace_id.as_str());
        ensure_under(&self.roots.workspaces_root, &path)?;

        let new_branch = !branch_exists(repo_path, branch).await;
        worktree_add(repo_path, &path, branch, new_branch).await?;
        Ok(path)
    }

    /// Allocate an ephemeral attempt worktree at
    /// `attempts_root/<workspace-id>/<attempt-id>` on branch
    /// `attempt/<attempt-id>`, started from the workspace's HEAD.
    pub async fn create(
        &self,
        attempt_id: &AttemptId,
        workspace: &Workspace,
    ) -> Result<(PathBuf, String), WorktreeError> {
        validate_component(workspace.id.as_str())?;
        validate_component(attempt_id.as_str())?;
        let branch = format!("attempt/{attempt_id}");
        validate_branch(&branch)?;

        let path = self.roots.attempts_root.join(workspace.id.as_str()).join(attempt_id.as_str());
        ensure_under(&self.roots.attempts_root, &path)?;

        worktree_add(&workspace.path, &path, &branch, true).await?;
        Ok((path, branch))
    }

    /// Remove one attempt worktree and its branch. `git worktree remove
    /// --force` first; if that fails, recursive delete; branch deletion is
    /// best-effort throughout.
    pub async fn cleanup(
        &self,
        path: &Path,
        branch: Option<&str>,
        repo_path: &Path,
    ) -> Result<(), WorktreeError> {
        ensure_under(&self.roots.attempts_root, path)?;

        let mut cmd = Command::new("git");
        cmd.args(["-C", &repo_path.display().to_string(), "worktree", "remove", "--force"])
            .arg(path)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let removed = match run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove").await
        {
            Ok(output) if output.status.success() => true,
            Ok(output) => {
                tracing::debug!(
                    path = %path.display(),
                    stderr = %String::from_utf8_lossy(&output.stderr).trim(),
                    "git worktree remove failed; falling back to rmdir"
                );
                false
            }
            Err(e) => {
                tracing::debug!(path = %path.display(), error = %e, "git worktree remove errored");
                false
            }
        };

        if !removed && path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove worktree directory (best-effort)"
                );
            }
        }

        if let Some(branch) = branch {
            if validate_branch(branch).is_ok() {
                let mut cmd = Command::new("git");
                cmd.args(["-C", &repo_path.display().to_string(), "branch", "-D", branch])
                    .env_remove("GIT_DIR")
                    .env_remove("GIT_WORK_TREE");
                // Ignore errors: the branch may be checked out elsewhere or
                // already gone.
                let _ = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git branch delete").await;
            }
        }

        Ok(())
    }

    /// Remove every attempt worktree of a workspace that is not in the
    /// keep-set, then the workspace subdirectory if it emptied out.
    /// Individual failures are logged and never abort the batch.
    pub async fn cleanup_for_workspace(
        &self,
        workspace_id: &WorkspaceId,
        keep: &[AttemptId],
        repo_path: &Path,
    ) -> Result<(), WorktreeError> {
        validate_component(workspace_id.as_str())?;
        let dir = self.roots.attempts_root.join(workspace_id.as_str());
        ensure_under(&self.roots.attempts_root, &dir)?;

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let mut doomed = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy().into_owned();
            if keep.iter().any(|id| id.as_str() == name) {
                continue;
            }
            doomed.push((entry.path(), format!("attempt/{name}")));
        }

        futures_util::stream::iter(doomed)
            .for_each_concurrent(CLEANUP_PARALLELISM, |(path, branch)| async move {
                if let Err(e) = self.cleanup(&path, Some(&branch), repo_path).await {
                    tracing::warn!(path = %path.display(), error = %e, "attempt cleanup failed");
                }
            })
            .await;

        // Remove the per-workspace directory once it has emptied out.
        if let Ok(mut rest) = tokio::fs::read_dir(&dir).await {
            if rest.next_entry().await.ok().flatten().is_none() {
                let _ = tokio::fs::remove_dir(&dir).await;
            }
        }
        Ok(())
    }

    /// Remove a long-lived workspace worktree. Refuses directories outside
    /// the workspaces root, so a workspace whose recorded path escaped the
    /// layout can never be deleted through this manager.
    pub async fn remove_workspace_worktree(
        &self,
        path: &Path,
        branch: Option<&str>,
        repo_path: &Path,
    ) -> Result<(), WorktreeError> {
        ensure_under(&self.roots.workspaces_root, path)?;

        let mut cmd = Command::new("git");
        cmd.args(["-C", &repo_path.display().to_string(), "worktree", "remove", "--force"])
            .arg(path)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let removed = matches!(
            run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree remove").await,
            Ok(output) if output.status.success()
        );
        if !removed && path.exists() {
            if let Err(e) = tokio::fs::remove_dir_all(path).await {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to remove workspace directory (best-effort)"
                );
            }
        }

        if let Some(branch) = branch {
            if validate_branch(branch).is_ok() {
                let mut cmd = Command::new("git");
                cmd.args(["-C", &repo_path.display().to_string(), "branch", "-D", branch])
                    .env_remove("GIT_DIR")
                    .env_remove("GIT_WORK_TREE");
                let _ = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git branch delete").await;
            }
        }
        Ok(())
    }

    /// `git reset --hard <branch>` in the workspace, refusing branches that
    /// do not resolve to a ref.
    pub async fn reset_workspace(
        &self,
        workspace_path: &Path,
        branch: &str,
    ) -> Result<(), WorktreeError> {
        validate_branch(branch)?;
        if !branch_exists(workspace_path, branch).await {
            return Err(WorktreeError::InvalidBranch(branch.to_string()));
        }

        let mut cmd = Command::new("git");
        cmd.args(["-C", &workspace_path.display().to_string(), "reset", "--hard", branch])
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE");
        let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git reset").await?;
        if !output.status.success() {
            return Err(WorktreeError::Git {
                context: "git reset --hard",
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

/// Identifier components used in paths: `[A-Za-z0-9_-]`, 1..=256 bytes.
/// `.` and `..` are unrepresentable in that charset but rejected
/// explicitly anyway.
pub fn validate_component(s: &str) -> Result<(), WorktreeError> {
    if s.is_empty() || s.len() > MAX_COMPONENT_LEN || s == "." || s == ".." {
        return Err(WorktreeError::InvalidId(s.to_string()));
    }
    if !s.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
        return Err(WorktreeError::InvalidId(s.to_string()));
    }
    Ok(())
}

/// Git ref-name validation, the subset that matters for branch names.
pub fn validate_branch(branch: &str) -> Result<(), WorktreeError> {
    let invalid = branch.is_empty()
        || branch.len() > MAX_COMPONENT_LEN
        || branch.starts_with('-')
        || branch.starts_with('/')
        || branch.ends_with('/')
        || branch.ends_with('.')
        || branch.ends_with(".lock")
        || branch.contains("..")
        || branch.contains("//")
        || branch.contains("@{")
        || branch
            .bytes()
            .any(|b| b.is_ascii_control() || matches!(b, b' ' | b'~' | b'^' | b':' | b'?' | b'*' | b'[' | b'\\'));
    if invalid {
        Err(WorktreeError::InvalidBranch(branch.to_string()))
    } else {
        Ok(())
    }
}

/// Containment check: no `.`/`..` components and a component-wise prefix
/// match against the root (so `ROOT-evil` never passes).
fn ensure_under(root: &Path, path: &Path) -> Result<(), WorktreeError> {
    let clean = path
        .components()
        .all(|c| !matches!(c, Component::ParentDir | Component::CurDir));
    if clean && path.starts_with(root) && path != root {
        Ok(())
    } else {
        Err(WorktreeError::InvalidPath(path.to_path_buf()))
    }
}

async fn branch_exists(repo_path: &Path, branch: &str) -> bool {
    let mut cmd = Command::new("git");
    cmd.args([
        "-C",
        &repo_path.display().to_string(),
        "rev-parse",
        "--verify",
        "--quiet",
        &format!("refs/heads/{branch}"),
    ])
    .env_remove("GIT_DIR")
    .env_remove("GIT_WORK_TREE");
    match run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git rev-parse").await {
        Ok(output) => output.status.success(),
        Err(_) => false,
    }
}

async fn worktree_add(
    repo_path: &Path,
    path: &Path,
    branch: &str,
    new_branch: bool,
) -> Result<(), WorktreeError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let mut cmd = Command::new("git");
    cmd.args(["-C", &repo_path.display().to_string(), "worktree", "add"]);
    if new_branch {
        cmd.args(["-b", branch]);
    }
    cmd.arg(path);
    if new_branch {
        cmd.arg("HEAD");
    } else {
        cmd.arg(branch);
    }
    cmd.env_remove("GIT_DIR").env_remove("GIT_WORK_TREE");

    let output = run_with_timeout(cmd, GIT_WORKTREE_TIMEOUT, "git worktree add").await?;
    if !output.status.success() {
        return Err(WorktreeError::Git {
            context: "git worktree add",
            detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "worktree_tests.rs"]
mod tests;
