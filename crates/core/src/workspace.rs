// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workspace record: a long-lived git worktree off a project.
//!
//! WorkspaceId is distinct from the workspace path (the worktree directory).
//! A workspace outlives individual chats and attempts; its path must always
//! lie under the configured workspaces root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::project::ProjectId;

crate::entity_id! {
    /// Unique identifier for a workspace instance.
    pub struct WorkspaceId("wks-");
}

/// Lifecycle status of a workspace.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkspaceStatus {
    #[default]
    Active,
    Archived,
}

crate::display_as! {
    WorkspaceStatus {
        Active => "active",
        Archived => "archived",
    }
}

/// A long-lived git worktree off a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: WorkspaceId,
    pub project_id: ProjectId,
    pub path: PathBuf,
    pub branch: String,
    pub name: String,
    pub status: WorkspaceStatus,
    pub created_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl Workspace {
    pub fn new(
        project_id: ProjectId,
        path: PathBuf,
        branch: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: WorkspaceId::new(),
            project_id,
            path,
            branch: branch.into(),
            name: name.into(),
            status: WorkspaceStatus::Active,
            created_at: now,
            last_accessed_at: now,
        }
    }
}
