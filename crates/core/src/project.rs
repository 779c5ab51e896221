// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Project record: a tracked git repository root.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

crate::entity_id! {
    /// Unique identifier for a registered project.
    pub struct ProjectId("prj-");
}

/// A tracked git repository root. Deleting a project cascades to its
/// workspaces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    pub name: String,
    pub default_branch: String,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn new(path: PathBuf, name: impl Into<String>, default_branch: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            path,
            name: name.into(),
            default_branch: default_branch.into(),
            created_at: Utc::now(),
        }
    }

    /// Filesystem-safe slug derived from the project name, used as the
    /// directory component under the workspaces root.
    pub fn slug(&self) -> String {
        let slug: String = self
            .name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        if slug.is_empty() {
            self.id.suffix().to_string()
        } else {
            slug
        }
    }
}

#[cfg(test)]
#[path = "project_tests.rs"]
mod tests;
