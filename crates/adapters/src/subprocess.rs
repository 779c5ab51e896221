// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded subprocess execution for CLI collaborators (git, mostly).

use std::process::Output;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

/// Worktree add/remove and branch surgery should never take this long on a
/// local repo; a hung git process must not wedge the engine.
pub const GIT_WORKTREE_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Error)]
pub enum SubprocessError {
    #[error("{label} timed out after {timeout:?}")]
    Timeout { label: &'static str, timeout: Duration },

    #[error("{label} failed to spawn: {source}")]
    Spawn {
        label: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Run a command to completion with a deadline. The child is killed on
/// timeout (`kill_on_drop` covers the cancellation path too).
pub async fn run_with_timeout(
    mut cmd: Command,
    timeout: Duration,
    label: &'static str,
) -> Result<Output, SubprocessError> {
    cmd.kill_on_drop(true);
    match tokio::time::timeout(timeout, cmd.output()).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(source)) => Err(SubprocessError::Spawn { label, source }),
        Err(_) => {
            tracing::warn!(label, ?timeout, "subprocess timed out");
            Err(SubprocessError::Timeout { label, timeout })
        }
    }
}

#[cfg(test)]
#[path = "subprocess_tests.rs"]
mod tests;
