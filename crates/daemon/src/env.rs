// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Centralized environment variable access for the daemon crate.

use std::net::SocketAddr;
use std::path::PathBuf;

/// Protocol version (from Cargo.toml).
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Resolve the forks root: `FORKSD_ROOT` > `~/.forks`.
pub fn forks_root() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("FORKSD_ROOT") {
        return Some(PathBuf::from(dir));
    }
    dirs::home_dir().map(|home| home.join(".forks"))
}

/// WebSocket bind address (default localhost only).
pub fn bind_addr() -> SocketAddr {
    std::env::var("FORKSD_BIND")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8870)))
}

/// Auth token clients must present. When unset, auth is disabled (local
/// trusted use).
pub fn auth_token() -> Option<String> {
    std::env::var("FORKSD_AUTH_TOKEN").ok().filter(|s| !s.is_empty())
}

/// Extra allowed origins beyond the localhost/file defaults,
/// comma-separated.
pub fn allowed_origins() -> Vec<String> {
    std::env::var("FORKSD_ALLOWED_ORIGINS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|o| o.trim().trim_end_matches('/').to_string())
                .filter(|o| !o.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
