// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Environment filtering for spawned shells.
//!
//! Child shells get a small allowlist of desktop/locale variables plus
//! `XDG_*` and `LC_*`. A credential blocklist is applied on top so that a
//! future allowlist addition can never leak a secret-bearing name.

/// Exact names passed through to child shells.
const ALLOWED_NAMES: &[&str] = &[
    "PATH", "HOME", "USER", "LOGNAME", "SHELL", "LANG", "TERM", "TZ", "COLORTERM", "DISPLAY",
    "EDITOR", "PAGER", "TMPDIR", "PWD",
];

/// Prefixes passed through to child shells.
const ALLOWED_PREFIXES: &[&str] = &["XDG_", "LC_"];

/// Credential-bearing fragments. A name containing any of these is
/// rejected regardless of the allowlist.
const BLOCKED_FRAGMENTS: &[&str] =
    &["API_KEY", "APIKEY", "TOKEN", "SECRET", "PASSWORD", "PASSWD", "CREDENTIAL", "PRIVATE_KEY"];

/// Vendor credential prefixes.
const BLOCKED_PREFIXES: &[&str] =
    &["AWS_", "GITHUB_", "GITLAB_", "OPENAI_", "ANTHROPIC_", "STRIPE_", "GCP_", "AZURE_"];

/// Whether a variable name may be passed into a PTY child process.
pub fn is_allowed(name: &str) -> bool {
    if is_denied(name) {
        return false;
    }
    ALLOWED_NAMES.contains(&name) || ALLOWED_PREFIXES.iter().any(|p| name.starts_with(p))
}

/// Whether a variable name matches the credential blocklist.
pub fn is_denied(name: &str) -> bool {
    let upper = name.to_ascii_uppercase();
    BLOCKED_FRAGMENTS.iter().any(|f| upper.contains(f))
        || BLOCKED_PREFIXES.iter().any(|p| upper.starts_with(p))
}

/// The filtered environment for a child shell, taken from this process.
pub fn filtered_env() -> Vec<(String, String)> {
    std::env::vars().filter(|(name, _)| is_allowed(name)).collect()
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
