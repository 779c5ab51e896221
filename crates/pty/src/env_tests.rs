// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    path = { "PATH" },
    home = { "HOME" },
    shell = { "SHELL" },
    term = { "TERM" },
    xdg = { "XDG_CONFIG_HOME" },
    locale = { "LC_ALL" },
)]
fn desktop_vars_pass(name: &str) {
    assert!(is_allowed(name));
}

#[parameterized(
    api_key = { "MY_API_KEY" },
    aws = { "AWS_SECRET_ACCESS_KEY" },
    github = { "GITHUB_TOKEN" },
    stripe = { "STRIPE_WEBHOOK_SECRET" },
    anthropic = { "ANTHROPIC_API_KEY" },
    lowercase = { "npm_config_token" },
    password = { "DB_PASSWORD" },
)]
fn credentials_are_denied(name: &str) {
    assert!(is_denied(name));
    assert!(!is_allowed(name));
}

#[parameterized(
    random = { "SOME_RANDOM_VAR" },
    cargo = { "CARGO_TARGET_DIR" },
    ld = { "LD_PRELOAD" },
)]
fn unlisted_vars_are_dropped(name: &str) {
    assert!(!is_allowed(name));
}

#[test]
fn blocklist_beats_allowlist_prefix() {
    // An XDG_* name carrying a credential fragment must still be dropped.
    assert!(!is_allowed("XDG_SECRET_TOKEN"));
}

#[test]
fn filtered_env_contains_no_denied_names() {
    for (name, _) in filtered_env() {
        assert!(!is_denied(&name), "denied name leaked: {name}");
    }
}
