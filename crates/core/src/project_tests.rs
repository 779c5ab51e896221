// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[parameterized(
    plain = { "myrepo", "myrepo" },
    spaces = { "my repo", "my-repo" },
    mixed = { "My_Repo-2", "My_Repo-2" },
    unicode = { "répo", "r-po" },
)]
fn slug_sanitizes(name: &str, expected: &str) {
    let p = Project::new(PathBuf::from("/tmp/r"), name, "main");
    assert_eq!(p.slug(), expected);
}

#[test]
fn slug_falls_back_to_id_suffix_when_empty() {
    let p = Project::new(PathBuf::from("/tmp/r"), "", "main");
    assert_eq!(p.slug(), p.id.suffix());
}

#[test]
fn serializes_camel_case() {
    let p = Project::new(PathBuf::from("/tmp/r"), "x", "main");
    let v = serde_json::to_value(&p).unwrap();
    assert!(v.get("defaultBranch").is_some());
    assert!(v.get("createdAt").is_some());
}
