// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use yare::parameterized;

#[test]
fn generated_tokens_are_43_chars() {
    let t = ApprovalToken::generate();
    assert_eq!(t.as_str().len(), TOKEN_LEN);
    assert!(ApprovalToken::is_valid_shape(t.as_str()));
}

#[test]
fn generated_tokens_are_unique() {
    let a = ApprovalToken::generate();
    let b = ApprovalToken::generate();
    assert_ne!(a, b);
}

#[parameterized(
    too_short = { "abc" },
    too_long = { "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA" },
    padding = { "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=" },
    plus = { "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA+" },
    slash = { "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA/" },
    space = { "AAAAAAAAAAAAAAAAAAAAA AAAAAAAAAAAAAAAAAAAAA" },
)]
fn rejects_malformed_shapes(s: &str) {
    assert!(!ApprovalToken::is_valid_shape(s));
    assert!(ApprovalToken::parse(s).is_err());
}

#[test]
fn accepts_url_safe_charset() {
    let s = "abcDEF123-_abcDEF123-_abcDEF123-_abcDEF123-";
    assert_eq!(s.len(), TOKEN_LEN);
    assert!(ApprovalToken::is_valid_shape(s));
    let t = ApprovalToken::parse(s).unwrap();
    assert_eq!(t.as_str(), s);
}

#[test]
fn matches_is_exact() {
    let t = ApprovalToken::generate();
    assert!(t.matches(t.as_str()));
    let other = ApprovalToken::generate();
    assert!(!t.matches(other.as_str()));
    assert!(!t.matches(""));
    assert!(!t.matches(&t.as_str()[..TOKEN_LEN - 1]));
}

#[test]
fn serde_is_transparent() {
    let t = ApprovalToken::generate();
    let json = serde_json::to_string(&t).unwrap();
    assert_eq!(json, format!("\"{}\"", t.as_str()));
}
