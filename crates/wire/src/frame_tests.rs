// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use forks_core::{DomainEvent, EventVerb, Subagent, TerminalId};
use yare::parameterized;

#[test]
fn ping_decodes() {
    let frame = decode_client(br#"{"type":"ping"}"#).unwrap();
    assert_eq!(frame, ClientFrame::Ping);
}

#[test]
fn pty_input_decodes() {
    let id = TerminalId::new();
    let raw = format!(r#"{{"type":"pty:input","id":"{id}","data":"ls\r"}}"#);
    let frame = decode_client(raw.as_bytes()).unwrap();
    assert_eq!(frame, ClientFrame::PtyInput { id, data: "ls\r".to_string() });
}

#[test]
fn oversized_frame_is_rejected_before_parse() {
    let big = vec![b'x'; MAX_FRAME_LEN + 1];
    match decode_client(&big) {
        Err(FrameError::TooLarge(n)) => assert_eq!(n, MAX_FRAME_LEN + 1),
        other => panic!("expected TooLarge, got {other:?}"),
    }
}

#[parameterized(
    garbage = { b"not json".as_slice() },
    unknown_type = { br#"{"type":"warp-drive"}"#.as_slice() },
    missing_fields = { br#"{"type":"pty:resize"}"#.as_slice() },
)]
fn malformed_frames_are_rejected(payload: &[u8]) {
    assert!(matches!(decode_client(payload), Err(FrameError::Malformed(_))));
}

#[test]
fn agent_envelope_encodes_with_type_tag() {
    let sub = Subagent::new(forks_core::ChatId::new(), "t");
    let frame =
        ServerFrame::Agent { event: DomainEvent::Subagent { event: EventVerb::Updated, subagent: sub } };
    let json = encode_server(&frame).unwrap();
    let v: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(v.get("type").and_then(|t| t.as_str()), Some("agent"));
    assert_eq!(
        v.get("event").and_then(|e| e.get("type")).and_then(|t| t.as_str()),
        Some("subagent"),
    );
}

#[test]
fn pty_exit_uses_camel_case_exit_code() {
    let frame = ServerFrame::PtyExit { id: TerminalId::new(), exit_code: Some(0) };
    let json = encode_server(&frame).unwrap();
    assert!(json.contains("\"exitCode\":0"));
}

#[parameterized(
    message_delta = { r#"{"type":"item/agentMessage/delta","delta":"he"}"#, true },
    tool_delta = { r#"{"type":"item/toolCall/delta","delta":"x"}"#, true },
    turn_completed = { r#"{"type":"turn/completed"}"#, false },
    error = { r#"{"type":"error","message":"m"}"#, false },
)]
fn adapter_droppability_follows_delta_suffix(event: &str, droppable: bool) {
    let frame = ServerFrame::Adapter { event: serde_json::from_str(event).unwrap() };
    assert_eq!(frame.droppable_under_backpressure(), droppable);
}

#[test]
fn pty_output_is_droppable_exit_is_not() {
    let id = TerminalId::new();
    assert!(ServerFrame::PtyOutput { id, data: "x".into() }.droppable_under_backpressure());
    assert!(!ServerFrame::PtyExit { id, exit_code: None }.droppable_under_backpressure());
}
