// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn queue_depth_tracks_enqueue_and_send() {
    let (outbound, mut rx) = Outbound::new();
    assert!(outbound.enqueue_text("hello", false));
    assert_eq!(outbound.buffered_bytes(), 5);

    let msg = rx.recv().await.unwrap();
    outbound.mark_sent(msg.len());
    assert_eq!(outbound.buffered_bytes(), 0);
}

#[tokio::test]
async fn pauses_above_high_watermark_resumes_below_low() {
    let (outbound, mut rx) = Outbound::new();

    let big = "x".repeat(PAUSE_AT + 1);
    assert!(outbound.enqueue_text(&big, false));
    assert!(outbound.is_paused());

    // Droppable frames vanish while paused; vital ones still queue.
    assert!(!outbound.enqueue_text("delta", true));
    assert_eq!(outbound.dropped_frames(), 1);
    assert!(outbound.enqueue_text("vital", false));

    // Drain below the low watermark: resumed.
    let msg = rx.recv().await.unwrap();
    outbound.mark_sent(msg.len());
    assert!(!outbound.is_paused());
    assert!(outbound.enqueue_text("delta2", true));
}

#[tokio::test]
async fn hysteresis_holds_between_watermarks() {
    let (outbound, mut rx) = Outbound::new();

    // Two chunks: draining one leaves the queue between the watermarks.
    let chunk = "x".repeat(PAUSE_AT);
    assert!(outbound.enqueue_text(&chunk, false));
    assert!(outbound.enqueue_text(&chunk, false));
    assert!(outbound.is_paused());

    let msg = rx.recv().await.unwrap();
    outbound.mark_sent(msg.len());
    assert!(outbound.buffered_bytes() >= RESUME_AT);
    assert!(outbound.is_paused(), "must stay paused until below the low watermark");
}

#[tokio::test]
async fn sink_delivers_regardless_of_pause() {
    let (outbound, mut rx) = Outbound::new();
    let sink = ConnectionSink::new(Arc::clone(&outbound));

    let big = "x".repeat(PAUSE_AT + 1);
    outbound.enqueue_text(&big, false);
    assert!(outbound.is_paused());

    // Exit frames arrive through the sink even while paused.
    sink.send_frame(Arc::from("{\"type\":\"pty:exit\"}"));
    rx.recv().await.unwrap();
    let exit = rx.recv().await.unwrap();
    assert!(exit.to_string().contains("pty:exit"));
}
