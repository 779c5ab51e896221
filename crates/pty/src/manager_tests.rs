// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::AtomicUsize;
use std::time::Duration;

struct FakeSink {
    frames: Mutex<Vec<String>>,
    buffered: AtomicUsize,
}

impl FakeSink {
    fn new(buffered: usize) -> Arc<Self> {
        Arc::new(Self { frames: Mutex::new(Vec::new()), buffered: AtomicUsize::new(buffered) })
    }

    fn set_buffered(&self, bytes: usize) {
        self.buffered.store(bytes, Ordering::SeqCst);
    }

    fn frames(&self) -> Vec<String> {
        self.frames.lock().clone()
    }

    fn frame_types(&self) -> Vec<String> {
        self.frames()
            .iter()
            .filter_map(|f| {
                serde_json::from_str::<serde_json::Value>(f)
                    .ok()?
                    .get("type")?
                    .as_str()
                    .map(String::from)
            })
            .collect()
    }
}

impl OutputSink for FakeSink {
    fn buffered_bytes(&self) -> usize {
        self.buffered.load(Ordering::SeqCst)
    }

    fn send_frame(&self, frame: Arc<str>) {
        self.frames.lock().push(frame.to_string());
    }
}

struct TestSession {
    id: TerminalId,
    events: mpsc::Sender<PtyEvent>,
    writes: mpsc::Receiver<Vec<u8>>,
}

fn register_session(manager: &PtyManager, owner: TerminalOwner, visible: bool) -> TestSession {
    let (writer_tx, writes) = mpsc::channel(16);
    let (events, events_rx) = mpsc::channel(64);
    let id = TerminalId::new();
    manager.register(
        id,
        SessionIo::from_channels(writer_tx, events_rx),
        RegisterOptions { owner, visible, ..Default::default() },
    );
    TestSession { id, events, writes }
}

fn manager() -> PtyManager {
    PtyManager::new(EventBus::new())
}

async fn settle() {
    // Let the pump run; paused-clock tests auto-advance timers.
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn large_output_flushes_immediately() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    session.events.send(PtyEvent::Output(vec![b'a'; BATCH_MAX])).await.unwrap();
    settle().await;

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("pty:output"));
}

#[tokio::test(start_paused = true)]
async fn small_chunks_coalesce_on_the_delay() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    session.events.send(PtyEvent::Output(b"hel".to_vec())).await.unwrap();
    session.events.send(PtyEvent::Output(b"lo".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY + Duration::from_millis(2)).await;

    let frames = sink.frames();
    assert_eq!(frames.len(), 1, "chunks should coalesce into one frame");
    let v: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
    assert_eq!(v.get("data").and_then(|d| d.as_str()), Some("hello"));
}

#[tokio::test(start_paused = true)]
async fn backpressured_subscriber_misses_output_but_gets_exit() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);
    let slow = FakeSink::new(200 * 1024);
    let fast = FakeSink::new(0);
    manager.attach(&session.id, 1, slow.clone()).unwrap();
    manager.attach(&session.id, 2, fast.clone()).unwrap();

    for _ in 0..3 {
        session.events.send(PtyEvent::Output(vec![b'x'; 10 * 1024])).await.unwrap();
    }
    settle().await;

    assert!(slow.frames().is_empty(), "paused subscriber must receive no output");
    assert_eq!(fast.frame_types(), ["pty:output", "pty:output", "pty:output"]);
    // History retains everything the subscriber missed.
    assert_eq!(manager.get_history(&session.id).unwrap().len(), 30 * 1024);

    // Exit bypasses backpressure.
    session.events.send(PtyEvent::Exit(Some(0))).await.unwrap();
    settle().await;
    assert_eq!(slow.frame_types(), ["pty:exit"]);
    assert_eq!(manager.get_exit_code(&session.id), Some(0));
}

#[tokio::test(start_paused = true)]
async fn drained_subscriber_resumes_delivery() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);
    let sink = FakeSink::new(200 * 1024);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    session.events.send(PtyEvent::Output(b"missed".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;
    assert!(sink.frames().is_empty());

    sink.set_buffered(10 * 1024);
    session.events.send(PtyEvent::Output(b"seen".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;

    let frames = sink.frames();
    assert_eq!(frames.len(), 1);
    assert!(frames[0].contains("seen"));
}

#[tokio::test(start_paused = true)]
async fn history_is_ring_buffered() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);

    session.events.send(PtyEvent::Output(vec![b'a'; HISTORY_MAX])).await.unwrap();
    session.events.send(PtyEvent::Output(vec![b'b'; 1024])).await.unwrap();
    settle().await;

    let history = manager.get_history(&session.id).unwrap();
    assert_eq!(history.len(), HISTORY_MAX);
    // Oldest bytes were evicted; the tail is the new data.
    assert!(history[HISTORY_MAX - 1024..].iter().all(|b| *b == b'b'));
}

#[tokio::test(start_paused = true)]
async fn attach_replays_history_detach_stops_delivery() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);

    session.events.send(PtyEvent::Output(b"early".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;

    let sink = FakeSink::new(0);
    let history = manager.attach(&session.id, 7, sink.clone()).unwrap();
    assert_eq!(history, "early");

    manager.detach(&session.id, 7);
    session.events.send(PtyEvent::Output(b"later".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;
    assert!(sink.frames().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unregister_then_register_has_no_carryover() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();
    session.events.send(PtyEvent::Output(b"old".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;

    assert!(manager.unregister(&session.id));
    assert!(!manager.has(&session.id));

    // Same id, fresh session: no history, no subscribers.
    let (writer_tx, _writes) = mpsc::channel(16);
    let (events, events_rx) = mpsc::channel(64);
    manager.register(
        session.id,
        SessionIo::from_channels(writer_tx, events_rx),
        RegisterOptions::default(),
    );
    assert_eq!(manager.get_history(&session.id).unwrap(), Vec::<u8>::new());

    events.send(PtyEvent::Output(b"new".to_vec())).await.unwrap();
    tokio::time::sleep(BATCH_DELAY * 2).await;
    assert_eq!(sink.frames().len(), 1, "stale subscriber must not survive re-register");
}

#[tokio::test(start_paused = true)]
async fn write_enforces_size_cap_and_reaches_pty() {
    let manager = manager();
    let mut session = register_session(&manager, TerminalOwner::User, true);

    let err = manager.write(&session.id, &vec![0u8; MAX_WRITE_LEN + 1]).await.unwrap_err();
    assert!(matches!(err, PtyError::PayloadTooLarge { .. }));

    manager.write(&session.id, b"ls\r").await.unwrap();
    assert_eq!(session.writes.recv().await.unwrap(), b"ls\r");
}

#[tokio::test(start_paused = true)]
async fn resize_enforces_dimension_bounds() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::User, true);

    assert!(matches!(
        manager.resize(&session.id, 0, 24),
        Err(PtyError::InvalidDimensions { .. }),
    ));
    assert!(matches!(
        manager.resize(&session.id, 80, 201),
        Err(PtyError::InvalidDimensions { .. }),
    ));
    manager.resize(&session.id, 80, 24).unwrap();
}

#[tokio::test(start_paused = true)]
async fn idle_agent_session_is_reaped() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::Agent, false);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    tokio::time::sleep(IDLE_TIMEOUT + Duration::from_secs(1)).await;
    assert_eq!(sink.frame_types(), ["pty:exit"]);
}

#[tokio::test(start_paused = true)]
async fn activity_resets_the_idle_timer() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::Agent, false);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    // Keep it busy past the original deadline.
    tokio::time::sleep(IDLE_TIMEOUT - Duration::from_secs(10)).await;
    session.events.send(PtyEvent::Output(b"tick".to_vec())).await.unwrap();
    tokio::time::sleep(IDLE_TIMEOUT - Duration::from_secs(10)).await;

    assert!(!sink.frame_types().contains(&"pty:exit".to_string()));
}

#[tokio::test(start_paused = true)]
async fn visibility_promotion_transfers_ownership_and_disarms_reaper() {
    let manager = manager();
    let session = register_session(&manager, TerminalOwner::Agent, false);
    let sink = FakeSink::new(0);
    manager.attach(&session.id, 1, sink.clone()).unwrap();

    manager.set_visible(&session.id, true).unwrap();
    assert_eq!(manager.get_metadata(&session.id).unwrap().owner, TerminalOwner::User);

    tokio::time::sleep(IDLE_TIMEOUT * 3).await;
    assert!(sink.frames().is_empty(), "promoted session must not be reaped");
}

#[tokio::test(start_paused = true)]
async fn shutdown_all_requests_graceful_exit_then_clears() {
    let manager = manager();
    let mut session = register_session(&manager, TerminalOwner::User, true);

    let reader = tokio::spawn(async move { session.writes.recv().await });
    manager.shutdown_all().await;

    // The polite request landed in the shell's stdin before the hard stage.
    let polite = reader.await.unwrap().unwrap();
    assert_eq!(polite, b"exit\r");
    assert!(manager.list().is_empty());
}

#[tokio::test(start_paused = true)]
async fn exit_emits_terminal_event_on_bus() {
    let bus = EventBus::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen2 = Arc::clone(&seen);
    let _sub = bus.subscribe(move |event| {
        if let DomainEvent::Terminal { event, terminal } = event {
            seen2.lock().push((*event, terminal.exit_code));
        }
    });

    let manager = PtyManager::new(bus);
    let session = register_session(&manager, TerminalOwner::User, true);
    session.events.send(PtyEvent::Exit(Some(2))).await.unwrap();
    settle().await;

    let seen = seen.lock();
    assert_eq!(seen[0], (EventVerb::Created, None));
    assert_eq!(seen[1], (EventVerb::Updated, Some(2)));
}
