// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::chat::{Chat, ChatId};
use crate::event::EventVerb;
use crate::workspace::WorkspaceId;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc as StdArc;

fn sample_event() -> DomainEvent {
    DomainEvent::Chat { event: EventVerb::Created, chat: Chat::new(WorkspaceId::new()) }
}

#[test]
fn delivers_each_emission_once() {
    let bus = EventBus::new();
    let count = StdArc::new(AtomicUsize::new(0));
    let c = StdArc::clone(&count);
    let sub = bus.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    for _ in 0..5 {
        bus.emit(&sample_event());
    }
    sub.unsubscribe();
    bus.emit(&sample_event());

    assert_eq!(count.load(Ordering::SeqCst), 5);
}

#[test]
fn fan_out_reaches_all_listeners() {
    let bus = EventBus::new();
    let count = StdArc::new(AtomicUsize::new(0));
    let subs: Vec<_> = (0..3)
        .map(|_| {
            let c = StdArc::clone(&count);
            bus.subscribe(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
            })
        })
        .collect();

    bus.emit(&sample_event());
    assert_eq!(count.load(Ordering::SeqCst), 3);

    for sub in subs {
        sub.unsubscribe();
    }
    assert_eq!(bus.listener_count(), 0);
}

#[test]
fn unsubscribe_during_dispatch_is_safe() {
    let bus = EventBus::new();
    let count = StdArc::new(AtomicUsize::new(0));

    // Listener that unsubscribes itself on first delivery.
    let slot: StdArc<parking_lot::Mutex<Option<Subscription>>> =
        StdArc::new(parking_lot::Mutex::new(None));
    let slot2 = StdArc::clone(&slot);
    let c = StdArc::clone(&count);
    let sub = bus.subscribe(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
        if let Some(s) = slot2.lock().take() {
            s.unsubscribe();
        }
    });
    *slot.lock() = Some(sub);

    bus.emit(&sample_event());
    bus.emit(&sample_event());

    assert_eq!(count.load(Ordering::SeqCst), 1);
}

#[test]
fn unsubscribe_after_bus_drop_is_noop() {
    let bus = EventBus::new();
    let sub = bus.subscribe(|_| {});
    drop(bus);
    sub.unsubscribe();
}

#[test]
fn subscriptions_compare_by_identity() {
    let bus = EventBus::new();
    let a = bus.subscribe(|_| {});
    let b = bus.subscribe(|_| {});
    assert_ne!(a, b);
    let a2 = a.clone();
    assert_eq!(a, a2);
}
