// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc as StdArc;

#[test]
fn emits_to_all_registered_handlers() {
    let set: HandlerSet<u32> = HandlerSet::new();
    let total = StdArc::new(AtomicUsize::new(0));

    let t1 = StdArc::clone(&total);
    let _a = set.register(move |v| {
        t1.fetch_add(*v as usize, Ordering::SeqCst);
    });
    let t2 = StdArc::clone(&total);
    let _b = set.register(move |v| {
        t2.fetch_add(*v as usize, Ordering::SeqCst);
    });

    set.emit(&5);
    assert_eq!(total.load(Ordering::SeqCst), 10);
}

#[test]
fn unsubscribe_stops_delivery() {
    let set: HandlerSet<u32> = HandlerSet::new();
    let count = StdArc::new(AtomicUsize::new(0));
    let c = StdArc::clone(&count);
    let sub = set.register(move |_| {
        c.fetch_add(1, Ordering::SeqCst);
    });

    set.emit(&1);
    sub.unsubscribe();
    set.emit(&1);

    assert_eq!(count.load(Ordering::SeqCst), 1);
    assert!(set.is_empty());
}

#[test]
fn unsubscribe_after_set_drop_is_noop() {
    let set: HandlerSet<u32> = HandlerSet::new();
    let sub = set.register(|_| {});
    drop(set);
    sub.unsubscribe();
}
