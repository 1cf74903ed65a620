// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Integration tests for the cooperative shutdown protocol.

mod common;

use std::time::Duration;

use common::*;
use xorpipe_core::shm::{RingBuffer, RingOutcome};
use xorpipe_core::{
    Consumer, Coordinator, DrainOutcome, InterruptFlag, Producer, Segment, ShutdownConfig,
    ShutdownState, SourceMode, StopReason, XorKey,
};

#[test]
fn test_blocked_producer_and_consumer_drain() {
    let key = XorKey::new(9);

    // Producer parked on a full ring: capacity 1, no consumer.
    let full_source = source_file(b"more bytes than fit");
    let full = create_segment("full", 1, &full_source);
    // Consumer parked on an empty ring: no producer.
    let empty_source = source_file(b"");
    let empty = create_segment("empty", 4, &empty_source);

    let full_name = full.name().clone();
    let empty_name = empty.name().clone();

    std::thread::scope(|s| {
        let producer = s.spawn(|| {
            let view = Segment::attach(&full_name).unwrap();
            Producer::new(&view, key, InterruptFlag::new())
                .run_file(SourceMode::Exclusive, &mut |_| {})
                .unwrap()
        });
        let consumer = s.spawn(|| {
            let view = Segment::attach(&empty_name).unwrap();
            Consumer::new(&view, key, InterruptFlag::new())
                .run(Vec::new(), &mut |_| {})
                .unwrap()
        });

        assert!(wait_until(Duration::from_secs(5), || {
            let f = full.stats().unwrap();
            f.active_producers == 1 && f.transferred == 1
        }));
        assert!(wait_until(Duration::from_secs(5), || {
            empty.participants().unwrap().consumers == 1
        }));
        // Give both threads time to park in sem_wait.
        std::thread::sleep(Duration::from_millis(100));

        let full_report = shut_down(&full_name);
        let empty_report = shut_down(&empty_name);

        assert_drained(&full_report);
        assert_drained(&empty_report);
        assert_eq!(full_report.requested.producers, 1);
        assert_eq!(empty_report.requested.consumers, 1);

        let produced = producer.join().unwrap();
        assert_eq!(produced.stop, StopReason::Shutdown);
        assert_eq!(produced.state, ShutdownState::Drained);
        assert_eq!(produced.published, 1);

        let consumed = consumer.join().unwrap();
        assert_eq!(consumed.stop, StopReason::Shutdown);
        assert_eq!(consumed.state, ShutdownState::Drained);
        assert_eq!(consumed.consumed, 0);
    });

    assert!(Segment::attach(&full_name).is_err());
    assert!(Segment::attach(&empty_name).is_err());
}

#[test]
fn test_many_parked_consumers_all_wake() {
    let key = XorKey::new(0);
    let source = source_file(b"");
    let segment = create_segment("crowd", 2, &source);
    let name = segment.name().clone();

    std::thread::scope(|s| {
        let handles: Vec<_> = (0..6)
            .map(|_| {
                s.spawn(|| {
                    let view = Segment::attach(&name).unwrap();
                    Consumer::new(&view, key, InterruptFlag::new())
                        .run(std::io::sink(), &mut |_| {})
                        .unwrap()
                })
            })
            .collect();

        assert!(wait_until(Duration::from_secs(5), || {
            segment.participants().unwrap().consumers == 6
        }));
        std::thread::sleep(Duration::from_millis(50));

        // Minimal slack: released permits are handed on by each woken consumer.
        let settings = ShutdownConfig {
            wake_slack: 1,
            ..quick_shutdown()
        };
        let report = Coordinator::attach(&name, settings)
            .unwrap()
            .shutdown()
            .unwrap();
        assert_drained(&report);

        for handle in handles {
            assert_eq!(handle.join().unwrap().stop, StopReason::Shutdown);
        }
    });
}

#[test]
fn test_straggler_timeout_still_tears_down() {
    let source = source_file(b"abc");
    let segment = create_segment("straggler", 4, &source);

    // Registered but never looping: it cannot observe the flag.
    let stuck = segment.register(xorpipe_core::Role::Consumer).unwrap();

    let settings = ShutdownConfig {
        drain_ticks: 3,
        poll_interval: Duration::from_millis(10),
        wake_slack: 1,
    };
    let mut coordinator = Coordinator::attach(segment.name(), settings).unwrap();
    let requested = coordinator.request_shutdown().unwrap();
    assert_eq!(requested.consumers, 1);
    coordinator.wake_all(requested).unwrap();

    let outcome = coordinator.drain().unwrap();
    match outcome {
        DrainOutcome::Stragglers(counts) => assert_eq!(counts.consumers, 1),
        other => panic!("expected stragglers, got {:?}", other),
    }
    assert_eq!(coordinator.state(), ShutdownState::ShutdownRequested);

    coordinator.teardown(outcome).unwrap();
    assert!(Segment::attach(segment.name()).is_err());

    // The straggler's own mapping is still valid memory; its semaphores are not.
    std::mem::forget(stuck);
}

#[test]
fn test_teardown_requires_shutdown_request() {
    let source = source_file(b"abc");
    let segment = create_segment("order", 4, &source);

    let coordinator = Coordinator::attach(segment.name(), quick_shutdown()).unwrap();
    let premature = DrainOutcome::Drained {
        waited: Duration::ZERO,
    };
    assert!(coordinator.teardown(premature).is_err());
    assert!(Segment::attach(segment.name()).is_ok());

    assert_drained(&shut_down(segment.name()));
}

#[test]
fn test_drain_requires_shutdown_request() {
    let source = source_file(b"abc");
    let segment = create_segment("drainorder", 4, &source);

    let mut coordinator = Coordinator::attach(segment.name(), quick_shutdown()).unwrap();
    assert!(coordinator.drain().is_err());
    assert!(coordinator.request_shutdown().is_ok());
    assert!(coordinator.request_shutdown().is_err());
    let outcome = coordinator.drain().unwrap();
    coordinator.teardown(outcome).unwrap();
}

#[test]
fn test_local_interrupt_before_run() {
    let source = source_file(b"never sent");
    let segment = create_segment("localint", 4, &source);

    let interrupt = InterruptFlag::new();
    interrupt.raise();
    let report = Producer::new(&segment, XorKey::new(1), interrupt)
        .run_file(SourceMode::Exclusive, &mut |_| {})
        .unwrap();
    assert_eq!(report.stop, StopReason::Interrupted);
    assert_eq!(report.published, 0);
    assert_eq!(report.state, ShutdownState::Running);
    assert!(segment.participants().unwrap().is_zero());

    assert_drained(&shut_down(segment.name()));
}

#[test]
fn test_signal_interrupts_blocked_consumer() {
    use nix::sys::signal::Signal;

    let source = source_file(b"");
    let segment = create_segment("sigint", 2, &source);
    let name = segment.name().clone();
    let interrupt = InterruptFlag::install(&[Signal::SIGUSR2]).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();

    std::thread::scope(|s| {
        let name = &name;
        let interrupt = &interrupt;
        let consumer = s.spawn(move || {
            // SAFETY: pthread_self has no preconditions
            tx.send(unsafe { libc::pthread_self() }).unwrap();
            let view = Segment::attach(name).unwrap();
            Consumer::new(&view, XorKey::new(0), interrupt.clone())
                .run(std::io::sink(), &mut |_| {})
                .unwrap()
        });
        let thread = rx.recv().unwrap();

        assert!(wait_until(Duration::from_secs(5), || {
            segment.participants().unwrap().consumers == 1
        }));

        // Repeat in case the first signal lands before the thread parks.
        while !consumer.is_finished() {
            // SAFETY: the thread is alive until is_finished returns true
            unsafe { libc::pthread_kill(thread, libc::SIGUSR2) };
            std::thread::sleep(Duration::from_millis(20));
        }

        let report = consumer.join().unwrap();
        assert_eq!(report.stop, StopReason::Interrupted);
    });

    assert!(segment.participants().unwrap().is_zero());
    assert_drained(&shut_down(&name));
}

/// A signal that is neither a shutdown nor this participant's own interrupt
/// makes the wait start over; the publish then completes normally.
#[test]
fn test_unrelated_signal_resumes_wait() {
    use nix::sys::signal::Signal;

    // A handler must exist so the signal interrupts sem_wait instead of
    // killing the process. The ring below does not observe it.
    let _handler = InterruptFlag::install(&[Signal::SIGUSR2]).unwrap();

    let key = XorKey::new(3);
    let source = source_file(b"");
    let segment = create_segment("spurious", 1, &source);
    let name = segment.name().clone();
    let ring = RingBuffer::new(&segment, key);
    assert!(matches!(ring.publish(b'a').unwrap(), RingOutcome::Completed(_)));

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::scope(|s| {
        let name = &name;
        let blocked = s.spawn(move || {
            // SAFETY: pthread_self has no preconditions
            tx.send(unsafe { libc::pthread_self() }).unwrap();
            let view = Segment::attach(name).unwrap();
            RingBuffer::new(&view, key).publish(b'b').unwrap()
        });
        let thread = rx.recv().unwrap();

        // The ring is full: the publisher parks on free_permits.
        std::thread::sleep(Duration::from_millis(100));
        for _ in 0..5 {
            // SAFETY: the thread cannot finish before a slot is freed below
            unsafe { libc::pthread_kill(thread, libc::SIGUSR2) };
            std::thread::sleep(Duration::from_millis(20));
        }
        assert!(!blocked.is_finished());

        match ring.consume().unwrap() {
            RingOutcome::Completed(d) => assert_eq!(d.byte, b'a'),
            other => panic!("unexpected outcome {:?}", other),
        }

        match blocked.join().unwrap() {
            RingOutcome::Completed(receipt) => {
                assert_eq!(receipt.plaintext, b'b');
                assert_eq!(receipt.sequence, 1);
            }
            other => panic!("publish ended early: {:?}", other),
        }
    });

    assert_eq!(segment.stats().unwrap().transferred, 2);
    drop(ring);
    assert_drained(&shut_down(&name));
}
