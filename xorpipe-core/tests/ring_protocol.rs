// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Integration tests for segment attachment and the bounded ring.
//!
//! Every participant attaches its own `Segment`, i.e. its own mapping of the
//! named object, exactly as a separate process would.

mod common;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use common::*;
use xorpipe_core::cipher;
use xorpipe_core::shm::{RingBuffer, RingOutcome, NEVER_WRITTEN};
use xorpipe_core::{
    Capacity, Coordinator, HardValidationError, InterruptFlag, PipeError, Producer, Segment,
    SharedMemoryError, SourceMode, StopReason, XorKey,
};

#[test]
fn test_attach_missing_segment() {
    let name = unique_name("missing");
    let err = Segment::attach(&name).err().expect("attach should fail");
    assert!(matches!(
        err,
        PipeError::SharedMemory(SharedMemoryError::SegmentNotFound { .. })
    ));
}

#[test]
fn test_create_requires_readable_source() {
    let name = unique_name("nosource");
    let err = Segment::create(
        &name,
        Capacity::new(4).unwrap(),
        std::path::Path::new("/nonexistent/xorpipe/input.txt"),
    )
    .err()
    .expect("create should fail");
    assert!(matches!(err, PipeError::SourceUnavailable { .. }));
    assert!(Segment::attach(&name).is_err());
}

#[test]
fn test_capacity_validation() {
    for bad in [0, -5, 10001] {
        assert!(matches!(
            Capacity::new(bad),
            Err(HardValidationError::InvalidCapacity { .. })
        ));
    }
    assert!(Capacity::new(1).is_ok());
    assert!(Capacity::new(10000).is_ok());
}

#[test]
fn test_attach_reads_capacity_and_source() {
    let source = source_file(b"data");
    let created = create_segment("attach", 10000, &source);

    let attached = Segment::attach(created.name()).unwrap();
    assert_eq!(attached.capacity().get(), 10000);
    assert_eq!(attached.source_path(), source.path());
    assert_eq!(attached.mapped_size(), created.mapped_size());

    let index = attached.lock_index().unwrap();
    assert_eq!(index.write_cursor(), 0);
    assert_eq!(index.read_cursor(), 0);
    assert_eq!(index.peek_slot(9999).unwrap().sequence, NEVER_WRITTEN);
    assert!(index.peek_slot(10000).is_none());
    drop(index);

    assert_eq!(attached.free_permits().value().unwrap(), 10000);
    assert_eq!(attached.filled_permits().value().unwrap(), 0);

    assert_drained(&shut_down(created.name()));
}

#[test]
fn test_two_byte_scenario() {
    let key = XorKey::new(0x2A);
    let source = source_file(b"AB");
    let segment = create_segment("ab", 4, &source);

    let producer = Producer::new(&segment, key, InterruptFlag::new());
    let report = producer
        .run_file(SourceMode::Exclusive, &mut |_| {})
        .unwrap();
    assert_eq!(report.published, 2);
    assert_eq!(report.stop, StopReason::EndOfInput);

    let index = segment.lock_index().unwrap();
    let slot0 = index.peek_slot(0).unwrap();
    assert_eq!(slot0.ciphertext, b'A' ^ 0x2A);
    assert_eq!(slot0.sequence, 0);
    assert_eq!(index.peek_slot(1).unwrap().sequence, 1);
    assert_eq!(index.occupancy(), 2);
    drop(index);

    let consumer_view = Segment::attach(segment.name()).unwrap();
    let ring = RingBuffer::new(&consumer_view, key);
    let mut out = Vec::new();
    for _ in 0..2 {
        match ring.consume().unwrap() {
            RingOutcome::Completed(d) => out.push(d.byte),
            other => panic!("unexpected outcome {:?}", other),
        }
    }
    assert_eq!(out, b"AB");

    let stats = segment.stats().unwrap();
    assert_eq!(stats.transferred, 2);
    assert_eq!(stats.resident, 0);
    assert_eq!(stats.active_producers, 0);

    assert_drained(&shut_down(segment.name()));
}

#[test]
fn test_fifo_order_and_bounded_occupancy() {
    let key = XorKey::new(0x5C);
    let payload: Vec<u8> = (0..2000u32).map(|i| (i * 7 % 251) as u8).collect();
    let source = source_file(&payload);
    let segment = create_segment("fifo", 3, &source);
    let name = segment.name().clone();
    let producing = AtomicBool::new(true);

    let received = std::thread::scope(|s| {
        s.spawn(|| {
            let view = Segment::attach(&name).unwrap();
            let report = Producer::new(&view, key, InterruptFlag::new())
                .run_file(SourceMode::Exclusive, &mut |_| {})
                .unwrap();
            assert_eq!(report.published, payload.len() as u64);
            producing.store(false, Ordering::SeqCst);
        });

        // Observer: occupancy never leaves [0, capacity].
        s.spawn(|| {
            let view = Segment::attach(&name).unwrap();
            while producing.load(Ordering::SeqCst) {
                let index = view.lock_index().unwrap();
                assert!(index.write_cursor() >= index.read_cursor());
                assert!(index.occupancy() <= 3);
                drop(index);
                std::thread::yield_now();
            }
        });

        let view = Segment::attach(&name).unwrap();
        let ring = RingBuffer::new(&view, key);
        let mut received = Vec::with_capacity(payload.len());
        let mut last_sequence = None;
        while received.len() < payload.len() {
            match ring.consume().unwrap() {
                RingOutcome::Completed(d) => {
                    if let Some(last) = last_sequence {
                        assert_eq!(d.sequence, last + 1);
                    }
                    last_sequence = Some(d.sequence);
                    received.push(d.byte);
                }
                other => panic!("unexpected outcome {:?}", other),
            }
        }
        received
    });

    assert_eq!(received, payload);
    assert_eq!(segment.stats().unwrap().transferred, payload.len() as u64);
    assert_drained(&shut_down(&name));
}

#[test]
fn test_ciphertext_in_ring_is_transformed() {
    let key = XorKey::new(0xFF);
    let source = source_file(b"\x00\x0F");
    let segment = create_segment("cipher", 2, &source);

    let ring = RingBuffer::new(&segment, key);
    let RingOutcome::Completed(receipt) = ring.publish(0x0F).unwrap() else {
        panic!("publish did not complete");
    };
    assert_eq!(receipt.ciphertext, cipher::encrypt(0x0F, key));
    assert_eq!(receipt.ciphertext, 0xF0);

    let RingOutcome::Completed(delivery) = ring.consume().unwrap() else {
        panic!("consume did not complete");
    };
    assert_eq!(delivery.byte, 0x0F);
    assert_eq!(delivery.sequence, receipt.sequence);

    assert_drained(&shut_down(segment.name()));
}

#[test]
fn test_source_unavailable_still_deregisters() {
    let source = source_file(b"gone");
    let segment = create_segment("vanish", 4, &source);
    let path = source.path().to_path_buf();
    drop(source);
    assert!(!path.exists());

    let err = Producer::new(&segment, XorKey::new(1), InterruptFlag::new())
        .run_file(SourceMode::Exclusive, &mut |_| {})
        .err()
        .expect("producer should fail");
    assert!(matches!(err, PipeError::SourceUnavailable { .. }));

    let counts = segment.participants().unwrap();
    assert!(counts.is_zero());

    assert_drained(&shut_down(segment.name()));
}

#[test]
fn test_registration_refused_after_shutdown_request() {
    let source = source_file(b"x");
    let segment = create_segment("late", 2, &source);

    let mut coordinator =
        Coordinator::attach(segment.name(), quick_shutdown()).expect("attach failed");
    coordinator.request_shutdown().unwrap();

    let err = Producer::new(&segment, XorKey::new(0), InterruptFlag::new())
        .run_file(SourceMode::Exclusive, &mut |_| {})
        .err()
        .expect("late producer should be refused");
    assert!(matches!(err, PipeError::ShutdownInProgress { .. }));
    assert!(segment.participants().unwrap().is_zero());

    let outcome = coordinator.drain().unwrap();
    coordinator.teardown(outcome).unwrap();
    assert!(Segment::attach(segment.name()).is_err());
}

#[test]
fn test_try_acquire_reports_full_ring() {
    let source = source_file(b"full");
    let segment = create_segment("full", 1, &source);
    let ring = RingBuffer::new(&segment, XorKey::new(3));

    assert!(matches!(ring.publish(b'f').unwrap(), RingOutcome::Completed(_)));
    assert!(!segment.free_permits().try_acquire().unwrap());
    assert_eq!(segment.filled_permits().value().unwrap(), 1);

    assert!(matches!(ring.consume().unwrap(), RingOutcome::Completed(_)));
    assert!(wait_until(Duration::from_millis(100), || {
        segment.free_permits().value().unwrap() == 1
    }));

    assert_drained(&shut_down(segment.name()));
}
