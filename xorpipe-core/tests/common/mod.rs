// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tempfile::NamedTempFile;
use xorpipe_core::{
    Capacity, Coordinator, DrainOutcome, Segment, SegmentName, ShutdownConfig, ShutdownReport,
};

static COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A segment name no other test (or test run) is using.
pub fn unique_name(tag: &str) -> SegmentName {
    let n = COUNTER.fetch_add(1, Ordering::SeqCst);
    SegmentName::new(format!("xorpipe-test-{}-{}-{}", tag, std::process::id(), n)).unwrap()
}

/// A temporary source file holding `contents`.
pub fn source_file(contents: &[u8]) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("Failed to create temp file");
    file.write_all(contents).expect("Failed to write temp file");
    file.flush().unwrap();
    file
}

pub fn create_segment(tag: &str, capacity: i64, source: &NamedTempFile) -> Segment {
    Segment::create(
        &unique_name(tag),
        Capacity::new(capacity).unwrap(),
        source.path(),
    )
    .expect("Failed to create segment")
}

/// Fast timings so the drain poll does not slow the suite down.
pub fn quick_shutdown() -> ShutdownConfig {
    ShutdownConfig {
        drain_ticks: 100,
        poll_interval: Duration::from_millis(50),
        wake_slack: 5,
    }
}

/// Run the full shutdown protocol against `name` and return the report.
pub fn shut_down(name: &SegmentName) -> ShutdownReport {
    Coordinator::attach(name, quick_shutdown())
        .expect("Coordinator failed to attach")
        .shutdown()
        .expect("Shutdown failed")
}

/// Poll `check` until it holds or `timeout` expires.
pub fn wait_until(timeout: Duration, mut check: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    while std::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

pub fn assert_drained(report: &ShutdownReport) {
    assert!(
        matches!(report.outcome, DrainOutcome::Drained { .. }),
        "expected a clean drain, got {:?}",
        report.outcome
    );
    assert_eq!(report.stats.active_producers, 0);
    assert_eq!(report.stats.active_consumers, 0);
}
