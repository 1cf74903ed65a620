// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! xorpipe benchmarking support
//!
//! Segment fixtures that clean up after themselves, plus a small latency
//! summary that can be written out as JSON next to criterion's reports.

use std::io::Write;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use xorpipe_core::{
    Capacity, Coordinator, PipeError, PipeResult, Segment, SegmentName, SharedMemoryError,
    ShutdownConfig, ShutdownReport,
};

static FIXTURE_COUNTER: AtomicU32 = AtomicU32::new(0);

/// A freshly created segment backed by a temporary source file.
///
/// Dropping the fixture runs the coordinator's shutdown so no segment is
/// left behind in `/dev/shm`.
pub struct Fixture {
    segment: Segment,
    _source: NamedTempFile,
}

impl Fixture {
    pub fn new(tag: &str, capacity: i64, payload: &[u8]) -> PipeResult<Self> {
        let io = |source| PipeError::Io {
            context: "writing benchmark source",
            source,
        };
        let mut source = NamedTempFile::new().map_err(io)?;
        source.write_all(payload).map_err(io)?;

        let name = SegmentName::new(format!(
            "xorpipe-bench-{}-{}-{}",
            tag,
            std::process::id(),
            FIXTURE_COUNTER.fetch_add(1, Ordering::Relaxed)
        ))?;
        let segment = Segment::create(&name, Capacity::new(capacity)?, source.path())?;

        Ok(Self {
            segment,
            _source: source,
        })
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    /// Run the coordinator's shutdown against the fixture's segment.
    pub fn teardown(&self) -> PipeResult<ShutdownReport> {
        let settings = ShutdownConfig {
            drain_ticks: 1,
            poll_interval: Duration::from_millis(1),
            wake_slack: 1,
        };
        Coordinator::attach(self.segment.name(), settings)?.shutdown()
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        match self.teardown() {
            Ok(_) => {}
            Err(PipeError::SharedMemory(SharedMemoryError::SegmentNotFound { .. })) => {}
            Err(e) => tracing::warn!(
                segment = %self.segment.name(),
                error = %e,
                "Benchmark fixture teardown failed"
            ),
        }
    }
}

/// Latency distribution of one measured operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LatencySummary {
    pub name: String,
    pub samples: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p99_ns: u64,
    pub recorded_at: DateTime<Utc>,
}

impl LatencySummary {
    pub fn from_samples(name: impl Into<String>, mut samples: Vec<u64>) -> Self {
        samples.sort_unstable();
        let len = samples.len();
        let percentile = |p: f64| {
            if len == 0 {
                0
            } else {
                samples[((len - 1) as f64 * p).round() as usize]
            }
        };
        let mean_ns = if len == 0 {
            0.0
        } else {
            samples.iter().sum::<u64>() as f64 / len as f64
        };

        Self {
            name: name.into(),
            samples: len,
            min_ns: samples.first().copied().unwrap_or(0),
            max_ns: samples.last().copied().unwrap_or(0),
            mean_ns,
            p50_ns: percentile(0.50),
            p99_ns: percentile(0.99),
            recorded_at: Utc::now(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Time `iterations` calls of `operation` after `warmup` untimed calls.
/// Returns one sample per call, in nanoseconds.
pub fn sample<F: FnMut()>(warmup: u64, iterations: u64, mut operation: F) -> Vec<u64> {
    for _ in 0..warmup {
        operation();
    }

    let mut samples = Vec::with_capacity(iterations as usize);
    for _ in 0..iterations {
        let start = Instant::now();
        operation();
        samples.push(start.elapsed().as_nanos() as u64);
    }
    samples
}
