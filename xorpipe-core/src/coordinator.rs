// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Coordinator side of the cooperative shutdown protocol.
//!
//! 1. Set `shutdown_requested` under `index_lock` and sample the role counters.
//! 2. Flood both permit semaphores so that every parked participant wakes up
//!    and re-checks the flag.
//! 3. Poll the role counters until they reach zero or the drain times out.
//! 4. Destroy the semaphores and unlink the segment.
//!
//! A timeout is reported as stragglers and teardown proceeds anyway: a
//! straggler that later touches the segment operates on destroyed semaphores.

use std::time::{Duration, Instant};

use crate::config::ShutdownConfig;
use crate::error::{PipeError, PipeResult, StateTransitionError};
use crate::shm::{ParticipantCounts, Segment};
use crate::state::{ShutdownState, ShutdownStateMachine};
use crate::stats::SegmentStats;
use crate::types::SegmentName;

/// How the drain poll ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every participant deregistered.
    Drained { waited: Duration },
    /// The timeout expired with these participants still registered.
    Stragglers(ParticipantCounts),
}

/// Summary of a completed shutdown.
#[derive(Debug, Clone)]
pub struct ShutdownReport {
    /// Counters sampled when the flag was set.
    pub requested: ParticipantCounts,
    pub outcome: DrainOutcome,
    /// Header snapshot taken just before teardown.
    pub stats: SegmentStats,
}

/// Drives the shutdown of one segment.
pub struct Coordinator {
    segment: Segment,
    settings: ShutdownConfig,
    machine: ShutdownStateMachine,
}

impl Coordinator {
    /// Attach to `name` as the coordinator. The coordinator never registers
    /// in the role counters.
    pub fn attach(name: &SegmentName, settings: ShutdownConfig) -> PipeResult<Self> {
        Ok(Self::new(Segment::attach(name)?, settings))
    }

    pub fn new(segment: Segment, settings: ShutdownConfig) -> Self {
        Self {
            segment,
            settings,
            machine: ShutdownStateMachine::new(),
        }
    }

    pub fn segment(&self) -> &Segment {
        &self.segment
    }

    pub fn state(&self) -> ShutdownState {
        self.machine.state()
    }

    /// Run the whole protocol: request, wake, drain, snapshot, teardown.
    ///
    /// Once the flag is set, teardown is always attempted. A failed wake,
    /// drain or snapshot is logged and reported after the segment is gone.
    pub fn shutdown(mut self) -> PipeResult<ShutdownReport> {
        let requested = self.request_shutdown()?;

        let woken = self.wake_all(requested);
        if let Err(e) = &woken {
            tracing::warn!(segment = %self.segment.name(), error = %e, "Wake-up flood failed");
        }
        let outcome = match self.drain() {
            Ok(outcome) => outcome,
            Err(e) => self.outcome_after_failed_drain(&e),
        };
        let stats = self.segment.stats();
        if let Err(e) = &stats {
            tracing::warn!(segment = %self.segment.name(), error = %e, "Final snapshot failed");
        }

        self.teardown(outcome)?;
        woken?;

        Ok(ShutdownReport {
            requested,
            outcome,
            stats: stats?,
        })
    }

    fn outcome_after_failed_drain(&self, error: &PipeError) -> DrainOutcome {
        let counts = self.segment.participants().unwrap_or_default();
        tracing::warn!(
            segment = %self.segment.name(),
            error = %error,
            producers = counts.producers,
            consumers = counts.consumers,
            "Drain failed; tearing down anyway"
        );
        DrainOutcome::Stragglers(counts)
    }

    /// Set the shutdown flag and sample the role counters.
    pub fn request_shutdown(&mut self) -> PipeResult<ParticipantCounts> {
        self.machine
            .transition_to(ShutdownState::ShutdownRequested)?;

        let mut index = self.segment.lock_index()?;
        index.request_shutdown();
        let counts = index.participants();
        drop(index);

        tracing::info!(
            segment = %self.segment.name(),
            producers = counts.producers,
            consumers = counts.consumers,
            "Shutdown requested"
        );
        Ok(counts)
    }

    /// Post enough permits to wake every participant that may be parked.
    ///
    /// The slack covers participants that were between registering and
    /// blocking when the counters were sampled.
    pub fn wake_all(&self, counts: ParticipantCounts) -> PipeResult<()> {
        let slack = self.settings.wake_slack;
        let consumers_woken = counts.consumers.saturating_add(slack);
        let producers_woken = counts.producers.saturating_add(slack);

        self.segment.filled_permits().release_many(consumers_woken)?;
        self.segment.free_permits().release_many(producers_woken)?;

        tracing::debug!(
            segment = %self.segment.name(),
            consumers_woken,
            producers_woken,
            "Flooded permit semaphores"
        );
        Ok(())
    }

    /// Poll the role counters every `poll_interval` for at most
    /// `drain_timeout` ticks.
    pub fn drain(&mut self) -> PipeResult<DrainOutcome> {
        if self.machine.state() != ShutdownState::ShutdownRequested {
            return Err(StateTransitionError::InvalidTransition {
                from: self.machine.state().name(),
                to: ShutdownState::Terminated.name(),
            }
            .into());
        }

        let started = Instant::now();
        for tick in 0..self.settings.drain_ticks {
            let counts = self.segment.participants()?;
            if counts.is_zero() {
                return self.finish_drain(started);
            }
            tracing::info!(
                segment = %self.segment.name(),
                tick = tick + 1,
                of = self.settings.drain_ticks,
                producers = counts.producers,
                consumers = counts.consumers,
                "Waiting for participants to drain"
            );
            std::thread::sleep(self.settings.poll_interval);
        }

        let counts = self.segment.participants()?;
        if counts.is_zero() {
            return self.finish_drain(started);
        }

        tracing::warn!(
            segment = %self.segment.name(),
            producers = counts.producers,
            consumers = counts.consumers,
            "Drain timed out; some participants did not respond"
        );
        Ok(DrainOutcome::Stragglers(counts))
    }

    fn finish_drain(&mut self, started: Instant) -> PipeResult<DrainOutcome> {
        self.machine.transition_to(ShutdownState::Terminated)?;
        let waited = started.elapsed();
        tracing::info!(
            segment = %self.segment.name(),
            waited_ms = waited.as_millis() as u64,
            "All participants drained"
        );
        Ok(DrainOutcome::Drained { waited })
    }

    /// Destroy the segment.
    ///
    /// Requires a drain outcome, so it cannot run before shutdown was
    /// requested and polled. The counters are checked once more; stragglers
    /// are logged, not waited for.
    pub fn teardown(self, outcome: DrainOutcome) -> PipeResult<()> {
        if self.machine.state() == ShutdownState::Running {
            return Err(StateTransitionError::InvalidTransition {
                from: ShutdownState::Running.name(),
                to: ShutdownState::Terminated.name(),
            }
            .into());
        }

        let counts = self.segment.participants()?;
        if !counts.is_zero() {
            tracing::warn!(
                segment = %self.segment.name(),
                producers = counts.producers,
                consumers = counts.consumers,
                ?outcome,
                "Tearing down with participants still attached"
            );
        }

        self.segment.destroy()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Capacity, SegmentName};
    use std::io::Write;

    fn segment(tag: &str) -> (Segment, tempfile::NamedTempFile) {
        let mut source = tempfile::NamedTempFile::new().unwrap();
        source.write_all(b"abc").unwrap();
        let name =
            SegmentName::new(format!("xorpipe-coord-{}-{}", tag, std::process::id())).unwrap();
        let segment = Segment::create(&name, Capacity::new(2).unwrap(), source.path()).unwrap();
        (segment, source)
    }

    fn settings() -> ShutdownConfig {
        ShutdownConfig {
            drain_ticks: 2,
            poll_interval: Duration::from_millis(5),
            wake_slack: 1,
        }
    }

    #[test]
    fn test_wake_all_posts_counts_plus_slack() {
        let (segment, _source) = segment("flood");
        let name = segment.name().clone();
        let mut coordinator = Coordinator::new(segment, settings());
        coordinator.request_shutdown().unwrap();

        coordinator
            .wake_all(ParticipantCounts {
                producers: 2,
                consumers: 3,
            })
            .unwrap();
        assert_eq!(coordinator.segment().filled_permits().value().unwrap(), 4);
        assert_eq!(coordinator.segment().free_permits().value().unwrap(), 2 + 3);

        let outcome = coordinator.drain().unwrap();
        coordinator.teardown(outcome).unwrap();
        assert!(Segment::attach(&name).is_err());
    }

    #[test]
    fn test_failed_drain_still_tears_down() {
        let (segment, _source) = segment("faildrain");
        let name = segment.name().clone();
        let mut coordinator = Coordinator::new(segment, settings());
        coordinator.request_shutdown().unwrap();

        let error = PipeError::ShutdownInProgress {
            segment: name.to_string(),
        };
        let outcome = coordinator.outcome_after_failed_drain(&error);
        assert_eq!(outcome, DrainOutcome::Stragglers(ParticipantCounts::default()));

        coordinator.teardown(outcome).unwrap();
        assert!(Segment::attach(&name).is_err());
    }
}
