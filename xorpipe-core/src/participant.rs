// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Producer and consumer loops.
//!
//! Both register in the segment's role counters for the duration of `run`
//! and deregister on every exit path, including errors, via [`Registration`].

use std::fs::File;
use std::io::Write;

use crate::error::{PipeError, PipeResult};
use crate::file_cursor::{ByteSource, ExclusiveReader, SharedFileCursor};
use crate::interrupt::InterruptFlag;
use crate::shm::{Delivery, Receipt, Registration, RingBuffer, RingOutcome, Role, Segment};
use crate::state::{ShutdownState, ShutdownStateMachine};
use crate::types::XorKey;

/// Why a participant loop ended. All of these are clean exits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The source is exhausted (producers only).
    EndOfInput,
    /// The coordinator requested shutdown.
    Shutdown,
    /// The local process was interrupted.
    Interrupted,
}

/// How producers read the source file named in the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceMode {
    /// This producer reads the whole file on its own.
    #[default]
    Exclusive,
    /// Producers split the file through the segment's shared cursor.
    Shared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProducerReport {
    pub published: u64,
    pub stop: StopReason,
    /// `Drained` if the loop ended because of shutdown, otherwise `Running`.
    pub state: ShutdownState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsumerReport {
    pub consumed: u64,
    pub stop: StopReason,
    pub state: ShutdownState,
}

/// Appends source bytes to the ring.
pub struct Producer<'a> {
    ring: RingBuffer<'a>,
    interrupt: InterruptFlag,
}

impl<'a> Producer<'a> {
    pub fn new(segment: &'a Segment, key: XorKey, interrupt: InterruptFlag) -> Self {
        Self {
            ring: RingBuffer::new(segment, key).with_interrupt(interrupt.clone()),
            interrupt,
        }
    }

    /// Register, open the segment's source file and publish it.
    ///
    /// A source that cannot be opened is fatal, but only after the
    /// registration has been undone.
    pub fn run_file(
        &self,
        mode: SourceMode,
        observer: &mut dyn FnMut(&Receipt),
    ) -> PipeResult<ProducerReport> {
        let segment = self.ring.segment();
        let registration = segment.register(Role::Producer)?;

        let path = segment.source_path();
        let file = File::open(&path).map_err(|e| PipeError::SourceUnavailable {
            path: path.clone(),
            source: e,
        })?;

        tracing::info!(segment = %segment.name(), source = %path.display(), ?mode, "Producer started");

        match mode {
            SourceMode::Exclusive => {
                self.publish_all(registration, ExclusiveReader::new(file), observer)
            }
            SourceMode::Shared => {
                self.publish_all(registration, SharedFileCursor::new(segment, file), observer)
            }
        }
    }

    /// Register and publish everything `source` yields.
    pub fn run<S: ByteSource>(
        &self,
        source: S,
        observer: &mut dyn FnMut(&Receipt),
    ) -> PipeResult<ProducerReport> {
        let registration = self.ring.segment().register(Role::Producer)?;
        self.publish_all(registration, source, observer)
    }

    fn publish_all<S: ByteSource>(
        &self,
        registration: Registration<'_>,
        mut source: S,
        observer: &mut dyn FnMut(&Receipt),
    ) -> PipeResult<ProducerReport> {
        let segment = registration.segment();
        let mut published = 0u64;

        let stop = loop {
            if segment.shutdown_requested()? {
                break StopReason::Shutdown;
            }
            if self.interrupt.is_set() {
                break StopReason::Interrupted;
            }

            let Some(next) = source.next_byte()? else {
                break StopReason::EndOfInput;
            };

            let outcome = match next.origin {
                Some(origin) => self.ring.publish_at(next.byte, origin)?,
                None => self.ring.publish(next.byte)?,
            };

            match outcome {
                RingOutcome::Completed(receipt) => {
                    published += 1;
                    observer(&receipt);
                }
                RingOutcome::Shutdown => {
                    if next.origin.is_some() {
                        tracing::debug!(
                            segment = %segment.name(),
                            origin = ?next.origin,
                            "Claimed byte dropped by shutdown"
                        );
                    }
                    break StopReason::Shutdown;
                }
                RingOutcome::Interrupted => break StopReason::Interrupted,
            }
        };

        let state = finish(registration, stop);
        tracing::info!(segment = %segment.name(), published, ?stop, "Producer finished");
        Ok(ProducerReport {
            published,
            stop,
            state,
        })
    }
}

/// Removes bytes from the ring and writes them to a sink.
pub struct Consumer<'a> {
    ring: RingBuffer<'a>,
    interrupt: InterruptFlag,
}

impl<'a> Consumer<'a> {
    pub fn new(segment: &'a Segment, key: XorKey, interrupt: InterruptFlag) -> Self {
        Self {
            ring: RingBuffer::new(segment, key).with_interrupt(interrupt.clone()),
            interrupt,
        }
    }

    /// Register and consume until shutdown or interruption.
    ///
    /// Each decrypted byte is written and flushed before the next wait, so
    /// the sink is complete up to the last delivery whenever the loop stops.
    pub fn run<W: Write>(
        &self,
        mut sink: W,
        observer: &mut dyn FnMut(&Delivery),
    ) -> PipeResult<ConsumerReport> {
        let segment = self.ring.segment();
        let registration = segment.register(Role::Consumer)?;
        let mut consumed = 0u64;

        tracing::info!(segment = %segment.name(), "Consumer started");

        let stop = loop {
            if segment.shutdown_requested()? {
                break StopReason::Shutdown;
            }
            if self.interrupt.is_set() {
                break StopReason::Interrupted;
            }

            match self.ring.consume()? {
                RingOutcome::Completed(delivery) => {
                    sink.write_all(&[delivery.byte])
                        .and_then(|_| sink.flush())
                        .map_err(|e| PipeError::Io {
                            context: "writing consumer output",
                            source: e,
                        })?;
                    consumed += 1;
                    observer(&delivery);
                }
                RingOutcome::Shutdown => break StopReason::Shutdown,
                RingOutcome::Interrupted => break StopReason::Interrupted,
            }
        };

        let state = finish(registration, stop);
        tracing::info!(segment = %segment.name(), consumed, ?stop, "Consumer finished");
        Ok(ConsumerReport {
            consumed,
            stop,
            state,
        })
    }
}

/// Deregister, then record the participant's side of the shutdown protocol.
fn finish(registration: Registration<'_>, stop: StopReason) -> ShutdownState {
    let segment = registration.segment();
    let role = registration.role();
    drop(registration);

    let mut machine = ShutdownStateMachine::new();
    if stop == StopReason::Shutdown {
        let drained = machine
            .transition_to(ShutdownState::ShutdownRequested)
            .and_then(|_| machine.transition_to(ShutdownState::Drained));
        if let Err(e) = drained {
            tracing::error!(error = %e, "Unexpected shutdown state transition");
        }
        tracing::info!(segment = %segment.name(), role = %role, "Drained after shutdown request");
    }
    machine.state()
}
