// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Bounded ring synchronizer.
//!
//! Classic counting-semaphore producer/consumer over the segment's slot array:
//! `free_permits` counts writable slots, `filled_permits` readable ones, and
//! `index_lock` serialises cursor updates. Any number of producers and
//! consumers in any number of processes may share one ring.
//!
//! Every blocking wait may return early because of shutdown or a local
//! interrupt; both are reported as [`RingOutcome`] variants, not errors.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::cipher;
use crate::error::PipeResult;
use crate::interrupt::InterruptFlag;
use crate::shm::layout::Slot;
use crate::shm::semaphore::{Semaphore, WaitOutcome};
use crate::shm::Segment;
use crate::types::XorKey;

/// What happened to a publish or consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RingOutcome<T> {
    Completed(T),
    /// The coordinator asked everyone to stop; nothing was transferred.
    Shutdown,
    /// This process was interrupted; nothing was transferred.
    Interrupted,
}

/// Result of a successful publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Sequence number stored in the slot.
    pub sequence: u64,
    pub timestamp: i64,
    pub plaintext: u8,
    pub ciphertext: u8,
}

/// Result of a successful consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub byte: u8,
    pub sequence: u64,
    pub timestamp: i64,
}

/// Producer/consumer view of a segment's ring for one key.
pub struct RingBuffer<'a> {
    segment: &'a Segment,
    key: XorKey,
    interrupt: InterruptFlag,
}

impl<'a> RingBuffer<'a> {
    pub fn new(segment: &'a Segment, key: XorKey) -> Self {
        Self {
            segment,
            key,
            interrupt: InterruptFlag::new(),
        }
    }

    /// Observe `interrupt` while waiting for permits.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub fn segment(&self) -> &'a Segment {
        self.segment
    }

    pub fn key(&self) -> XorKey {
        self.key
    }

    /// Encrypt `byte` and append it; the slot's sequence is the write cursor.
    ///
    /// Blocks while the ring is full.
    pub fn publish(&self, byte: u8) -> PipeResult<RingOutcome<Receipt>> {
        self.publish_inner(byte, None)
    }

    /// Like [`publish`](Self::publish), but the slot records `origin` (the
    /// byte's offset in a shared source file) as its sequence number.
    pub fn publish_at(&self, byte: u8, origin: u64) -> PipeResult<RingOutcome<Receipt>> {
        self.publish_inner(byte, Some(origin))
    }

    fn publish_inner(&self, byte: u8, origin: Option<u64>) -> PipeResult<RingOutcome<Receipt>> {
        let free = self.segment.free_permits();
        if let Some(stop) = self.wait_for_permit(free, "full")? {
            return Ok(stop);
        }

        let mut index = self.segment.lock_index()?;
        if index.shutdown_requested() {
            drop(index);
            // Hand the permit on so the next parked participant wakes too.
            free.release()?;
            return Ok(RingOutcome::Shutdown);
        }

        let slot = index.push_slot(
            Slot {
                sequence: 0,
                timestamp: now(),
                ciphertext: cipher::encrypt(byte, self.key),
            },
            origin,
        );
        drop(index);

        self.segment.filled_permits().release()?;

        Ok(RingOutcome::Completed(Receipt {
            sequence: slot.sequence,
            timestamp: slot.timestamp,
            plaintext: byte,
            ciphertext: slot.ciphertext,
        }))
    }

    /// Remove the oldest slot and decrypt it.
    ///
    /// Blocks while the ring is empty.
    pub fn consume(&self) -> PipeResult<RingOutcome<Delivery>> {
        let filled = self.segment.filled_permits();
        if let Some(stop) = self.wait_for_permit(filled, "empty")? {
            return Ok(stop);
        }

        let mut index = self.segment.lock_index()?;
        if index.shutdown_requested() {
            drop(index);
            filled.release()?;
            return Ok(RingOutcome::Shutdown);
        }

        let slot = index.pop_slot();
        drop(index);

        self.segment.free_permits().release()?;

        Ok(RingOutcome::Completed(Delivery {
            byte: cipher::decrypt(slot.ciphertext, self.key),
            sequence: slot.sequence,
            timestamp: slot.timestamp,
        }))
    }

    /// Take one permit from `sem`, or say why not.
    ///
    /// A non-blocking attempt comes first purely to log that the ring is
    /// `state`; the blocking wait is what provides correctness.
    fn wait_for_permit<T>(
        &self,
        sem: Semaphore<'_>,
        state: &'static str,
    ) -> PipeResult<Option<RingOutcome<T>>> {
        if sem.try_acquire()? {
            return Ok(None);
        }
        tracing::debug!(segment = %self.segment.name(), ring = state, "Waiting for {}", sem.label());

        loop {
            match sem.acquire()? {
                WaitOutcome::Acquired => return Ok(None),
                WaitOutcome::Interrupted => {
                    if self.segment.shutdown_requested()? {
                        return Ok(Some(RingOutcome::Shutdown));
                    }
                    if self.interrupt.is_set() {
                        tracing::warn!(segment = %self.segment.name(), "Permit wait interrupted");
                        return Ok(Some(RingOutcome::Interrupted));
                    }
                    tracing::debug!(segment = %self.segment.name(), "Spurious interruption, waiting again");
                }
            }
        }
    }
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
