// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shared Memory IPC module.
//!
//! Byte transfer between unrelated processes through one named POSIX shared
//! memory segment: a fixed header with process-shared semaphores followed by
//! a bounded ring of slots.

mod layout;
mod region;
mod ring_buffer;
mod segment;
mod semaphore;

pub use layout::{segment_size, Slot, HEADER_SIZE, MAX_SOURCE_PATH, NEVER_WRITTEN, SLOT_SIZE};
pub use region::SharedMemoryRegion;
pub use ring_buffer::{Delivery, Receipt, RingBuffer, RingOutcome};
pub use segment::{FileGuard, IndexGuard, ParticipantCounts, Registration, Role, Segment};
pub use semaphore::{LockGuard, Semaphore, WaitOutcome};
