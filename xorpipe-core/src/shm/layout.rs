// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! In-memory layout of a transfer segment.
//!
//! ```text
//! +--------------------------------------+  offset 0
//! | SegmentHeader (fixed size)           |
//! |   semaphores, cursors, counters,     |
//! |   shutdown flag, source path         |
//! +--------------------------------------+  HEADER_SIZE
//! | Slot[0] .. Slot[capacity - 1]        |
//! +--------------------------------------+  segment_size(capacity)
//! ```
//!
//! The layout is only meaningful between processes built from the same
//! source; it is not a portable on-disk format.

use std::sync::atomic::{AtomicU32, AtomicU64};

use crate::shm::semaphore::RawSemaphore;
use crate::types::Capacity;

/// Bytes reserved for the NUL-terminated source path.
pub const MAX_SOURCE_PATH: usize = 256;

/// Sequence number carried by a slot that has never been written.
pub const NEVER_WRITTEN: u64 = u64::MAX;

/// Fixed header at the start of every segment.
///
/// Counters are atomics so that a shared reference is sound, but every
/// mutation happens under `index_lock` (or `file_lock` for the file cursor);
/// relaxed ordering is enough because the semaphores provide the fences.
#[repr(C)]
pub(crate) struct SegmentHeader {
    pub free_permits: RawSemaphore,
    pub filled_permits: RawSemaphore,
    pub index_lock: RawSemaphore,
    pub file_lock: RawSemaphore,

    /// Written once by the initializer.
    pub capacity: AtomicU32,
    pub shutdown_requested: AtomicU32,

    pub write_cursor: AtomicU64,
    pub read_cursor: AtomicU64,
    pub transferred_count: AtomicU64,

    pub active_producers: AtomicU32,
    pub active_consumers: AtomicU32,

    /// Guarded by `file_lock`.
    pub shared_file_cursor: AtomicU64,

    /// Written once by the initializer.
    pub source_path: [u8; MAX_SOURCE_PATH],
}

/// One ring buffer element.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    /// Write cursor value at publish time. When producers share a source
    /// file this is instead the byte's offset in that file, so sorting by
    /// sequence rebuilds the file regardless of interleaving.
    pub sequence: u64,
    /// Seconds since the Unix epoch at publish time.
    pub timestamp: i64,
    pub ciphertext: u8,
}

impl Slot {
    pub(crate) const EMPTY: Slot = Slot {
        sequence: NEVER_WRITTEN,
        timestamp: 0,
        ciphertext: 0,
    };
}

/// Size of the fixed header.
pub const HEADER_SIZE: usize = std::mem::size_of::<SegmentHeader>();

/// Size of one slot.
pub const SLOT_SIZE: usize = std::mem::size_of::<Slot>();

/// Total segment size for a ring of `capacity` slots.
pub fn segment_size(capacity: Capacity) -> usize {
    HEADER_SIZE + capacity.slots() * SLOT_SIZE
}

/// Offset of the slot array; the header size is already slot-aligned.
pub(crate) const SLOTS_OFFSET: usize = HEADER_SIZE;

const _: () = assert!(HEADER_SIZE % std::mem::align_of::<Slot>() == 0);
