// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Typed handle over a mapped transfer segment.
//!
//! Callers never see raw offsets. Shared fields are read and mutated through
//! [`IndexGuard`] and [`FileGuard`], which can only be obtained by taking the
//! lock that protects those fields.

use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{HardValidationError, PipeError, PipeResult, SharedMemoryError};
use crate::shm::layout::{
    segment_size, SegmentHeader, Slot, HEADER_SIZE, MAX_SOURCE_PATH, SLOTS_OFFSET, SLOT_SIZE,
};
use crate::shm::semaphore::{LockGuard, Semaphore};
use crate::shm::SharedMemoryRegion;
use crate::stats::SegmentStats;
use crate::types::{Capacity, SegmentName};

/// Kind of participant tracked by the role counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Producer,
    Consumer,
}

impl Role {
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Snapshot of both role counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantCounts {
    pub producers: u32,
    pub consumers: u32,
}

impl ParticipantCounts {
    pub fn is_zero(&self) -> bool {
        self.producers == 0 && self.consumers == 0
    }
}

/// A mapped transfer segment.
pub struct Segment {
    region: SharedMemoryRegion,
    capacity: Capacity,
}

impl Segment {
    /// Create and initialise a segment. This is the initializer's job.
    ///
    /// Any stale segment with the same name is replaced. The source file must
    /// be readable at creation time so that producers fail early on typos.
    pub fn create(name: &SegmentName, capacity: Capacity, source: &Path) -> PipeResult<Self> {
        std::fs::File::open(source).map_err(|e| PipeError::SourceUnavailable {
            path: source.to_path_buf(),
            source: e,
        })?;

        let path_bytes = source.as_os_str().as_encoded_bytes();
        if path_bytes.len() >= MAX_SOURCE_PATH {
            return Err(HardValidationError::SourcePathTooLong {
                len: path_bytes.len(),
                max: MAX_SOURCE_PATH - 1,
            }
            .into());
        }

        let region = SharedMemoryRegion::create(name, segment_size(capacity))?;
        let segment = Self { region, capacity };

        // SAFETY: the region was just created and zeroed; no other process can
        // have attached because the capacity field is still zero.
        unsafe {
            let header = segment.region.as_ptr() as *mut SegmentHeader;
            let dest = std::ptr::addr_of_mut!((*header).source_path) as *mut u8;
            std::ptr::copy_nonoverlapping(path_bytes.as_ptr(), dest, path_bytes.len());

            for index in 0..capacity.slots() {
                std::ptr::write(segment.slot_ptr(index), Slot::EMPTY);
            }
        }

        let init = || -> Result<(), SharedMemoryError> {
            segment.free_permits().init(capacity.get())?;
            segment.filled_permits().init(0)?;
            segment.index_lock().init(1)?;
            segment.file_lock().init(1)?;
            Ok(())
        };
        if let Err(e) = init() {
            let _ = SharedMemoryRegion::unlink(name);
            return Err(e.into());
        }

        // Publishing the capacity last makes the segment attachable.
        segment
            .header()
            .capacity
            .store(capacity.get(), Ordering::Release);

        tracing::info!(
            segment = %name,
            capacity = capacity.get(),
            source = %source.display(),
            bytes = segment_size(capacity),
            "Initialised transfer segment"
        );

        Ok(segment)
    }

    /// Attach to an existing segment.
    ///
    /// Two-phase: map only the header to learn the capacity, validate it, then
    /// remap the full header-plus-ring region.
    pub fn attach(name: &SegmentName) -> PipeResult<Self> {
        let mut region = SharedMemoryRegion::open(name, HEADER_SIZE)?;

        // SAFETY: the view covers at least the header
        let raw_capacity = unsafe {
            (*(region.as_ptr() as *const SegmentHeader))
                .capacity
                .load(Ordering::Acquire)
        };
        let capacity = Capacity::new(i64::from(raw_capacity))?;

        region.remap(segment_size(capacity))?;

        tracing::debug!(segment = %name, capacity = capacity.get(), "Attached to segment");

        Ok(Self { region, capacity })
    }

    pub fn name(&self) -> &SegmentName {
        self.region.name()
    }

    pub fn capacity(&self) -> Capacity {
        self.capacity
    }

    /// Size of the mapped region in bytes.
    pub fn mapped_size(&self) -> usize {
        self.region.size()
    }

    pub(crate) fn header(&self) -> &SegmentHeader {
        // SAFETY: the mapping always covers the header and lives as long as self
        unsafe { &*(self.region.as_ptr() as *const SegmentHeader) }
    }

    fn slot_ptr(&self, index: usize) -> *mut Slot {
        debug_assert!(index < self.capacity.slots());
        // SAFETY: index < capacity, and the mapping covers every slot
        unsafe { self.region.as_ptr().add(SLOTS_OFFSET + index * SLOT_SIZE) as *mut Slot }
    }

    /// One permit per writable slot.
    pub fn free_permits(&self) -> Semaphore<'_> {
        Semaphore::new(&self.header().free_permits, "free_permits")
    }

    /// One permit per readable slot.
    pub fn filled_permits(&self) -> Semaphore<'_> {
        Semaphore::new(&self.header().filled_permits, "filled_permits")
    }

    fn index_lock(&self) -> Semaphore<'_> {
        Semaphore::new(&self.header().index_lock, "index_lock")
    }

    fn file_lock(&self) -> Semaphore<'_> {
        Semaphore::new(&self.header().file_lock, "file_lock")
    }

    /// Path of the file producers read from.
    pub fn source_path(&self) -> PathBuf {
        let raw = &self.header().source_path;
        let len = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
        // SAFETY: the bytes were produced by as_encoded_bytes in create
        let os = unsafe { std::ffi::OsStr::from_encoded_bytes_unchecked(&raw[..len]) };
        PathBuf::from(os)
    }

    /// Take `index_lock` and get access to cursors, counters and the flag.
    pub fn lock_index(&self) -> PipeResult<IndexGuard<'_>> {
        let lock = self.index_lock().lock()?;
        Ok(IndexGuard {
            segment: self,
            _lock: lock,
        })
    }

    /// Take `file_lock` and get access to the shared file cursor.
    pub fn lock_file(&self) -> PipeResult<FileGuard<'_>> {
        let lock = self.file_lock().lock()?;
        Ok(FileGuard {
            segment: self,
            _lock: lock,
        })
    }

    /// Read `shutdown_requested` under the lock.
    pub fn shutdown_requested(&self) -> PipeResult<bool> {
        Ok(self.lock_index()?.shutdown_requested())
    }

    /// Read both role counters under the lock.
    pub fn participants(&self) -> PipeResult<ParticipantCounts> {
        Ok(self.lock_index()?.participants())
    }

    /// Increment the counter for `role` and return a guard that decrements it
    /// again when dropped.
    ///
    /// Refuses to register once shutdown has been requested, so the
    /// coordinator's drain can never be outrun by a late joiner.
    pub fn register(&self, role: Role) -> PipeResult<Registration<'_>> {
        let mut index = self.lock_index()?;
        if index.shutdown_requested() {
            return Err(PipeError::ShutdownInProgress {
                segment: self.name().to_string(),
            });
        }
        index.adjust_role(role, true);
        let counts = index.participants();
        drop(index);

        tracing::info!(
            segment = %self.name(),
            role = %role,
            producers = counts.producers,
            consumers = counts.consumers,
            "Registered participant"
        );

        Ok(Registration {
            segment: self,
            role,
        })
    }

    /// Snapshot of the header for reporting.
    pub fn stats(&self) -> PipeResult<SegmentStats> {
        let index = self.lock_index()?;
        let counts = index.participants();
        let stats = SegmentStats {
            segment: self.name().to_string(),
            capacity: self.capacity.get(),
            transferred: index.transferred_count(),
            resident: index.occupancy(),
            write_cursor: index.write_cursor(),
            read_cursor: index.read_cursor(),
            active_producers: counts.producers,
            active_consumers: counts.consumers,
            shutdown_requested: index.shutdown_requested(),
            shared_file_cursor: self.header().shared_file_cursor.load(Ordering::Relaxed),
            source_path: self.source_path(),
            total_bytes: segment_size(self.capacity),
            control_bytes: HEADER_SIZE,
            buffer_bytes: self.capacity.slots() * SLOT_SIZE,
        };
        Ok(stats)
    }

    /// Destroy the semaphores and unlink the name.
    ///
    /// Only reachable through the coordinator's teardown, after the drain.
    pub(crate) fn destroy(self) -> PipeResult<()> {
        let name = self.name().clone();

        let mut first_error: Option<SharedMemoryError> = None;
        for sem in [
            self.free_permits(),
            self.filled_permits(),
            self.index_lock(),
            self.file_lock(),
        ] {
            if let Err(e) = sem.destroy() {
                tracing::warn!(segment = %name, error = %e, "Semaphore destroy failed");
                first_error.get_or_insert(e);
            }
        }

        drop(self);
        let unlinked = SharedMemoryRegion::unlink(&name);

        tracing::info!(segment = %name, "Segment destroyed");

        match (first_error, unlinked) {
            (Some(e), _) | (None, Err(e)) => Err(e.into()),
            (None, Ok(())) => Ok(()),
        }
    }
}

/// Exclusive access to the fields protected by `index_lock`.
pub struct IndexGuard<'a> {
    segment: &'a Segment,
    _lock: LockGuard<'a>,
}

impl IndexGuard<'_> {
    fn header(&self) -> &SegmentHeader {
        self.segment.header()
    }

    pub fn write_cursor(&self) -> u64 {
        self.header().write_cursor.load(Ordering::Relaxed)
    }

    pub fn read_cursor(&self) -> u64 {
        self.header().read_cursor.load(Ordering::Relaxed)
    }

    pub fn transferred_count(&self) -> u64 {
        self.header().transferred_count.load(Ordering::Relaxed)
    }

    /// Unread slots: `write_cursor - read_cursor`.
    pub fn occupancy(&self) -> u64 {
        self.write_cursor() - self.read_cursor()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.header().shutdown_requested.load(Ordering::Relaxed) != 0
    }

    /// Set the shutdown flag. It is never cleared.
    pub fn request_shutdown(&mut self) {
        self.header().shutdown_requested.store(1, Ordering::Relaxed);
    }

    pub fn participants(&self) -> ParticipantCounts {
        ParticipantCounts {
            producers: self.header().active_producers.load(Ordering::Relaxed),
            consumers: self.header().active_consumers.load(Ordering::Relaxed),
        }
    }

    fn adjust_role(&mut self, role: Role, up: bool) {
        let counter = match role {
            Role::Producer => &self.header().active_producers,
            Role::Consumer => &self.header().active_consumers,
        };
        let current = counter.load(Ordering::Relaxed);
        let next = if up {
            current + 1
        } else {
            current.saturating_sub(1)
        };
        counter.store(next, Ordering::Relaxed);
    }

    /// Store `slot` at `write_cursor mod capacity` and advance the cursor.
    ///
    /// The caller must hold a `free_permits` permit. Returns the cursor value
    /// the slot was written at.
    pub(crate) fn push_slot(&mut self, mut slot: Slot, sequence: Option<u64>) -> Slot {
        let write = self.write_cursor();
        debug_assert!(write - self.read_cursor() < u64::from(self.segment.capacity.get()));

        slot.sequence = sequence.unwrap_or(write);
        let index = (write % u64::from(self.segment.capacity.get())) as usize;
        // SAFETY: index < capacity; the free permit guarantees no reader owns it
        unsafe { std::ptr::write(self.segment.slot_ptr(index), slot) };

        self.header().write_cursor.store(write + 1, Ordering::Relaxed);
        let transferred = self.transferred_count();
        self.header()
            .transferred_count
            .store(transferred + 1, Ordering::Relaxed);
        slot
    }

    /// Read the slot at `read_cursor mod capacity` and advance the cursor.
    ///
    /// The caller must hold a `filled_permits` permit.
    pub(crate) fn pop_slot(&mut self) -> Slot {
        let read = self.read_cursor();
        debug_assert!(read < self.write_cursor());

        let index = (read % u64::from(self.segment.capacity.get())) as usize;
        // SAFETY: index < capacity; the filled permit guarantees it was written
        let slot = unsafe { std::ptr::read(self.segment.slot_ptr(index)) };

        self.header().read_cursor.store(read + 1, Ordering::Relaxed);
        slot
    }

    /// Look at a slot without consuming it.
    pub fn peek_slot(&self, index: usize) -> Option<Slot> {
        if index >= self.segment.capacity.slots() {
            return None;
        }
        // SAFETY: index < capacity and the index lock excludes concurrent writers
        Some(unsafe { std::ptr::read(self.segment.slot_ptr(index)) })
    }
}

/// Exclusive access to the shared file cursor.
pub struct FileGuard<'a> {
    segment: &'a Segment,
    _lock: LockGuard<'a>,
}

impl FileGuard<'_> {
    pub fn cursor(&self) -> u64 {
        self.segment
            .header()
            .shared_file_cursor
            .load(Ordering::Relaxed)
    }

    pub fn advance(&mut self) {
        let cursor = self.cursor();
        self.segment
            .header()
            .shared_file_cursor
            .store(cursor + 1, Ordering::Relaxed);
    }
}

/// Membership in a segment's role counters. Deregisters on drop.
pub struct Registration<'a> {
    segment: &'a Segment,
    role: Role,
}

impl<'a> Registration<'a> {
    pub fn role(&self) -> Role {
        self.role
    }

    pub fn segment(&self) -> &'a Segment {
        self.segment
    }
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        match self.segment.lock_index() {
            Ok(mut index) => {
                index.adjust_role(self.role, false);
                let counts = index.participants();
                drop(index);
                tracing::info!(
                    segment = %self.segment.name(),
                    role = %self.role,
                    producers = counts.producers,
                    consumers = counts.consumers,
                    "Deregistered participant"
                );
            }
            Err(e) => {
                tracing::error!(
                    segment = %self.segment.name(),
                    role = %self.role,
                    error = %e,
                    "Failed to deregister participant"
                );
            }
        }
    }
}
