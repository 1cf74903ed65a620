// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Process-shared counting semaphores living inside the segment.
//!
//! Each semaphore is an unnamed POSIX `sem_t` initialised with `pshared = 1`,
//! so every process that maps the segment operates on the same counter.
//! A binary semaphore doubles as the segment's mutual-exclusion locks.

use std::cell::UnsafeCell;

use crate::error::SharedMemoryError;

/// Storage for one `sem_t` inside the mapped header.
#[repr(transparent)]
pub(crate) struct RawSemaphore(UnsafeCell<libc::sem_t>);

/// Result of a blocking permit wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// One permit was taken.
    Acquired,
    /// A signal arrived before a permit became available. Nothing was taken.
    Interrupted,
}

/// Borrowed handle to a semaphore in a mapped segment.
#[derive(Clone, Copy)]
pub struct Semaphore<'a> {
    raw: &'a RawSemaphore,
    label: &'static str,
}

impl<'a> Semaphore<'a> {
    pub(crate) fn new(raw: &'a RawSemaphore, label: &'static str) -> Self {
        Self { raw, label }
    }

    fn ptr(&self) -> *mut libc::sem_t {
        self.raw.0.get()
    }

    fn failure(&self, op: &'static str) -> SharedMemoryError {
        SharedMemoryError::SemaphoreFailed {
            op,
            label: self.label,
            reason: std::io::Error::last_os_error().to_string(),
        }
    }

    /// Initialise the semaphore with `value` permits, shared across processes.
    ///
    /// Must only be called once, by the creator, before any other process attaches.
    pub(crate) fn init(&self, value: u32) -> Result<(), SharedMemoryError> {
        // SAFETY: ptr points into a live MAP_SHARED mapping
        if unsafe { libc::sem_init(self.ptr(), 1, value) } < 0 {
            return Err(self.failure("sem_init"));
        }
        tracing::debug!(label = self.label, value = value, "Initialised semaphore");
        Ok(())
    }

    /// Take one permit, blocking while none are available.
    ///
    /// A signal delivered during the wait yields [`WaitOutcome::Interrupted`]
    /// and leaves the count untouched.
    pub fn acquire(&self) -> Result<WaitOutcome, SharedMemoryError> {
        // SAFETY: ptr refers to an initialised process-shared semaphore
        if unsafe { libc::sem_wait(self.ptr()) } == 0 {
            return Ok(WaitOutcome::Acquired);
        }
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::EINTR) => Ok(WaitOutcome::Interrupted),
            _ => Err(self.failure("sem_wait")),
        }
    }

    /// Take one permit if one is available right now.
    pub fn try_acquire(&self) -> Result<bool, SharedMemoryError> {
        // SAFETY: ptr refers to an initialised process-shared semaphore
        if unsafe { libc::sem_trywait(self.ptr()) } == 0 {
            return Ok(true);
        }
        match std::io::Error::last_os_error().raw_os_error() {
            Some(libc::EAGAIN) | Some(libc::EINTR) => Ok(false),
            _ => Err(self.failure("sem_trywait")),
        }
    }

    /// Return one permit, waking a waiter if there is one.
    pub fn release(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: ptr refers to an initialised process-shared semaphore
        if unsafe { libc::sem_post(self.ptr()) } < 0 {
            return Err(self.failure("sem_post"));
        }
        Ok(())
    }

    /// Return `count` permits.
    pub fn release_many(&self, count: u32) -> Result<(), SharedMemoryError> {
        for _ in 0..count {
            self.release()?;
        }
        Ok(())
    }

    /// Current permit count. Racy by nature; for diagnostics and tests only.
    pub fn value(&self) -> Result<i32, SharedMemoryError> {
        let mut value: libc::c_int = 0;
        // SAFETY: ptr refers to an initialised semaphore, value is a valid out-pointer
        if unsafe { libc::sem_getvalue(self.ptr(), &mut value) } < 0 {
            return Err(self.failure("sem_getvalue"));
        }
        Ok(value)
    }

    /// Lock the semaphore as a mutex.
    ///
    /// Lock hold times are a handful of instructions, so an interrupted wait
    /// is simply retried.
    pub fn lock(&self) -> Result<LockGuard<'a>, SharedMemoryError> {
        loop {
            match self.acquire()? {
                WaitOutcome::Acquired => return Ok(LockGuard { sem: *self }),
                WaitOutcome::Interrupted => continue,
            }
        }
    }

    /// Destroy the semaphore. No process may use it afterwards.
    pub(crate) fn destroy(&self) -> Result<(), SharedMemoryError> {
        // SAFETY: caller guarantees no process is waiting on the semaphore
        if unsafe { libc::sem_destroy(self.ptr()) } < 0 {
            return Err(self.failure("sem_destroy"));
        }
        tracing::debug!(label = self.label, "Destroyed semaphore");
        Ok(())
    }

    pub fn label(&self) -> &'static str {
        self.label
    }
}

/// Releases the lock on drop.
pub struct LockGuard<'a> {
    sem: Semaphore<'a>,
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.sem.release() {
            tracing::error!(label = self.sem.label, error = %e, "Failed to release lock");
        }
    }
}
