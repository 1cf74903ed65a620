// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Local interruption of a participant.
//!
//! Handlers are installed without `SA_RESTART`, so a signal that arrives while
//! a participant is parked on a permit makes the wait return
//! [`WaitOutcome::Interrupted`](crate::shm::WaitOutcome) instead of resuming.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};

use crate::error::{PipeError, PipeResult};

/// Set from the signal handler; async-signal-safe.
static SIGNALLED: AtomicBool = AtomicBool::new(false);

extern "C" fn on_signal(_signum: libc::c_int) {
    SIGNALLED.store(true, Ordering::SeqCst);
}

/// Tells a participant loop that its own process was asked to stop.
#[derive(Debug, Clone, Default)]
pub struct InterruptFlag {
    local: Arc<AtomicBool>,
    process: bool,
}

impl InterruptFlag {
    /// A flag only set through [`InterruptFlag::raise`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Install handlers for `signals` and return a flag that observes them.
    pub fn install(signals: &[Signal]) -> PipeResult<Self> {
        let action = SigAction::new(
            SigHandler::Handler(on_signal),
            SaFlags::empty(),
            SigSet::empty(),
        );
        for &signal in signals {
            // SAFETY: the handler only stores to an atomic
            unsafe { sigaction(signal, &action) }.map_err(|e| PipeError::Io {
                context: "installing signal handler",
                source: std::io::Error::from(e),
            })?;
            tracing::debug!(signal = %signal, "Installed interrupt handler");
        }

        Ok(Self {
            local: Arc::new(AtomicBool::new(false)),
            process: true,
        })
    }

    pub fn raise(&self) {
        self.local.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.local.load(Ordering::SeqCst) || (self.process && SIGNALLED.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_flag() {
        let flag = InterruptFlag::new();
        let clone = flag.clone();
        assert!(!flag.is_set());
        clone.raise();
        assert!(flag.is_set());
    }

    #[test]
    fn test_detached_flag_ignores_process_signal() {
        let flag = InterruptFlag::new();
        SIGNALLED.store(true, Ordering::SeqCst);
        assert!(!flag.is_set());
        SIGNALLED.store(false, Ordering::SeqCst);
    }
}
