// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Shutdown state machine with typed state transitions.
//!
//! Implements the session lifecycle: Running → ShutdownRequested → Drained → Terminated.
//! Participants pass through Drained when they observe the flag and deregister;
//! the coordinator reaches Terminated once every participant has drained.
//! Invalid transitions result in StateTransitionError.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::StateTransitionError;

/// Shutdown protocol states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShutdownState {
    /// Producers and consumers loop normally.
    Running,

    /// The flag is set and sleepers have been (or are being) woken.
    ShutdownRequested,

    /// A participant observed the flag and deregistered.
    Drained,

    /// Every role counter reached zero; the segment may be destroyed.
    Terminated,
}

impl ShutdownState {
    /// Get the state name for error messages.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::ShutdownRequested => "ShutdownRequested",
            Self::Drained => "Drained",
            Self::Terminated => "Terminated",
        }
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: ShutdownState) -> bool {
        matches!(
            (self, target),
            (Self::Running, Self::ShutdownRequested)
                | (Self::ShutdownRequested, Self::Drained)
                | (Self::ShutdownRequested, Self::Terminated)
                | (Self::Drained, Self::Terminated)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminated)
    }
}

impl std::fmt::Display for ShutdownState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// State machine for one view of the shutdown protocol.
/// Enforces valid state transitions and tracks timing.
#[derive(Debug)]
pub struct ShutdownStateMachine {
    current_state: ShutdownState,
    last_transition: Instant,
    transition_count: u64,
}

impl ShutdownStateMachine {
    pub fn new() -> Self {
        Self {
            current_state: ShutdownState::Running,
            last_transition: Instant::now(),
            transition_count: 0,
        }
    }

    pub fn state(&self) -> ShutdownState {
        self.current_state
    }

    /// Time spent in the current state.
    pub fn time_in_state(&self) -> std::time::Duration {
        self.last_transition.elapsed()
    }

    pub fn transition_count(&self) -> u64 {
        self.transition_count
    }

    /// Attempt to transition to a new state.
    pub fn transition_to(&mut self, target: ShutdownState) -> Result<(), StateTransitionError> {
        if self.current_state.is_terminal() {
            return Err(StateTransitionError::TerminalState {
                state: self.current_state.name(),
            });
        }

        if !self.current_state.can_transition_to(target) {
            return Err(StateTransitionError::InvalidTransition {
                from: self.current_state.name(),
                to: target.name(),
            });
        }

        tracing::debug!(
            from = %self.current_state,
            to = %target,
            elapsed_ms = self.last_transition.elapsed().as_millis() as u64,
            "Shutdown state transition"
        );

        self.current_state = target;
        self.last_transition = Instant::now();
        self.transition_count += 1;
        Ok(())
    }
}

impl Default for ShutdownStateMachine {
    fn default() -> Self {
        Self::new()
    }
}
