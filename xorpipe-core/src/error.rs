// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Custom error types for xorpipe.
//!
//! This module defines explicit enum error types as per coding guidelines.
//! No `Box<dyn Error>`, no `anyhow::Result` - all errors are strongly typed.
//!
//! Recoverable conditions of the transfer protocol are deliberately *not*
//! errors: an interrupted permit wait is a [`WaitOutcome`](crate::shm::WaitOutcome)
//! and a drain timeout is a [`DrainOutcome`](crate::coordinator::DrainOutcome).

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for xorpipe participants.
/// All errors are explicit variants - no catch-all or generic handling.
#[derive(Debug, Error)]
pub enum PipeError {
    // =========================================================================
    // Configuration Errors - Fail-Fast on Invalid Config
    // =========================================================================
    #[error("Hard validation error: {0}")]
    HardValidation(#[from] HardValidationError),

    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    #[error("Configuration parse error: {message}")]
    ConfigParse { message: String },

    // =========================================================================
    // Shutdown State Machine Errors
    // =========================================================================
    #[error("Invalid state transition: {0}")]
    InvalidStateTransition(#[from] StateTransitionError),

    #[error("Shutdown already requested for segment {segment} - refusing to register")]
    ShutdownInProgress { segment: String },

    // =========================================================================
    // Shared Memory Errors - Fatal at Attach Time
    // =========================================================================
    #[error("Shared memory error: {0}")]
    SharedMemory(#[from] SharedMemoryError),

    // =========================================================================
    // Participant Errors
    // =========================================================================
    #[error("Source file unavailable: {path} - {source}")]
    SourceUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // System Errors
    // =========================================================================
    #[error("IO error: {context} - {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

/// Hard validation errors cause immediate process termination.
/// Used when a parameter is invalid and the participant cannot safely start.
#[derive(Debug, Error)]
pub enum HardValidationError {
    #[error("Invalid capacity: {value} (must be between {min} and {max})")]
    InvalidCapacity { value: i64, min: u32, max: u32 },

    #[error("Invalid segment name '{name}': {reason}")]
    InvalidSegmentName { name: String, reason: String },

    #[error("Invalid field value: {field} = {value} - {reason}")]
    InvalidFieldValue {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("Source path too long: {len} bytes (max {max})")]
    SourcePathTooLong { len: usize, max: usize },

    #[error("Schema validation failed: {message}")]
    SchemaValidation { message: String },
}

/// State transition errors for the shutdown state machine.
#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Cannot transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },

    #[error("Shutdown protocol is in terminal state: {state}")]
    TerminalState { state: &'static str },
}

/// Shared memory errors - critical failures with no fallback.
#[derive(Debug, Error)]
pub enum SharedMemoryError {
    #[error("Shared memory segment not found: {name} (has the initializer run?)")]
    SegmentNotFound { name: String },

    #[error("Failed to attach to shared memory segment: {name} - {reason}")]
    AttachFailed { name: String, reason: String },

    #[error("Failed to create shared memory segment: {name} - {reason}")]
    CreateFailed { name: String, reason: String },

    #[error("Failed to map shared memory: {reason}")]
    MapFailed { reason: String },

    #[error("Semaphore operation '{op}' failed on {label}: {reason}")]
    SemaphoreFailed {
        op: &'static str,
        label: &'static str,
        reason: String,
    },

    #[error("Invalid segment layout: {reason}")]
    InvalidLayout { reason: String },
}

/// Result type alias using PipeError.
pub type PipeResult<T> = Result<T, PipeError>;
