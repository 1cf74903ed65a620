//! xorpipe Core Library
//!
//! Lets independent processes stream bytes through a fixed-size shared memory
//! ring. Producers XOR-encrypt and append, consumers remove and decrypt, and a
//! coordinator process can drain and tear the session down on request.
//! Provides the segment layout, the bounded ring synchronizer, the shared file
//! cursor for multi-producer sources, and the cooperative shutdown protocol.

pub mod cipher;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod file_cursor;
pub mod interrupt;
pub mod participant;
pub mod shm;
pub mod state;
pub mod stats;
pub mod types;

// Re-export commonly used types
pub use config::{Config, ConfigLoader, ConsumerConfig, SessionConfig, ShutdownConfig};
pub use coordinator::{Coordinator, DrainOutcome, ShutdownReport};
pub use error::{HardValidationError, PipeError, PipeResult, SharedMemoryError};
pub use file_cursor::{ByteSource, ExclusiveReader, SharedFileCursor, SourceByte};
pub use interrupt::InterruptFlag;
pub use participant::{Consumer, ConsumerReport, Producer, ProducerReport, SourceMode, StopReason};
pub use shm::{ParticipantCounts, Role, Segment};
pub use state::{ShutdownState, ShutdownStateMachine};
pub use stats::SegmentStats;
pub use types::{Capacity, SegmentName, XorKey};
