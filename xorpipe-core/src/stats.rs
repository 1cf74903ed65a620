// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Point-in-time view of a segment header, taken under `index_lock`.
/// Rendered by `xorpipe stats` and by the coordinator before teardown.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SegmentStats {
    pub segment: String,
    pub capacity: u32,
    pub transferred: u64,
    /// Slots written but not yet read.
    pub resident: u64,
    pub write_cursor: u64,
    pub read_cursor: u64,
    pub active_producers: u32,
    pub active_consumers: u32,
    pub shutdown_requested: bool,
    pub shared_file_cursor: u64,
    pub source_path: PathBuf,
    pub total_bytes: usize,
    pub control_bytes: usize,
    pub buffer_bytes: usize,
}
