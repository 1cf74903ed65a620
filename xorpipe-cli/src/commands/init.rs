// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe init` command - Create and initialise a segment.

use std::path::PathBuf;

use xorpipe_core::{Capacity, Config, Segment};

use super::{segment_name, CommandResult};

pub async fn execute(
    config: &Config,
    segment: Option<String>,
    capacity: Option<i64>,
    source: Option<String>,
) -> CommandResult {
    let name = segment_name(config, segment)?;
    let capacity = match capacity {
        Some(slots) => Capacity::new(slots)?,
        None => config
            .session
            .capacity
            .ok_or("no capacity given (use --capacity or session.capacity)")?,
    };
    let source = source
        .map(PathBuf::from)
        .or_else(|| config.session.source.clone())
        .ok_or("no source given (use --source or session.source)")?;

    tracing::info!(segment = %name, capacity = capacity.get(), "Initialising segment");

    let segment = Segment::create(&name, capacity, &source)?;
    let stats = segment.stats()?;

    println!("✓ Segment {} ready", name.os_name());
    println!("  Control block: {} bytes", stats.control_bytes);
    println!(
        "  Ring buffer:   {} bytes ({} slots)",
        stats.buffer_bytes, stats.capacity
    );
    println!("  Total:         {} bytes", stats.total_bytes);
    println!("  Source:        {}", source.display());

    // The segment outlives this process; only the coordinator removes it.
    Ok(())
}
