// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe stats` command - Show segment statistics.
//!
//! Read-only: attaches without registering, so it never delays a drain.

use std::time::Duration;

use xorpipe_core::{Config, Segment};

use super::{segment_name, CommandResult};
use crate::display;

pub async fn execute(
    config: &Config,
    segment: Option<String>,
    json: bool,
    watch: bool,
) -> CommandResult {
    let name = segment_name(config, segment)?;
    let segment = Segment::attach(&name)?;

    if !watch {
        return render(&segment, json);
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !json {
                    println!();
                }
                render(&segment, json)?;
            }
            _ = tokio::signal::ctrl_c() => return Ok(()),
        }
    }
}

fn render(segment: &Segment, json: bool) -> CommandResult {
    let stats = segment.stats()?;
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        display::print_stats(&stats);
    }
    Ok(())
}
