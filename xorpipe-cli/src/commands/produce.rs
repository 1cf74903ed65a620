// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe produce` command - Encrypt the source file into the ring.

use nix::sys::signal::Signal;
use xorpipe_core::{Config, InterruptFlag, Producer, Segment, SourceMode, StopReason};

use super::{segment_name, xor_key, CommandResult};
use crate::display;

pub async fn execute(
    config: &Config,
    segment: Option<String>,
    key: Option<String>,
    shared: bool,
) -> CommandResult {
    let name = segment_name(config, segment)?;
    let key = xor_key(config, key)?;
    let mode = if shared {
        SourceMode::Shared
    } else {
        SourceMode::Exclusive
    };

    let interrupt = InterruptFlag::install(&[Signal::SIGINT, Signal::SIGTERM])?;
    let segment = Segment::attach(&name)?;

    println!("{}", display::transfer_header("sent"));
    let report = Producer::new(&segment, key, interrupt).run_file(mode, &mut |receipt| {
        println!(
            "{}",
            display::transfer_line(receipt.plaintext, receipt.sequence, receipt.timestamp)
        );
    })?;

    match report.stop {
        StopReason::EndOfInput => println!("✓ Source exhausted, {} bytes sent", report.published),
        StopReason::Shutdown => println!("Shutdown requested, {} bytes sent", report.published),
        StopReason::Interrupted => println!("Interrupted, {} bytes sent", report.published),
    }
    Ok(())
}
