// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe consume` command - Decrypt ring bytes into the output file.

use std::fs::File;
use std::path::PathBuf;

use nix::sys::signal::Signal;
use xorpipe_core::{Config, Consumer, InterruptFlag, Segment, StopReason};

use super::{segment_name, xor_key, CommandResult};
use crate::display;

pub async fn execute(
    config: &Config,
    segment: Option<String>,
    key: Option<String>,
    output: Option<String>,
) -> CommandResult {
    let name = segment_name(config, segment)?;
    let key = xor_key(config, key)?;
    let output = output
        .map(PathBuf::from)
        .unwrap_or_else(|| config.consumer.output.clone());

    let interrupt = InterruptFlag::install(&[Signal::SIGINT, Signal::SIGTERM])?;
    let segment = Segment::attach(&name)?;
    let sink = File::create(&output)
        .map_err(|e| format!("cannot open output {}: {}", output.display(), e))?;

    tracing::info!(segment = %name, output = %output.display(), "Writing decrypted bytes");

    println!("{}", display::transfer_header("received"));
    let report = Consumer::new(&segment, key, interrupt).run(sink, &mut |delivery| {
        println!(
            "{}",
            display::transfer_line(delivery.byte, delivery.sequence, delivery.timestamp)
        );
    })?;

    match report.stop {
        StopReason::Shutdown => println!("Shutdown requested, {} bytes received", report.consumed),
        StopReason::Interrupted => println!("Interrupted, {} bytes received", report.consumed),
        StopReason::EndOfInput => println!("{} bytes received", report.consumed),
    }
    println!("  Output: {}", output.display());
    Ok(())
}
