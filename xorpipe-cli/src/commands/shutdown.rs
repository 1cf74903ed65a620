// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe shutdown` command - Coordinate the cooperative shutdown.
//!
//! Attaches first so a missing segment fails immediately, then waits for
//! SIGINT, SIGTERM or SIGUSR1 unless `--now` is given.

use tokio::signal::unix::{signal, SignalKind};
use xorpipe_core::{Config, Coordinator, DrainOutcome};

use super::{segment_name, CommandResult};
use crate::display;

pub async fn execute(config: &Config, segment: Option<String>, now: bool) -> CommandResult {
    let name = segment_name(config, segment)?;
    let coordinator = Coordinator::attach(&name, config.shutdown)?;

    if !now {
        let mut interrupt = signal(SignalKind::interrupt())?;
        let mut terminate = signal(SignalKind::terminate())?;
        let mut user1 = signal(SignalKind::user_defined1())?;

        println!(
            "Coordinating {} (pid {}); send SIGINT, SIGTERM or SIGUSR1 to shut down",
            name.os_name(),
            std::process::id()
        );

        let received = tokio::select! {
            _ = interrupt.recv() => "SIGINT",
            _ = terminate.recv() => "SIGTERM",
            _ = user1.recv() => "SIGUSR1",
        };
        tracing::info!(signal = received, segment = %name, "Shutdown signal received");
    }

    // Drain polling sleeps between ticks; keep it off the runtime thread.
    let report = tokio::task::spawn_blocking(move || coordinator.shutdown()).await??;

    println!(
        "Requested shutdown with {} producers and {} consumers active",
        report.requested.producers, report.requested.consumers
    );
    match report.outcome {
        DrainOutcome::Drained { waited } => {
            println!("✓ All participants exited after {:.1}s", waited.as_secs_f64())
        }
        DrainOutcome::Stragglers(counts) => println!(
            "⚠ Timed out with {} producers and {} consumers still registered",
            counts.producers, counts.consumers
        ),
    }
    println!();
    display::print_stats(&report.stats);
    println!();
    println!("✓ Segment {} destroyed", name.os_name());
    Ok(())
}
