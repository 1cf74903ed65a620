// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! `xorpipe validate` command - Validate a session file.

use xorpipe_core::ConfigLoader;

use super::CommandResult;

fn or_unset<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "(unset)".to_string(), |v| v.to_string())
}

pub async fn execute(file: &str) -> CommandResult {
    tracing::info!(file = %file, "Validating configuration");

    match ConfigLoader::load_file(file) {
        Ok(config) => {
            let session = &config.session;
            println!("✓ Configuration is valid");
            println!();
            println!("Session:");
            println!(
                "  Segment:  {}",
                or_unset(session.segment.as_ref().map(|s| s.os_name()))
            );
            println!("  Capacity: {}", or_unset(session.capacity.map(|c| c.get())));
            println!(
                "  Source:   {}",
                or_unset(session.source.as_ref().map(|s| s.display()))
            );
            println!("  Key:      {}", or_unset(session.key));
            println!();
            println!("Shutdown:");
            println!("  Drain ticks:   {}", config.shutdown.drain_ticks);
            println!(
                "  Poll interval: {}ms",
                config.shutdown.poll_interval.as_millis()
            );
            println!("  Wake slack:    {}", config.shutdown.wake_slack);
            println!();
            println!("Consumer output: {}", config.consumer.output.display());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration validation failed:");
            eprintln!("  {}", e);
            std::process::exit(1);
        }
    }
}
