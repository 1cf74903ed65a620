// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! xorpipe CLI
//!
//! One subcommand per participant role: the initializer, producers,
//! consumers, the shutdown coordinator, and a read-only stats probe.

use clap::{Parser, Subcommand};

mod commands;
mod display;

/// xorpipe - encrypted byte transfer between processes over shared memory
#[derive(Parser)]
#[command(name = "xorpipe")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Session file (YAML); command-line values take precedence
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create and initialise a transfer segment
    Init {
        /// Shared memory identifier, e.g. /my_segment
        #[arg(short, long)]
        segment: Option<String>,

        /// Ring buffer size in slots (1-10000)
        #[arg(short = 'n', long, allow_hyphen_values = true)]
        capacity: Option<i64>,

        /// File producers will read from
        #[arg(short = 'f', long)]
        source: Option<String>,
    },

    /// Encrypt the source file into the ring
    Produce {
        #[arg(short, long)]
        segment: Option<String>,

        /// XOR key, decimal or 0x hex
        #[arg(short, long)]
        key: Option<String>,

        /// Split the source with other producers through the shared cursor
        #[arg(long)]
        shared: bool,
    },

    /// Decrypt bytes from the ring into an output file
    Consume {
        #[arg(short, long)]
        segment: Option<String>,

        #[arg(short, long)]
        key: Option<String>,

        /// Output file (default: output_receptor.txt)
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Wait for SIGINT/SIGTERM/SIGUSR1, then drain everyone and destroy the segment
    Shutdown {
        #[arg(short, long)]
        segment: Option<String>,

        /// Skip waiting for a signal and shut down immediately
        #[arg(long)]
        now: bool,
    },

    /// Show segment statistics
    Stats {
        #[arg(short, long)]
        segment: Option<String>,

        /// Print JSON instead of text
        #[arg(long)]
        json: bool,

        /// Refresh every second until interrupted
        #[arg(short, long)]
        watch: bool,
    },

    /// Validate a session file
    Validate {
        /// Path to the session file
        file: String,
    },
}

/// Producers and consumers block in `sem_wait` on this thread; a
/// single-threaded runtime guarantees SIGINT is delivered to it.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config = commands::load_config(cli.config.as_deref())?;

    // Dispatch to command handlers
    match cli.command {
        Commands::Init {
            segment,
            capacity,
            source,
        } => commands::init::execute(&config, segment, capacity, source).await,
        Commands::Produce {
            segment,
            key,
            shared,
        } => commands::produce::execute(&config, segment, key, shared).await,
        Commands::Consume {
            segment,
            key,
            output,
        } => commands::consume::execute(&config, segment, key, output).await,
        Commands::Shutdown { segment, now } => {
            commands::shutdown::execute(&config, segment, now).await
        }
        Commands::Stats {
            segment,
            json,
            watch,
        } => commands::stats::execute(&config, segment, json, watch).await,
        Commands::Validate { file } => commands::validate::execute(&file).await,
    }
}
