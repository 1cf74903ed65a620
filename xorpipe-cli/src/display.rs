// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Ankit Kumar Pandey

//! Terminal rendering shared by the commands.

use chrono::{DateTime, Local};
use xorpipe_core::SegmentStats;

/// Printable form of a transferred byte.
pub fn glyph(byte: u8) -> String {
    match byte {
        b'\n' => "\\n".to_string(),
        b'\t' => "\\t".to_string(),
        b' ' => "' '".to_string(),
        0x21..=0x7e => (byte as char).to_string(),
        _ => format!("\\x{:02x}", byte),
    }
}

/// Wall-clock `HH:MM:SS` for a slot timestamp (unix seconds).
pub fn clock(timestamp: i64) -> String {
    DateTime::from_timestamp(timestamp, 0)
        .map(|utc| utc.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

pub fn transfer_header(verb: &str) -> String {
    format!("{:<8} {:>6} {:>10} {:>8}", verb, "byte", "sequence", "time")
}

pub fn transfer_line(byte: u8, sequence: u64, timestamp: i64) -> String {
    format!("{:<8} {:>6} {:>10} {:>8}", glyph(byte), byte, sequence, clock(timestamp))
}

pub fn print_stats(stats: &SegmentStats) {
    println!("Segment /{}", stats.segment);
    println!("  Capacity:           {} slots", stats.capacity);
    println!("  Source:             {}", stats.source_path.display());
    println!(
        "  Memory:             {} bytes (control {}, buffer {})",
        stats.total_bytes, stats.control_bytes, stats.buffer_bytes
    );
    println!("  Transferred:        {}", stats.transferred);
    println!(
        "  Resident:           {} (write {}, read {})",
        stats.resident, stats.write_cursor, stats.read_cursor
    );
    println!("  Shared cursor:      {}", stats.shared_file_cursor);
    println!("  Active producers:   {}", stats.active_producers);
    println!("  Active consumers:   {}", stats.active_consumers);
    println!(
        "  Shutdown requested: {}",
        if stats.shutdown_requested { "yes" } else { "no" }
    );
}
