//! ## tagalloc-cli
//! **Host-side driver for the allocation tracker**
//!
//! Runs a tracker on the host allocator so the table behaviour, dump format
//! and configuration can be inspected without a device.

use clap::Parser;
use tagalloc_telemetry::LogSetup;

mod commands;
mod error;

use commands::Cli;

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    LogSetup::init();
    let cli = Cli::parse();
    commands::run_command(cli)?;
    Ok(())
}
