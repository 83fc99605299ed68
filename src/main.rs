//! # gurney command line
//!
//! ```bash
//! gurney analyze egresos_2024.xlsx --owner 1 --out egresos_2024.zip
//! gurney list --owner 1
//! gurney report 4 --owner 1 --out informe.pdf
//! ```
//!
//! Logging goes to stderr and to daily files in the gurney data directory;
//! set `RUST_LOG=debug` for stage-level detail.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout, clippy::print_stderr)] // Allow println! in main binary

mod cli;

use clap::Parser as _;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = cli::Cli::parse();

    if let Err(e) = gurney::logging::init() {
        eprintln!("Logging unavailable: {e:#}");
    }

    tokio::runtime::Runtime::new()?.block_on(cli::run_command(cli))?;
    Ok(())
}
