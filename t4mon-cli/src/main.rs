//! `t4mon` CLI - collects T4 statistics through an ssh gateway
//!
//! Runs a live collection, or renders reports from a checkpoint written by
//! an earlier run.

mod cli;
mod commands;
mod error;
mod util;

use clap::Parser;
use cli::Cli;
use t4mon_core::tracing::{TracingConfig, TracingOutput, init_tracing};

fn main() {
    let cli = Cli::parse();

    let level = if cli.quiet {
        t4mon_core::TracingLevel::Error
    } else {
        cli.loglevel
            .unwrap_or_default()
            .adjusted(i8::try_from(cli.verbose).unwrap_or(i8::MAX))
    };
    let output = cli
        .logfile
        .clone()
        .map_or(TracingOutput::Stderr, TracingOutput::File);
    let config = TracingConfig::new()
        .with_level(level)
        .with_output(output)
        .with_thread_names(true);
    if let Err(e) = init_tracing(&config) {
        eprintln!("Warning: {e}");
    }

    if let Err(e) = commands::dispatch(cli) {
        eprintln!("Error: {e}");
        std::process::exit(e.exit_code());
    }
}
