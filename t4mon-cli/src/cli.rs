//! CLI argument parsing types using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use t4mon_core::config::DEFAULT_SETTINGS_FILE;
use t4mon_core::tracing::TracingLevel;

/// Collects T4 statistics from remote systems through an ssh gateway
#[derive(Parser)]
#[command(name = "t4mon")]
#[command(author, version, about = "T4 statistics collector")]
#[command(propagate_version = true)]
pub struct Cli {
    /// Settings file
    #[arg(short, long, global = true, env = "T4MON_SETTINGS", default_value = DEFAULT_SETTINGS_FILE)]
    pub settings: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", env = "T4MON_LOGLEVEL")]
    pub loglevel: Option<TracingLevel>,

    /// Write log lines to this file instead of stderr
    #[arg(long, global = true, value_name = "PATH")]
    pub logfile: Option<PathBuf>,

    /// Increase output verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only report errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Defaults to `collect` when omitted
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Collect from every configured system
    #[command(about = "Collect data and logs from every configured system")]
    Collect(CollectArgs),

    /// Render reports from a snapshot checkpoint
    #[command(about = "Render reports from a local snapshot (data_*.snapshot.gz)")]
    Local {
        /// Snapshot file
        snapshot: PathBuf,
    },

    /// Render reports from a CSV checkpoint or a raw exporter file
    #[command(about = "Render reports from a local CSV file")]
    Localcsv {
        /// CSV file
        csv: PathBuf,

        /// System the rows belong to, for raw exporter files
        #[arg(long, value_name = "ID")]
        system: Option<String>,
    },

    /// Print the effective settings
    #[command(about = "Show the effective configuration, passwords masked")]
    Config,
}

/// Flags of the `collect` command
#[derive(Args, Debug, Clone, Copy, Default)]
pub struct CollectArgs {
    /// Collect every file, not only today's
    #[arg(long)]
    pub all: bool,

    /// Skip report generation
    #[arg(long)]
    pub noreports: bool,

    /// Skip remote log collection
    #[arg(long)]
    pub nologs: bool,

    /// Collect one system at a time
    #[arg(long)]
    pub safe: bool,
}
