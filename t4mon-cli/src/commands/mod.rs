//! Command handler modules for the CLI.

mod collect;
mod config;
mod local;

use crate::cli::{Cli, CollectArgs, Commands};
use crate::error::CliError;
use crate::util::{confirm_defaults, is_interactive};

/// Dispatch a CLI command to the appropriate handler.
pub fn dispatch(cli: Cli) -> Result<(), CliError> {
    let cli_flags = GlobalFlags::from(&cli);
    let settings = cli.settings.as_path();
    match cli.command {
        Some(Commands::Collect(args)) => collect::cmd_collect(settings, args),
        Some(Commands::Local { snapshot }) => local::cmd_local(settings, &snapshot),
        Some(Commands::Localcsv { csv, system }) => {
            local::cmd_localcsv(settings, &csv, system.as_deref())
        }
        Some(Commands::Config) => config::cmd_config(settings),
        None => {
            if prompts_for_defaults(&cli_flags, is_interactive()) && !confirm_defaults(settings)? {
                println!("Nothing done.");
                return Ok(());
            }
            collect::cmd_collect(settings, CollectArgs::default())
        }
    }
}

/// Global options that show the user chose how to run
#[derive(Debug, Clone, Copy, Default)]
struct GlobalFlags {
    quiet: bool,
    verbose: bool,
    logging: bool,
}

impl From<&Cli> for GlobalFlags {
    fn from(cli: &Cli) -> Self {
        Self {
            quiet: cli.quiet,
            verbose: cli.verbose > 0,
            logging: cli.loglevel.is_some() || cli.logfile.is_some(),
        }
    }
}

/// Confirmation is only asked on a terminal and when no global flag was given
fn prompts_for_defaults(flags: &GlobalFlags, interactive: bool) -> bool {
    interactive && !(flags.quiet || flags.verbose || flags.logging)
}
