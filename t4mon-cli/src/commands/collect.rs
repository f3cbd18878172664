//! Live collection run.

use std::path::Path;

use t4mon_core::orchestrator::{ExecutionStrategy, Orchestrator, RunOptions};
use t4mon_core::session::SftpConnector;
use t4mon_core::tunnel::SshTunnelPool;

use crate::cli::CollectArgs;
use crate::error::CliError;
use crate::util::{build_runtime, load_settings, print_run_summary, render_reports};

/// Collect command handler
pub fn cmd_collect(settings_path: &Path, args: CollectArgs) -> Result<(), CliError> {
    let settings = load_settings(settings_path)?;
    let options = RunOptions {
        all_history: args.all,
        collect_logs: !args.nologs,
        strategy: if args.safe {
            ExecutionStrategy::Serial
        } else {
            ExecutionStrategy::Parallel
        },
        ..RunOptions::new(chrono::Local::now().naive_local())
    };
    tracing::info!(
        systems = settings.systems.len(),
        strategy = %options.strategy,
        all_history = options.all_history,
        "Starting collection"
    );

    let runtime = build_runtime()?;
    let connector = SftpConnector::new(runtime.handle().clone(), options.run_at.date());
    let mut pool = SshTunnelPool::from_settings(runtime.handle().clone(), &settings);
    let outcome = Orchestrator::new(&settings, options).run(&mut pool, &connector)?;
    drop(pool);

    print_run_summary(&outcome.consolidated);
    match &outcome.checkpoint {
        Some(files) => println!("Checkpoint written to {}", files.snapshot.display()),
        None => println!("No data collected, checkpoint skipped"),
    }

    if args.noreports {
        tracing::info!("Report generation skipped");
    } else {
        render_reports(&outcome.consolidated, outcome.run_at, &settings.misc.reports_folder)?;
    }
    Ok(())
}
