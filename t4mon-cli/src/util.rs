//! Shared utility functions used across command modules.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use t4mon_core::config::{DEFAULT_REPORTS_FOLDER, Settings};
use t4mon_core::orchestrator::ConsolidatedDataset;
use t4mon_core::report::{ReportContext, SummaryRenderer, render_all};

use crate::error::CliError;

/// Loads and validates the settings file
pub fn load_settings(path: &Path) -> Result<Settings, CliError> {
    Ok(Settings::load(path)?)
}

/// Settings for local rendering, which works without a settings file
pub fn load_optional_settings(path: &Path) -> Result<Option<Settings>, CliError> {
    if path.exists() {
        load_settings(path).map(Some)
    } else {
        tracing::info!(file = %path.display(), "No settings file, using defaults");
        Ok(None)
    }
}

/// Folder receiving the reports
pub fn reports_folder(settings: Option<&Settings>) -> PathBuf {
    settings.map_or_else(
        || PathBuf::from(DEFAULT_REPORTS_FOLDER),
        |s| s.misc.reports_folder.clone(),
    )
}

/// Creates the runtime driving the ssh and sftp processes
pub fn build_runtime() -> Result<tokio::runtime::Runtime, CliError> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("t4mon-io")
        .build()
        .map_err(|e| CliError::Config(format!("Failed to create async runtime: {e}")))
}

/// Returns true when both stdin and stdout are terminals
pub fn is_interactive() -> bool {
    std::io::stdin().is_terminal() && std::io::stdout().is_terminal()
}

/// Asks whether to go on with the default settings
pub fn confirm_defaults(settings: &Path) -> Result<bool, CliError> {
    dialoguer::Confirm::new()
        .with_prompt(format!(
            "No command given. Collect with the settings in {}?",
            settings.display()
        ))
        .default(false)
        .interact()
        .map_err(|e| CliError::Prompt(e.to_string()))
}

/// Renders one summary report per system and prints where they went
pub fn render_reports(
    consolidated: &ConsolidatedDataset,
    run_date: NaiveDateTime,
    output_dir: &Path,
) -> Result<Vec<PathBuf>, CliError> {
    let ctx = ReportContext::new(consolidated, run_date, output_dir);
    let written = render_all(&SummaryRenderer, &ctx)?;
    println!("{} report(s) written to {}", written.len(), output_dir.display());
    Ok(written)
}

/// Prints rows and log state per system
pub fn print_run_summary(consolidated: &ConsolidatedDataset) {
    println!("{:<16} {:>8}  LOGS", "SYSTEM", "ROWS");
    for system in consolidated.system_ids() {
        let rows = consolidated.for_system(system).len();
        let logs = match consolidated.log(system) {
            Some(log) if log.starts_with(t4mon_core::models::LOG_OMITTED_PREFIX) => log,
            Some(_) => "collected",
            None => "-",
        };
        println!("{system:<16} {rows:>8}  {logs}");
    }
}
