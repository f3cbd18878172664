//! Rendering from checkpoints, without touching the network.

use std::path::Path;

use t4mon_core::checkpoint::{fill_local_logs, load_csv, read_snapshot, run_tag};

use crate::error::CliError;
use crate::util::{load_optional_settings, print_run_summary, render_reports, reports_folder};

/// Local command handler: renders from a snapshot
///
/// Logs stored in the snapshot are kept; systems configured but absent
/// from it get the local-rendering placeholder.
pub fn cmd_local(settings_path: &Path, snapshot: &Path) -> Result<(), CliError> {
    let settings = load_optional_settings(settings_path)?;
    let snapshot = read_snapshot(snapshot)?;
    let run_date = snapshot.run_date;
    let mut consolidated = snapshot.consolidated;

    let configured: Vec<&str> = settings.iter().flat_map(|s| s.system_ids()).collect();
    fill_local_logs(&mut consolidated, &snapshot.run_tag, configured);

    print_run_summary(&consolidated);
    render_reports(&consolidated, run_date, &reports_folder(settings.as_ref()))?;
    Ok(())
}

/// Localcsv command handler: renders from a text checkpoint or raw export
pub fn cmd_localcsv(settings_path: &Path, csv: &Path, system: Option<&str>) -> Result<(), CliError> {
    let settings = load_optional_settings(settings_path)?;
    let mut consolidated = load_csv(csv, system)?;
    if consolidated.is_empty() {
        return Err(CliError::Data(format!("{} holds no rows", csv.display())));
    }

    let run_date = chrono::Local::now().naive_local();
    let tag = run_tag(run_date);
    let configured: Vec<&str> = settings.iter().flat_map(|s| s.system_ids()).collect();
    fill_local_logs(&mut consolidated, &tag, configured);

    print_run_summary(&consolidated);
    render_reports(&consolidated, run_date, &reports_folder(settings.as_ref()))?;
    Ok(())
}
