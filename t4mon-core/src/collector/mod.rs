//! Per-system collection
//!
//! Lists the system's statistics folder, fetches and ingests the matching
//! exports and runs the log command, all through one open session. Absence
//! of data is never an error here: a listing failure, a file that cannot be
//! fetched or parsed, or a failing log command each degrade the result
//! instead of aborting it.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveDateTime};

use crate::calculations::Calculations;
use crate::dataset::{Dataset, Metadata};
use crate::ingest::{T4CsvParser, extract_csv_members};
use crate::models::{CollectionResult, MISSING_LOGS, MonitoredSystem, omitted_log};
use crate::session::{RemoteFile, RemoteSession};

/// Extension of zipped exports
const ARCHIVE_EXTENSION: &str = ".zip";

/// Locale-independent `DDmonYYYY` tag, e.g. `05jun2015`
#[must_use]
pub fn date_tag(date: NaiveDate) -> String {
    date.format("%d%b%Y").to_string().to_lowercase()
}

/// Joins a remote folder and a file name
#[must_use]
pub fn remote_path(folder: &str, name: &str) -> String {
    match folder.trim_end_matches('/') {
        "" if folder.starts_with('/') => format!("/{name}"),
        "" | "." => name.to_string(),
        dir => format!("{dir}/{name}"),
    }
}

/// Run-wide collection settings
#[derive(Debug, Clone)]
pub struct CollectOptions {
    /// Logical date of the run; files of this day are collected
    pub date: NaiveDate,
    /// Collect every matching file regardless of its date
    pub all_history: bool,
    /// Run the log command on each system
    pub collect_logs: bool,
    /// Stamped on every per-system dataset
    pub generated_at: NaiveDateTime,
    /// Settings file of the run, recorded in metadata
    pub settings_path: Option<PathBuf>,
}

impl CollectOptions {
    /// Options for a run at `run_at`: today's files, with logs
    #[must_use]
    pub fn new(run_at: NaiveDateTime) -> Self {
        Self {
            date: run_at.date(),
            all_history: false,
            collect_logs: true,
            generated_at: run_at,
            settings_path: None,
        }
    }
}

/// Collects one system at a time; shared read-only by all workers
#[derive(Debug, Clone, Copy)]
pub struct Collector<'a> {
    options: &'a CollectOptions,
    default_log_command: &'a str,
    calculations: Option<&'a Calculations>,
}

impl<'a> Collector<'a> {
    /// Creates a collector; `default_log_command` applies to systems
    /// without their own
    #[must_use]
    pub fn new(options: &'a CollectOptions, default_log_command: &'a str) -> Self {
        Self {
            options,
            default_log_command,
            calculations: None,
        }
    }

    /// Derived metrics applied to every collected dataset
    #[must_use]
    pub fn with_calculations(mut self, calculations: Option<&'a Calculations>) -> Self {
        self.calculations = calculations;
        self
    }

    /// Keeps the files to collect, sorted by name
    ///
    /// Unless every day is collected, a file belongs to the run when its
    /// name carries the run's date tag or the listing dates it that day.
    #[must_use]
    pub fn select_files(&self, system: &MonitoredSystem, files: Vec<RemoteFile>) -> Vec<RemoteFile> {
        let tag = date_tag(self.options.date);
        let mut selected: Vec<RemoteFile> = files
            .into_iter()
            .filter(|f| system.accepts_file_name(&f.name))
            .filter(|f| {
                self.options.all_history
                    || f.name.to_lowercase().contains(&tag)
                    || f.modified == Some(self.options.date)
            })
            .collect();
        selected.sort_by(|a, b| a.name.cmp(&b.name));
        selected
    }

    /// Fetches and ingests every selected file into one dataset
    ///
    /// The result always carries the system's metadata, even when empty.
    pub fn collect_data<S: RemoteSession>(&self, system: &MonitoredSystem, session: &S) -> Dataset {
        let listing = match session.list_files(&system.folder, &system.extensions) {
            Ok(files) => files,
            Err(e) => {
                tracing::warn!(system = %system.id, error = %e, "Cannot list remote folder");
                Vec::new()
            }
        };
        let files = self.select_files(system, listing);
        tracing::info!(system = %system.id, files = files.len(), "Files selected");

        let mut merged: Option<Dataset> = None;
        for file in &files {
            let path = remote_path(&system.folder, &file.name);
            let bytes = match session.fetch(&path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(system = %system.id, file = %path, error = %e, "Skipping file");
                    continue;
                }
            };
            for part in ingest_file(&system.id, &file.name, &bytes) {
                merge_part(&system.id, &mut merged, part);
            }
        }

        let mut dataset = merged.unwrap_or_default();
        let metadata = dataset.metadata_mut();
        metadata.system = Some(system.id.clone());
        metadata.generated_at = Some(self.options.generated_at);
        metadata.settings_path.clone_from(&self.options.settings_path);

        if dataset.is_empty() {
            tracing::warn!(system = %system.id, "No data was obtained");
        } else {
            tracing::info!(system = %system.id, shape = ?dataset.shape(), "Data collected");
            if let Some(calculations) = self.calculations {
                calculations.apply(&mut dataset);
            }
        }
        dataset
    }

    /// Runs the log command, or explains why it was not run
    pub fn collect_logs<S: RemoteSession>(
        &self,
        system: &MonitoredSystem,
        session: &S,
        dataset: &Dataset,
    ) -> String {
        let command = system
            .log_command
            .as_deref()
            .unwrap_or(self.default_log_command)
            .trim();
        let skip = if !self.options.collect_logs {
            Some("disabled for this run")
        } else if dataset.is_empty() {
            Some("no data collected")
        } else if command.is_empty() {
            Some("no log command configured")
        } else {
            None
        };
        if let Some(reason) = skip {
            tracing::info!(system = %system.id, reason, "Log collection omitted");
            return omitted_log(reason);
        }

        tracing::info!(system = %system.id, command, "Collecting logs");
        match session.run_command(command) {
            Some(output) if output.trim().is_empty() => MISSING_LOGS.to_string(),
            Some(output) => output,
            None => omitted_log("log command failed"),
        }
    }

    /// Data and logs of one system
    pub fn collect<S: RemoteSession>(&self, system: &MonitoredSystem, session: &S) -> CollectionResult {
        let dataset = self.collect_data(system, session);
        let log = self.collect_logs(system, session, &dataset);
        CollectionResult::new(system.id.clone(), dataset, log)
    }
}

/// Ingests one fetched file; archives contribute one dataset per CSV member
fn ingest_file(system: &str, name: &str, bytes: &[u8]) -> Vec<Dataset> {
    let sources: Vec<(String, Vec<u8>)> = if name.to_lowercase().ends_with(ARCHIVE_EXTENSION) {
        match extract_csv_members(name, bytes) {
            Ok(members) => members.into_iter().map(|m| (m.name, m.bytes)).collect(),
            Err(e) => {
                tracing::warn!(system, file = name, error = %e, "Skipping archive");
                return Vec::new();
            }
        }
    } else {
        vec![(name.to_string(), bytes.to_vec())]
    };

    sources
        .into_iter()
        .filter_map(|(source, content)| match T4CsvParser::parse(&content, &source) {
            Ok(ds) => {
                tracing::debug!(system, file = %source, rows = ds.len(), "File ingested");
                Some(ds)
            }
            Err(e) => {
                tracing::warn!(system, file = %source, error = %e, "Skipping unparseable file");
                None
            }
        })
        .collect()
}

/// Appends `part` to the files merged so far
///
/// A part whose columns conflict with the accumulated ones is skipped;
/// what was merged before stays.
fn merge_part(system: &str, merged: &mut Option<Dataset>, part: Dataset) {
    let Some(mut acc) = merged.take() else {
        *merged = Some(part);
        return;
    };
    let source = part.metadata().source_files.join(", ");
    if let Err(e) = acc.append(part) {
        tracing::warn!(system, file = %source, error = %e, "Skipping conflicting file");
    }
    *merged = Some(acc);
}

/// Empty dataset tagged for `system`
#[must_use]
pub fn empty_for(system: &str, options: &CollectOptions) -> Dataset {
    Dataset::empty(Metadata {
        generated_at: Some(options.generated_at),
        settings_path: options.settings_path.clone(),
        ..Metadata::for_system(system)
    })
}
