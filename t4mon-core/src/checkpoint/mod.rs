//! On-disk checkpoints of a consolidated run
//!
//! Each run writes, under the store folder:
//!
//! - `data_<tag>.snapshot.gz`: gzip'd JSON of the whole
//!   [`ConsolidatedDataset`], metadata and logs included, floats exact
//! - `data_<tag>.csv`: the table as text, `datetime` and `system` first
//! - `logs_<system>_<tag>.txt`: one file per system
//!
//! `<tag>` is the run time as `YYYYMMDD_HHMM`.

mod text;

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ingest::IngestError;
use crate::orchestrator::{ConsolidatedDataset, ConsolidationError};
use crate::tracing::span_names;

pub use text::{DATETIME_COLUMN, SYSTEM_COLUMN, load_csv, parse_text_checkpoint, to_csv};

/// Version written into new snapshots
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Layout of the run tag
pub const RUN_TAG_FORMAT: &str = "%Y%m%d_%H%M";

/// Errors raised while writing or reading checkpoints
#[derive(Debug, Error)]
pub enum CheckpointError {
    /// File system failure
    #[error("I/O error on {path}: {source}")]
    Io {
        /// File or folder involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Snapshot could not be encoded or decoded
    #[error("Invalid snapshot {path}: {reason}")]
    Snapshot {
        /// Snapshot file
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Snapshot written by an unknown version
    #[error("Snapshot {path} has format version {found}, expected {SNAPSHOT_FORMAT_VERSION}")]
    UnsupportedVersion {
        /// Snapshot file
        path: PathBuf,
        /// Version found in the file
        found: u32,
    },

    /// Text checkpoint is malformed
    #[error("Invalid text checkpoint: {0}")]
    Text(String),

    /// Raw export could not be ingested
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// Reloaded parts do not fit together
    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),
}

impl CheckpointError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type for checkpoint operations
pub type CheckpointResult<T> = Result<T, CheckpointError>;

/// `YYYYMMDD_HHMM` tag for a run time
#[must_use]
pub fn run_tag(run_at: NaiveDateTime) -> String {
    run_at.format(RUN_TAG_FORMAT).to_string()
}

/// Log entry for systems rendered from a local checkpoint
#[must_use]
pub fn local_log_sentinel(tag: &str, system: &str) -> String {
    format!("Log collection omitted for locally generated reports at {tag} for {system}")
}

/// Gives every system without a stored log the local-rendering sentinel
///
/// Covers the systems found in `consolidated` plus `configured`. Returns
/// how many entries were added.
pub fn fill_local_logs<'a, I>(consolidated: &mut ConsolidatedDataset, tag: &str, configured: I) -> usize
where
    I: IntoIterator<Item = &'a str>,
{
    let mut missing: Vec<String> = consolidated
        .system_ids()
        .map(str::to_string)
        .chain(configured.into_iter().map(str::to_string))
        .filter(|s| consolidated.log(s.as_str()).is_none_or(str::is_empty))
        .collect();
    missing.sort();
    missing.dedup();
    for system in &missing {
        consolidated.set_log(system.clone(), local_log_sentinel(tag, system));
    }
    missing.len()
}

/// Everything persisted for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Layout version
    pub format_version: u32,
    /// When the run started
    pub run_date: NaiveDateTime,
    /// `YYYYMMDD_HHMM` form of `run_date`
    pub run_tag: String,
    /// The consolidated data
    pub consolidated: ConsolidatedDataset,
}

impl Snapshot {
    /// Snapshot of `consolidated` for a run at `run_date`
    #[must_use]
    pub fn new(run_date: NaiveDateTime, consolidated: ConsolidatedDataset) -> Self {
        Self {
            format_version: SNAPSHOT_FORMAT_VERSION,
            run_date,
            run_tag: run_tag(run_date),
            consolidated,
        }
    }
}

/// Files written by [`write_checkpoint`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointFiles {
    /// Compressed snapshot
    pub snapshot: PathBuf,
    /// Text form
    pub csv: PathBuf,
    /// Per-system log files
    pub logs: Vec<PathBuf>,
}

/// Writes the snapshot, text and log files into `store`
///
/// The folder is created if needed. With `write_logs` unset, no log files
/// are written.
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] or [`CheckpointError::Snapshot`].
pub fn write_checkpoint(
    store: &Path,
    snapshot: &Snapshot,
    write_logs: bool,
) -> CheckpointResult<CheckpointFiles> {
    let _span = tracing::info_span!(span_names::CHECKPOINT_WRITE, folder = %store.display()).entered();
    std::fs::create_dir_all(store).map_err(|e| CheckpointError::io(store, e))?;
    let tag = &snapshot.run_tag;

    let snapshot_path = store.join(format!("data_{tag}.snapshot.gz"));
    write_snapshot(&snapshot_path, snapshot)?;
    tracing::info!(file = %snapshot_path.display(), "Snapshot written");

    let csv_path = store.join(format!("data_{tag}.csv"));
    std::fs::write(&csv_path, to_csv(&snapshot.consolidated))
        .map_err(|e| CheckpointError::io(&csv_path, e))?;
    tracing::info!(file = %csv_path.display(), "Text checkpoint written");

    let mut logs = Vec::new();
    if write_logs {
        for (system, log) in snapshot.consolidated.logs() {
            let path = store.join(format!("logs_{system}_{tag}.txt"));
            std::fs::write(&path, log).map_err(|e| CheckpointError::io(&path, e))?;
            logs.push(path);
        }
    }

    Ok(CheckpointFiles {
        snapshot: snapshot_path,
        csv: csv_path,
        logs,
    })
}

/// Writes a gzip'd JSON snapshot to `path`
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] or [`CheckpointError::Snapshot`].
pub fn write_snapshot(path: &Path, snapshot: &Snapshot) -> CheckpointResult<()> {
    let file = File::create(path).map_err(|e| CheckpointError::io(path, e))?;
    let mut encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    serde_json::to_writer(&mut encoder, snapshot).map_err(|e| CheckpointError::Snapshot {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let mut writer = encoder.finish().map_err(|e| CheckpointError::io(path, e))?;
    writer.flush().map_err(|e| CheckpointError::io(path, e))
}

/// Reads a snapshot written by [`write_snapshot`]
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] if the file cannot be opened,
/// [`CheckpointError::Snapshot`] if it does not decode and
/// [`CheckpointError::UnsupportedVersion`] for a newer layout.
pub fn read_snapshot(path: &Path) -> CheckpointResult<Snapshot> {
    let _span = tracing::info_span!(span_names::CHECKPOINT_LOAD, file = %path.display()).entered();
    let file = File::open(path).map_err(|e| CheckpointError::io(path, e))?;
    let snapshot: Snapshot = serde_json::from_reader(BufReader::new(GzDecoder::new(file)))
        .map_err(|e| CheckpointError::Snapshot {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if snapshot.format_version != SNAPSHOT_FORMAT_VERSION {
        return Err(CheckpointError::UnsupportedVersion {
            path: path.to_path_buf(),
            found: snapshot.format_version,
        });
    }
    tracing::debug!(rows = snapshot.consolidated.len(), "Snapshot loaded");
    Ok(snapshot)
}
