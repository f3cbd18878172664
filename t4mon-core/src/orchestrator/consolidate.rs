//! Deterministic merge of per-system results

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dataset::{Dataset, DatasetError, Metadata};
use crate::models::CollectionResult;
use crate::tracing::span_names;

/// Merge failures; both mean a configuration or programming error
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsolidationError {
    /// Two results claim the same system id
    #[error("System '{0}' was collected twice")]
    DuplicateSystem(String),

    /// Column kinds disagree between systems
    #[error("Cannot merge system data: {0}")]
    IncompatibleColumn(#[source] DatasetError),

    /// Row tags do not match the table
    #[error("{tags} system tags for {rows} rows")]
    TagMismatch {
        /// Number of tags
        tags: usize,
        /// Number of rows
        rows: usize,
    },
}

/// All systems of one run in a single table
///
/// Rows are grouped by system id in lexical order; each row carries its
/// system tag. Every system of the run has a log entry, including systems
/// that produced no rows, and keeps its own metadata record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedDataset {
    table: Dataset,
    systems: Vec<String>,
    logs: BTreeMap<String, String>,
    metadata: BTreeMap<String, Metadata>,
}

impl ConsolidatedDataset {
    /// Assembles a consolidated dataset from its parts
    ///
    /// # Errors
    ///
    /// Returns [`ConsolidationError::TagMismatch`] unless there is exactly
    /// one system tag per row.
    pub fn from_parts(
        table: Dataset,
        systems: Vec<String>,
        logs: BTreeMap<String, String>,
        metadata: BTreeMap<String, Metadata>,
    ) -> Result<Self, ConsolidationError> {
        if systems.len() != table.len() {
            return Err(ConsolidationError::TagMismatch {
                tags: systems.len(),
                rows: table.len(),
            });
        }
        Ok(Self {
            table,
            systems,
            logs,
            metadata,
        })
    }

    /// The merged table; its metadata describes the whole run
    #[must_use]
    pub fn table(&self) -> &Dataset {
        &self.table
    }

    /// System tag of every row
    #[must_use]
    pub fn row_systems(&self) -> &[String] {
        &self.systems
    }

    /// System id to log text
    #[must_use]
    pub fn logs(&self) -> &BTreeMap<String, String> {
        &self.logs
    }

    /// Log text of one system
    #[must_use]
    pub fn log(&self, system: &str) -> Option<&str> {
        self.logs.get(system).map(String::as_str)
    }

    /// Sets the log text of a system
    pub fn set_log(&mut self, system: impl Into<String>, log: impl Into<String>) {
        self.logs.insert(system.into(), log.into());
    }

    /// Every system of the run, sorted
    pub fn system_ids(&self) -> impl Iterator<Item = &str> {
        let mut ids: Vec<&str> = self
            .logs
            .keys()
            .chain(self.metadata.keys())
            .chain(self.systems.iter())
            .map(String::as_str)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids.into_iter()
    }

    /// Metadata record of one system
    #[must_use]
    pub fn metadata_for(&self, system: &str) -> Option<&Metadata> {
        self.metadata.get(system)
    }

    /// Total number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns true if no system contributed rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Rows of one system, with that system's metadata
    ///
    /// Columns that only other systems fill remain, holding missing values.
    #[must_use]
    pub fn for_system(&self, system: &str) -> Dataset {
        let metadata = self
            .metadata
            .get(system)
            .cloned()
            .unwrap_or_else(|| Metadata::for_system(system));
        self.table
            .filter_rows(|row, _| self.systems[row] == system)
            .with_metadata(metadata)
    }

    /// Wildcard column selection restricted to one system
    ///
    /// Columns that hold no value for the system are left out.
    #[must_use]
    pub fn select_for_system<S: AsRef<str>>(&self, system: &str, patterns: &[S]) -> Dataset {
        self.for_system(system).select(patterns)
    }
}

/// Merges results in lexical system order
///
/// The outcome does not depend on the order of `results`.
///
/// # Errors
///
/// Returns [`ConsolidationError::DuplicateSystem`] if a system id appears
/// twice and [`ConsolidationError::IncompatibleColumn`] if a column is
/// numeric for one system and text for another.
pub fn consolidate(mut results: Vec<CollectionResult>) -> Result<ConsolidatedDataset, ConsolidationError> {
    let _span = tracing::info_span!(span_names::CONSOLIDATE, systems = results.len()).entered();
    results.sort_by(|a, b| a.system_id.cmp(&b.system_id));
    if let Some(pair) = results.windows(2).find(|w| w[0].system_id == w[1].system_id) {
        return Err(ConsolidationError::DuplicateSystem(pair[0].system_id.clone()));
    }

    let mut systems = Vec::new();
    let mut logs = BTreeMap::new();
    let mut metadata = BTreeMap::new();
    let mut parts = Vec::with_capacity(results.len());
    for result in results {
        let CollectionResult {
            system_id,
            dataset,
            log,
        } = result;
        systems.extend(std::iter::repeat_n(system_id.clone(), dataset.len()));
        metadata.insert(system_id.clone(), dataset.metadata().clone());
        logs.insert(system_id, log);
        parts.push(dataset);
    }

    let mut table = Dataset::concat(parts).map_err(ConsolidationError::IncompatibleColumn)?;
    // The merged record describes the run, not one system
    table.metadata_mut().system = None;
    tracing::info!(shape = ?table.shape(), "Results consolidated");

    ConsolidatedDataset::from_parts(table, systems, logs, metadata)
}
