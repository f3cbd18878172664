//! Per-system collection output

use crate::dataset::{Dataset, Metadata};

/// Prefix of every log entry that stands in for logs that were not collected
pub const LOG_OMITTED_PREFIX: &str = "Log collection omitted";

/// Log entry used when the log command ran but printed nothing
pub const MISSING_LOGS: &str = "Missing logs!";

/// What one system contributed to a run
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionResult {
    /// System identifier
    pub system_id: String,
    /// Rows collected for the system, possibly empty
    pub dataset: Dataset,
    /// Remote log text or an omission sentinel
    pub log: String,
}

impl CollectionResult {
    /// Creates a result
    #[must_use]
    pub fn new(system_id: impl Into<String>, dataset: Dataset, log: impl Into<String>) -> Self {
        Self {
            system_id: system_id.into(),
            dataset,
            log: log.into(),
        }
    }

    /// Placeholder for a system that produced nothing
    ///
    /// The dataset is empty but tagged with the system id, and the log is
    /// `"Log collection omitted: <reason>"`.
    #[must_use]
    pub fn omitted(system_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        let system_id = system_id.into();
        Self {
            dataset: Dataset::empty(Metadata::for_system(system_id.clone())),
            log: omitted_log(reason),
            system_id,
        }
    }

    /// Returns true if the log is an omission sentinel
    #[must_use]
    pub fn log_omitted(&self) -> bool {
        self.log.starts_with(LOG_OMITTED_PREFIX)
    }
}

/// Formats an omission sentinel
#[must_use]
pub fn omitted_log(reason: impl std::fmt::Display) -> String {
    format!("{LOG_OMITTED_PREFIX}: {reason}")
}
