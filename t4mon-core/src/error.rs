//! Crate-wide error type
//!
//! Each component has its own error enum; [`T4monError`] wraps them all so
//! callers can use `?` across component boundaries.

use thiserror::Error;

use crate::calculations::CalculationError;
use crate::checkpoint::CheckpointError;
use crate::config::ConfigError;
use crate::dataset::DatasetError;
use crate::ingest::IngestError;
use crate::orchestrator::ConsolidationError;
use crate::report::ReportError;
use crate::session::SessionError;
use crate::ssh::SshError;
use crate::tracing::TracingError;
use crate::tunnel::PoolError;

/// Any error raised by t4mon
#[derive(Debug, Error)]
pub enum T4monError {
    /// Settings could not be loaded or are invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The gateway or the tunnel pool failed
    #[error(transparent)]
    Pool(#[from] PoolError),

    /// A remote session failed
    #[error(transparent)]
    Session(#[from] SessionError),

    /// An ssh process failed
    #[error(transparent)]
    Ssh(#[from] SshError),

    /// An export could not be ingested
    #[error(transparent)]
    Ingest(#[from] IngestError),

    /// A dataset operation failed
    #[error(transparent)]
    Dataset(#[from] DatasetError),

    /// Per-system results could not be merged
    #[error(transparent)]
    Consolidation(#[from] ConsolidationError),

    /// A checkpoint could not be written or read
    #[error(transparent)]
    Checkpoint(#[from] CheckpointError),

    /// The calculations file is invalid
    #[error(transparent)]
    Calculation(#[from] CalculationError),

    /// A report could not be rendered
    #[error(transparent)]
    Report(#[from] ReportError),

    /// Logging could not be set up
    #[error(transparent)]
    Tracing(#[from] TracingError),
}

impl T4monError {
    /// Returns true for failures to reach the gateway or a system
    #[must_use]
    pub const fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Pool(_) | Self::Session(_) | Self::Ssh(_))
    }
}

/// Result type using [`T4monError`]
pub type T4monResult<T> = Result<T, T4monError>;
