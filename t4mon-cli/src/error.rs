//! CLI error types and exit codes.

use t4mon_core::checkpoint::CheckpointError;
use t4mon_core::config::ConfigError;
use t4mon_core::error::T4monError;
use t4mon_core::report::ReportError;

/// Exit codes for CLI operations
pub mod exit_codes {
    /// General error - configuration, data, or other non-connection errors
    pub const GENERAL_ERROR: i32 = 1;
    /// Connection failure - the gateway or no system could be reached
    pub const CONNECTION_FAILURE: i32 = 2;
}

/// CLI error type
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Gateway or session failure
    #[error("Connection error: {0}")]
    Connection(String),

    /// Checkpoint or dataset failure
    #[error("Data error: {0}")]
    Data(String),

    /// Report rendering failure
    #[error("Report error: {0}")]
    Report(String),

    /// Interactive prompt failure
    #[error("Prompt error: {0}")]
    Prompt(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<T4monError> for CliError {
    fn from(err: T4monError) -> Self {
        if err.is_connection_failure() {
            return Self::Connection(err.to_string());
        }
        match err {
            T4monError::Config(_) | T4monError::Calculation(_) | T4monError::Tracing(_) => {
                Self::Config(err.to_string())
            }
            T4monError::Report(_) => Self::Report(err.to_string()),
            _ => Self::Data(err.to_string()),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        T4monError::from(err).into()
    }
}

impl From<CheckpointError> for CliError {
    fn from(err: CheckpointError) -> Self {
        T4monError::from(err).into()
    }
}

impl From<ReportError> for CliError {
    fn from(err: ReportError) -> Self {
        T4monError::from(err).into()
    }
}

impl CliError {
    /// Returns the appropriate exit code for this error type.
    ///
    /// Exit codes:
    /// - 0: Success (not an error)
    /// - 1: General error (configuration, data, report, IO)
    /// - 2: Connection failure (gateway unreachable or rejected)
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Connection(_) => exit_codes::CONNECTION_FAILURE,
            Self::Config(_) | Self::Data(_) | Self::Report(_) | Self::Prompt(_) | Self::Io(_) => {
                exit_codes::GENERAL_ERROR
            }
        }
    }
}
