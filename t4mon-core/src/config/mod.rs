//! Settings file loading
//!
//! The settings file is TOML with a `[defaults]` table inherited by every
//! `[systems.<ID>]` table, plus `[gateway]` and `[misc]`. Everything is
//! resolved and validated up front so a bad file fails the run before any
//! ssh process is spawned.

mod settings;

use std::path::PathBuf;

use thiserror::Error;

pub use settings::{
    DEFAULT_REPORTS_FOLDER, DEFAULT_SETTINGS_FILE, DEFAULT_SSH_TIMEOUT_SECS,
    DEFAULT_STORE_FOLDER, MiscSettings, Settings,
};

/// Errors raised while loading or validating settings
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file does not exist
    #[error("Settings file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The settings file exists but could not be read
    #[error("Failed to read settings file {}: {source}", .path.display())]
    Read {
        /// Settings file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The settings file is not valid TOML or has unexpected keys
    #[error("Failed to parse settings: {0}")]
    Parse(String),

    /// No `[systems.*]` table is present
    #[error("No monitored systems configured")]
    NoSystems,

    /// A key required for a section is missing after defaults are applied
    #[error("Missing required key '{key}' in section [{section}]")]
    MissingKey {
        /// Section name, e.g. `systems.SYS1`
        section: String,
        /// Missing key
        key: &'static str,
    },

    /// A key has an unusable value
    #[error("Invalid value for '{key}' in section [{section}]: {reason}")]
    InvalidValue {
        /// Section name
        section: String,
        /// Offending key
        key: &'static str,
        /// What is wrong with it
        reason: String,
    },

    /// Two systems request the same fixed tunnel port
    #[error("Tunnel port {port} is assigned to both {first} and {second}")]
    DuplicateTunnelPort {
        /// Shared port
        port: u16,
        /// First system using it
        first: String,
        /// Second system using it
        second: String,
    },

    /// A configured auxiliary file is absent
    #[error("{kind} not found: {}", .path.display())]
    MissingFile {
        /// What the file is for
        kind: &'static str,
        /// Resolved path
        path: PathBuf,
    },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;
