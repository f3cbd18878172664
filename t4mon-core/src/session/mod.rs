//! Remote sessions over a system's tunnel
//!
//! A session is acquired from a [`SessionConnector`] for one system and one
//! local tunnel port, and released when dropped, on every exit path. File
//! access and command execution share the session's connection.

mod listing;
mod sftp;

use chrono::NaiveDate;
use thiserror::Error;

use crate::models::MonitoredSystem;
use crate::ssh::SshError;

pub use listing::{parse_long_listing, quote_sftp_path};
pub use sftp::{SftpConnector, SftpSession};

/// Errors raised by remote sessions
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// The session could not be opened
    #[error("Cannot open session to {system}: {reason}")]
    Connect {
        /// System id
        system: String,
        /// Underlying failure
        reason: String,
    },

    /// The system rejected its credentials
    #[error("Authentication to {system} failed: {reason}")]
    Auth {
        /// System id
        system: String,
        /// ssh diagnostics
        reason: String,
    },

    /// A listing or transfer failed
    #[error("Remote {operation} failed: {reason}")]
    Io {
        /// `list`, `fetch`, ...
        operation: &'static str,
        /// Underlying failure
        reason: String,
    },
}

impl SessionError {
    /// Wraps an ssh failure raised while opening a session
    #[must_use]
    pub fn from_connect(system: &str, err: SshError) -> Self {
        match err {
            SshError::Auth { detail, .. } => Self::Auth {
                system: system.to_string(),
                reason: detail,
            },
            other => Self::Connect {
                system: system.to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// A file in a remote listing
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RemoteFile {
    /// Base name
    pub name: String,
    /// Modification date, when the listing shows one
    pub modified: Option<NaiveDate>,
    /// Size in bytes
    pub size: u64,
}

/// File and command access to one system
pub trait RemoteSession {
    /// Files in `dir` whose names end with one of `extensions`
    ///
    /// A directory that does not exist yields an empty list.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the listing itself fails.
    fn list_files(&self, dir: &str, extensions: &[String]) -> SessionResult<Vec<RemoteFile>>;

    /// Contents of the remote file at `path`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Io`] when the transfer fails.
    fn fetch(&self, path: &str) -> SessionResult<Vec<u8>>;

    /// Output of `command`, or `None` if it could not be run
    fn run_command(&self, command: &str) -> Option<String>;
}

/// Opens sessions; shared by all workers of a run
pub trait SessionConnector: Sync {
    /// Session type produced
    type Session: RemoteSession;

    /// Opens a session to `system` through the tunnel on `local_port`
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Connect`] or [`SessionError::Auth`].
    fn connect(&self, system: &MonitoredSystem, local_port: u16) -> SessionResult<Self::Session>;
}

/// Returns true if `name` ends with one of `extensions`, ignoring case
///
/// An empty filter list accepts every name.
#[must_use]
pub fn has_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_lowercase();
    extensions.is_empty() || extensions.iter().any(|e| lower.ends_with(&e.to_lowercase()))
}
