//! OpenSSH process plumbing
//!
//! Everything remote goes through the system `ssh`/`sftp` binaries (wrapped
//! in `sshpass -e` for password logins). A [`ControlMaster`] holds one
//! authenticated connection open; port forwards, remote commands and sftp
//! batches all ride on its control socket, so authentication happens once
//! per endpoint.

mod master;

use std::process::{Output, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use secrecy::ExposeSecret;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::models::{Credentials, GatewayEndpoint};

pub use master::ControlMaster;

/// Exit status sshpass uses for a rejected password
const SSHPASS_BAD_PASSWORD: i32 = 5;

/// Errors from ssh/sftp processes
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SshError {
    /// The binary could not be started
    #[error("Failed to spawn {program}: {reason}")]
    Spawn {
        /// Program name
        program: &'static str,
        /// OS error
        reason: String,
    },

    /// The operation did not finish in time
    #[error("{operation} timed out after {secs}s")]
    Timeout {
        /// What was being done
        operation: String,
        /// Timeout in seconds
        secs: u64,
    },

    /// The remote end rejected the credentials
    #[error("Authentication to {destination} failed: {detail}")]
    Auth {
        /// `user@host:port`
        destination: String,
        /// ssh diagnostics
        detail: String,
    },

    /// The process ran but reported failure
    #[error("{operation} failed ({status}): {stderr}")]
    Failed {
        /// What was being done
        operation: String,
        /// Exit status
        status: String,
        /// Trimmed stderr
        stderr: String,
    },

    /// Local I/O around the process failed
    #[error("I/O error: {0}")]
    Io(String),
}

/// Result type for ssh operations
pub type SshResult<T> = Result<T, SshError>;

/// An ssh endpoint plus the credentials to log in
#[derive(Debug, Clone)]
pub struct SshTarget {
    /// Hostname or IP
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Login credentials
    pub credentials: Credentials,
}

impl SshTarget {
    /// Creates a target
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16, credentials: Credentials) -> Self {
        Self {
            host: host.into(),
            port,
            credentials,
        }
    }

    /// `user@host`, or just `host` without a username
    #[must_use]
    pub fn destination(&self) -> String {
        match &self.credentials.username {
            Some(user) => format!("{user}@{}", self.host),
            None => self.host.clone(),
        }
    }

    /// `user@host:port` for log and error messages
    #[must_use]
    pub fn display_name(&self) -> String {
        format!("{}:{}", self.destination(), self.port)
    }
}

impl From<&GatewayEndpoint> for SshTarget {
    fn from(gateway: &GatewayEndpoint) -> Self {
        Self::new(gateway.host.clone(), gateway.port, gateway.credentials.clone())
    }
}

/// Returns true if `sshpass` is installed; checked once per process
fn sshpass_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        std::process::Command::new("sshpass")
            .arg("-V")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .is_ok()
    })
}

/// ssh or sftp flavour of the shared option set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Program {
    Ssh,
    Sftp,
}

impl Program {
    const fn name(self) -> &'static str {
        match self {
            Self::Ssh => "ssh",
            Self::Sftp => "sftp",
        }
    }

    const fn port_flag(self) -> &'static str {
        match self {
            Self::Ssh => "-p",
            Self::Sftp => "-P",
        }
    }
}

/// Starts a command for `program` with the options every call shares
///
/// With `authenticate` set, the password (via `sshpass -e`) or identity
/// file of the target is used; otherwise the call relies on an existing
/// control master and runs in batch mode.
pub(crate) fn base_command(
    program: Program,
    target: &SshTarget,
    connect_timeout: Duration,
    authenticate: bool,
) -> Command {
    let password = target
        .credentials
        .password
        .as_ref()
        .filter(|_| authenticate && target.credentials.has_password());

    let mut cmd = match password {
        Some(pw) if sshpass_available() => {
            let mut cmd = Command::new("sshpass");
            cmd.arg("-e").arg(program.name());
            cmd.env("SSHPASS", pw.expose_secret());
            cmd
        }
        other => {
            if other.is_some() {
                tracing::warn!(
                    host = %target.host,
                    "sshpass not found, falling back to key-based authentication"
                );
            }
            let mut cmd = Command::new(program.name());
            cmd.arg("-o").arg("BatchMode=yes");
            cmd
        }
    };

    cmd.arg("-o").arg("StrictHostKeyChecking=no");
    cmd.arg("-o").arg("UserKnownHostsFile=/dev/null");
    cmd.arg("-o").arg("LogLevel=ERROR");
    cmd.arg("-o")
        .arg(format!("ConnectTimeout={}", connect_timeout.as_secs().max(1)));
    cmd.arg(program.port_flag()).arg(target.port.to_string());

    if authenticate && let Some(key) = &target.credentials.identity_file {
        cmd.arg("-i").arg(key);
        cmd.arg("-o").arg("IdentitiesOnly=yes");
    }

    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    cmd
}

/// Runs `cmd` to completion within `timeout`, optionally feeding `stdin`
///
/// The child is killed if the timeout elapses.
pub(crate) async fn run_with_timeout(
    mut cmd: Command,
    program: Program,
    operation: &str,
    stdin: Option<&str>,
    timeout: Duration,
) -> SshResult<Output> {
    tracing::trace!(operation, command = ?cmd.as_std(), "Running ssh command");
    if stdin.is_some() {
        cmd.stdin(Stdio::piped());
    }
    let mut child = cmd.spawn().map_err(|e| SshError::Spawn {
        program: program.name(),
        reason: e.to_string(),
    })?;

    let run = async {
        if let (Some(script), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(script.as_bytes())
                .await
                .map_err(|e| SshError::Io(e.to_string()))?;
            drop(pipe);
        }
        child
            .wait_with_output()
            .await
            .map_err(|e| SshError::Io(e.to_string()))
    };

    match tokio::time::timeout(timeout, run).await {
        Ok(result) => result,
        Err(_) => Err(SshError::Timeout {
            operation: operation.to_string(),
            secs: timeout.as_secs(),
        }),
    }
}

/// Turns a finished process into `Ok(stdout)` or a classified error
pub(crate) fn check_output(output: Output, operation: &str, target: &SshTarget) -> SshResult<String> {
    if output.status.success() {
        return Ok(String::from_utf8_lossy(&output.stdout).into_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if is_auth_failure(output.status.code(), &stderr) {
        return Err(SshError::Auth {
            destination: target.display_name(),
            detail: stderr,
        });
    }
    Err(SshError::Failed {
        operation: operation.to_string(),
        status: output.status.to_string(),
        stderr,
    })
}

/// Recognises rejected credentials in ssh/sshpass output
fn is_auth_failure(code: Option<i32>, stderr: &str) -> bool {
    code == Some(SSHPASS_BAD_PASSWORD)
        || stderr.contains("Permission denied")
        || stderr.contains("Authentication failed")
        || stderr.contains("Too many authentication failures")
}
