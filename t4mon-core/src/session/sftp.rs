//! Sessions over an ssh control master to the local end of a tunnel

use std::time::Duration;

use chrono::NaiveDate;
use tokio::runtime::Handle;

use super::{
    RemoteFile, RemoteSession, SessionConnector, SessionError, SessionResult, has_extension,
    parse_long_listing, quote_sftp_path,
};
use crate::models::MonitoredSystem;
use crate::ssh::{ControlMaster, SshTarget};
use crate::tunnel::TUNNEL_BIND_ADDR;

/// sftp messages meaning the listed directory does not exist
const MISSING_DIR_MARKERS: [&str; 3] = ["not found", "No such file", "Can't ls"];

/// Opens [`SftpSession`]s; one connector serves every worker of a run
#[derive(Debug, Clone)]
pub struct SftpConnector {
    runtime: Handle,
    reference_date: NaiveDate,
}

impl SftpConnector {
    /// Connector driving its ssh processes on `runtime`
    ///
    /// `reference_date` completes listing entries that carry no year,
    /// normally the date of the run.
    #[must_use]
    pub fn new(runtime: Handle, reference_date: NaiveDate) -> Self {
        Self {
            runtime,
            reference_date,
        }
    }

    /// Date used to complete year-less listing entries
    #[must_use]
    pub fn reference_date(&self) -> NaiveDate {
        self.reference_date
    }
}

impl SessionConnector for SftpConnector {
    type Session = SftpSession;

    fn connect(&self, system: &MonitoredSystem, local_port: u16) -> SessionResult<SftpSession> {
        let target = SshTarget::new(
            TUNNEL_BIND_ADDR.to_string(),
            local_port,
            system.credentials.clone(),
        );
        let master = self
            .runtime
            .block_on(ControlMaster::connect(target, system.ssh_timeout))
            .map_err(|e| SessionError::from_connect(&system.id, e))?;
        tracing::debug!(system = %system.id, port = local_port, "Session opened");
        Ok(SftpSession {
            runtime: self.runtime.clone(),
            system_id: system.id.clone(),
            master: Some(master),
            timeout: system.ssh_timeout,
            reference_date: self.reference_date,
        })
    }
}

/// File listing, download and command execution for one system
///
/// Transfers get a generous multiple of the connect timeout since statistics
/// files can be large.
#[derive(Debug)]
pub struct SftpSession {
    runtime: Handle,
    system_id: String,
    master: Option<ControlMaster>,
    timeout: Duration,
    reference_date: NaiveDate,
}

impl SftpSession {
    fn master(&self) -> SessionResult<&ControlMaster> {
        self.master.as_ref().ok_or_else(|| SessionError::Io {
            operation: "session",
            reason: "session already closed".to_string(),
        })
    }

    fn transfer_timeout(&self) -> Duration {
        self.timeout.saturating_mul(30)
    }
}

impl RemoteSession for SftpSession {
    fn list_files(&self, dir: &str, extensions: &[String]) -> SessionResult<Vec<RemoteFile>> {
        let script = format!("ls -l {}\n", quote_sftp_path(dir));
        let output = self
            .runtime
            .block_on(self.master()?.sftp_batch(&script, self.timeout.saturating_mul(3)))
            .map_err(|e| SessionError::Io {
                operation: "list",
                reason: e.to_string(),
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            if MISSING_DIR_MARKERS
                .iter()
                .any(|m| stderr.contains(m) || stdout.contains(m))
            {
                tracing::warn!(system = %self.system_id, folder = dir, "Remote folder not found");
                return Ok(Vec::new());
            }
            return Err(SessionError::Io {
                operation: "list",
                reason: stderr.trim().to_string(),
            });
        }

        let mut files: Vec<RemoteFile> = parse_long_listing(&stdout, self.reference_date)
            .into_iter()
            .filter(|f| has_extension(&f.name, extensions))
            .collect();
        files.sort();
        Ok(files)
    }

    fn fetch(&self, path: &str) -> SessionResult<Vec<u8>> {
        let io_err = |reason: String| SessionError::Io {
            operation: "fetch",
            reason,
        };
        let scratch = tempfile::Builder::new()
            .prefix("t4mon-fetch-")
            .tempdir()
            .map_err(|e| io_err(e.to_string()))?;
        let local = scratch.path().join("download");
        let script = format!(
            "get {} {}\n",
            quote_sftp_path(path),
            quote_sftp_path(&local.to_string_lossy())
        );

        let output = self
            .runtime
            .block_on(self.master()?.sftp_batch(&script, self.transfer_timeout()))
            .map_err(|e| io_err(e.to_string()))?;
        if !output.status.success() {
            return Err(io_err(format!(
                "{path}: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let bytes = std::fs::read(&local).map_err(|e| io_err(format!("{path}: {e}")))?;
        tracing::debug!(system = %self.system_id, file = path, size = bytes.len(), "Fetched file");
        Ok(bytes)
    }

    fn run_command(&self, command: &str) -> Option<String> {
        let master = self.master().ok()?;
        match self
            .runtime
            .block_on(master.exec(command, self.transfer_timeout()))
        {
            Ok(output) => Some(output),
            Err(e) => {
                tracing::warn!(system = %self.system_id, error = %e, "Remote command failed");
                None
            }
        }
    }
}

impl Drop for SftpSession {
    fn drop(&mut self) {
        let Some(mut master) = self.master.take() else {
            return;
        };
        if Handle::try_current().is_err() {
            self.runtime.block_on(master.shutdown());
        }
        // otherwise the master's own Drop closes the connection
        tracing::debug!(system = %self.system_id, "Session closed");
    }
}
