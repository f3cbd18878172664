//! A long-lived `ssh -M` process and the operations multiplexed over it

use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::time::{Duration, Instant};

use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;

use super::{Program, SshError, SshResult, SshTarget, base_command, check_output, run_with_timeout};

/// Delay between readiness checks of a starting master
const POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Extra time granted on top of `ConnectTimeout` for key exchange and login
const LOGIN_GRACE: Duration = Duration::from_secs(5);

/// How long a master gets to exit after `-O exit` before it is killed
const EXIT_GRACE: Duration = Duration::from_secs(2);

/// Bytes of the master's stderr kept for error reporting
const STDERR_TAIL: usize = 4096;

/// One authenticated OpenSSH connection with a private control socket
///
/// The socket lives in a temporary directory removed on drop. Dropping a
/// master that was not shut down asks it to exit and kills the process.
pub struct ControlMaster {
    target: SshTarget,
    // Held for its Drop, which removes the socket directory
    _control_dir: TempDir,
    socket: PathBuf,
    child: Option<Child>,
    // Drains the master's stderr so it never blocks on a full pipe
    stderr_tail: Option<JoinHandle<String>>,
    timeout: Duration,
}

impl std::fmt::Debug for ControlMaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ControlMaster")
            .field("target", &self.target.display_name())
            .field("socket", &self.socket)
            .field("running", &self.child.is_some())
            .finish()
    }
}

impl ControlMaster {
    /// Logs in to `target` and waits until the control socket answers
    ///
    /// # Errors
    ///
    /// Returns [`SshError::Auth`] when the credentials are rejected,
    /// [`SshError::Timeout`] when the socket does not come up in time and
    /// [`SshError::Failed`] for any other early exit of the master.
    pub async fn connect(target: SshTarget, timeout: Duration) -> SshResult<Self> {
        let control_dir = tempfile::Builder::new()
            .prefix("t4mon-ssh-")
            .tempdir()
            .map_err(|e| SshError::Io(e.to_string()))?;
        let socket = control_dir.path().join("ctl");

        let mut cmd = base_command(Program::Ssh, &target, timeout, true);
        cmd.arg("-M")
            .arg("-N")
            .arg("-S")
            .arg(&socket)
            .arg("-o")
            .arg("ControlPersist=no")
            .arg("-o")
            .arg("ServerAliveInterval=30")
            .arg(target.destination());
        cmd.stdout(Stdio::null());

        tracing::debug!(endpoint = %target.display_name(), "Starting control master");
        let mut child = cmd.spawn().map_err(|e| SshError::Spawn {
            program: "ssh",
            reason: e.to_string(),
        })?;
        let stderr_tail = child
            .stderr
            .take()
            .map(|pipe| tokio::spawn(read_tail(pipe, STDERR_TAIL)));

        let mut master = Self {
            target,
            _control_dir: control_dir,
            socket,
            child: Some(child),
            stderr_tail,
            timeout,
        };
        master.wait_ready().await?;
        Ok(master)
    }

    async fn wait_ready(&mut self) -> SshResult<()> {
        let deadline = Instant::now() + self.timeout + LOGIN_GRACE;
        loop {
            if let Some(child) = self.child.as_mut()
                && let Some(status) = child.try_wait().map_err(|e| SshError::Io(e.to_string()))?
            {
                self.child = None;
                let stderr = match self.stderr_tail.take() {
                    Some(task) => tokio::time::timeout(EXIT_GRACE, task)
                        .await
                        .ok()
                        .and_then(Result::ok)
                        .unwrap_or_default(),
                    None => String::new(),
                };
                let output = Output {
                    status,
                    stdout: Vec::new(),
                    stderr: stderr.into_bytes(),
                };
                return match check_output(output, "ssh login", &self.target) {
                    Err(e) => Err(e),
                    Ok(_) => Err(SshError::Failed {
                        operation: "ssh login".to_string(),
                        status: status.to_string(),
                        stderr: "master exited before the control socket was ready".to_string(),
                    }),
                };
            }

            if self.socket.exists() && self.check().await {
                tracing::debug!(endpoint = %self.target.display_name(), "Control master ready");
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(SshError::Timeout {
                    operation: format!("login to {}", self.target.display_name()),
                    secs: (self.timeout + LOGIN_GRACE).as_secs(),
                });
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    /// Endpoint this master is logged in to
    #[must_use]
    pub fn target(&self) -> &SshTarget {
        &self.target
    }

    /// Control socket path
    #[must_use]
    pub fn socket(&self) -> &Path {
        &self.socket
    }

    /// Returns true while the master process has not exited
    pub fn is_running(&mut self) -> bool {
        self.child
            .as_mut()
            .is_some_and(|c| matches!(c.try_wait(), Ok(None)))
    }

    async fn control(&self, op: &str, extra: &[&str]) -> SshResult<String> {
        let mut cmd = base_command(Program::Ssh, &self.target, self.timeout, false);
        cmd.arg("-S").arg(&self.socket).arg("-O").arg(op);
        cmd.args(extra);
        cmd.arg(self.target.destination());
        let operation = format!("ssh -O {op}");
        let output = run_with_timeout(cmd, Program::Ssh, &operation, None, self.timeout).await?;
        check_output(output, &operation, &self.target)
    }

    /// Asks the master whether it is alive
    pub async fn check(&self) -> bool {
        self.control("check", &[]).await.is_ok()
    }

    /// Adds a local forward, e.g. `127.0.0.1:40022:10.0.0.5:22`
    ///
    /// # Errors
    ///
    /// Returns an error if the master refuses the forward (port in use).
    pub async fn forward(&self, spec: &str) -> SshResult<()> {
        self.control("forward", &["-L", spec]).await.map(|_| ())
    }

    /// Removes a local forward added with [`ControlMaster::forward`]
    ///
    /// # Errors
    ///
    /// Returns an error if the master is gone or does not know the forward.
    pub async fn cancel_forward(&self, spec: &str) -> SshResult<()> {
        self.control("cancel", &["-L", spec]).await.map(|_| ())
    }

    /// Runs a remote shell command and returns its stdout
    ///
    /// # Errors
    ///
    /// Returns an error on timeout or non-zero exit.
    pub async fn exec(&self, command: &str, timeout: Duration) -> SshResult<String> {
        let mut cmd = base_command(Program::Ssh, &self.target, timeout, false);
        cmd.arg("-S")
            .arg(&self.socket)
            .arg("-o")
            .arg("ControlMaster=no")
            .arg(self.target.destination())
            .arg(command);
        let output = run_with_timeout(cmd, Program::Ssh, "remote command", None, timeout).await?;
        check_output(output, "remote command", &self.target)
    }

    /// Runs an sftp batch script over the master, returning raw output
    ///
    /// The caller decides how to read a non-zero exit; sftp aborts the batch
    /// at the first failing command.
    ///
    /// # Errors
    ///
    /// Returns an error if sftp cannot be started or times out.
    pub async fn sftp_batch(&self, script: &str, timeout: Duration) -> SshResult<Output> {
        let mut cmd = base_command(Program::Sftp, &self.target, timeout, false);
        cmd.arg("-o")
            .arg(format!("ControlPath={}", self.socket.display()))
            .arg("-o")
            .arg("ControlMaster=no")
            .arg("-b")
            .arg("-")
            .arg(self.target.destination());
        run_with_timeout(cmd, Program::Sftp, "sftp batch", Some(script), timeout).await
    }

    /// Closes the connection; calling it again does nothing
    pub async fn shutdown(&mut self) {
        let Some(mut child) = self.child.take() else {
            return;
        };
        if let Err(e) = self.control("exit", &[]).await {
            tracing::debug!(endpoint = %self.target.display_name(), error = %e, "ssh -O exit failed");
        }
        match tokio::time::timeout(EXIT_GRACE, child.wait()).await {
            Ok(_) => {}
            Err(_) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
            }
        }
        tracing::debug!(endpoint = %self.target.display_name(), "Control master closed");
    }
}

impl Drop for ControlMaster {
    fn drop(&mut self) {
        let Some(child) = self.child.as_mut() else {
            return;
        };
        // sshpass cannot pass SIGKILL on to its ssh child, so ask ssh first
        let _ = std::process::Command::new("ssh")
            .arg("-S")
            .arg(&self.socket)
            .arg("-O")
            .arg("exit")
            .arg(self.target.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        let _ = child.start_kill();
    }
}

/// Reads `reader` to the end, keeping only its last `limit` bytes
async fn read_tail<R: AsyncRead + Unpin>(mut reader: R, limit: usize) -> String {
    let mut tail: Vec<u8> = Vec::with_capacity(limit);
    let mut buf = [0u8; 1024];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                tail.extend_from_slice(&buf[..n]);
                let excess = tail.len().saturating_sub(limit);
                tail.drain(..excess);
            }
        }
    }
    String::from_utf8_lossy(&tail).into_owned()
}
