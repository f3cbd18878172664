//! Per-system local tunnels through the gateway
//!
//! A pool owns one gateway transport and one local forward per monitored
//! system. Starting is idempotent and brings up only what is not already
//! up; a system whose target cannot be reached fails alone. Only the
//! gateway itself failing is fatal for the pool.

mod ssh;

use std::collections::BTreeMap;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;

pub use ssh::{GatewayTransport, GatewayTunnelPool, OpenSshGateway, SshTunnelPool};

/// Local address every tunnel binds to
pub const TUNNEL_BIND_ADDR: Ipv4Addr = Ipv4Addr::LOCALHOST;

/// Lines tolerated before the `SSH-` identification string
const MAX_BANNER_LINES: usize = 5;

/// Errors raised by a tunnel pool
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The gateway rejected the credentials
    #[error("Gateway authentication failed: {0}")]
    GatewayAuth(String),

    /// The gateway could not be reached or the transport died
    #[error("Cannot connect to gateway: {0}")]
    GatewayConnect(String),

    /// One system's tunnel could not be brought up
    #[error("Tunnel for {system} failed: {reason}")]
    Tunnel {
        /// System id
        system: String,
        /// What went wrong
        reason: String,
    },
}

/// Lifecycle of one tunnel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TunnelState {
    /// Not started or stopped
    #[default]
    Down,
    /// Forward requested, waiting for the remote banner
    Starting,
    /// Forward in place and the remote sshd answered
    Up,
    /// Forward could not be established
    Failed,
}

/// Snapshot entry for one system
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TunnelStatus {
    /// Whether the tunnel is usable
    pub is_up: bool,
    /// Local port, 0 when the tunnel is not up
    pub local_port: u16,
    /// Why the tunnel is not up, if it failed
    pub error: Option<String>,
}

/// One system's forward
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tunnel {
    /// System id
    pub system_id: String,
    /// Remote host as seen from the gateway
    pub remote_host: String,
    /// Remote ssh port
    pub remote_port: u16,
    /// Port requested in the settings, 0 for an ephemeral one
    pub requested_port: u16,
    /// Port bound while the tunnel is up
    pub local_port: u16,
    /// Current state
    pub state: TunnelState,
    /// Last failure
    pub last_error: Option<String>,
}

impl Tunnel {
    /// A tunnel in the `Down` state
    #[must_use]
    pub fn new(
        system_id: impl Into<String>,
        remote_host: impl Into<String>,
        remote_port: u16,
        requested_port: u16,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            remote_host: remote_host.into(),
            remote_port,
            requested_port,
            local_port: 0,
            state: TunnelState::Down,
            last_error: None,
        }
    }

    /// `-L` argument forwarding `local_port` to the remote target
    #[must_use]
    pub fn forward_spec(&self, local_port: u16) -> String {
        format!(
            "{TUNNEL_BIND_ADDR}:{local_port}:{}:{}",
            self.remote_host, self.remote_port
        )
    }

    /// Status snapshot entry
    #[must_use]
    pub fn status(&self) -> TunnelStatus {
        let is_up = self.state == TunnelState::Up;
        TunnelStatus {
            is_up,
            local_port: if is_up { self.local_port } else { 0 },
            error: self.last_error.clone(),
        }
    }
}

/// A set of tunnels multiplexed through one gateway
///
/// `start` and `stop` are called by the orchestrator only, outside the
/// worker phase; workers read `status` concurrently.
pub trait TunnelPool: Send + Sync {
    /// Brings up the gateway and every tunnel that is not up
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::GatewayAuth`] or [`PoolError::GatewayConnect`]
    /// when the gateway is unusable. Per-system failures only show in
    /// [`TunnelPool::status`].
    fn start(&mut self) -> Result<(), PoolError>;

    /// Tears everything down; never fails and may be called repeatedly
    fn stop(&mut self);

    /// System id to tunnel status
    fn status(&self) -> BTreeMap<String, TunnelStatus>;
}

/// Asks the OS for a free local port
///
/// The listener is dropped right away so ssh can bind the port. Another
/// process could grab it in between; the forward then fails for that
/// system only.
///
/// # Errors
///
/// Returns the bind error.
pub fn pick_ephemeral_port() -> std::io::Result<u16> {
    let listener = TcpListener::bind(SocketAddr::from((TUNNEL_BIND_ADDR, 0)))?;
    Ok(listener.local_addr()?.port())
}

/// Reads the remote sshd identification string through a local port
///
/// # Errors
///
/// Returns a readable reason when the connection is refused, closed, times
/// out or yields no `SSH-` line.
pub async fn check_ssh_banner(port: u16, limit: Duration) -> Result<String, String> {
    let addr = SocketAddr::from((TUNNEL_BIND_ADDR, port));
    let stream = match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(s)) => s,
        Ok(Err(e)) => return Err(format!("cannot connect to {addr}: {e}")),
        Err(_) => return Err(format!("connect to {addr} timed out after {}s", limit.as_secs())),
    };

    let mut reader = BufReader::new(stream);
    for _ in 0..MAX_BANNER_LINES {
        let mut line = String::new();
        match timeout(limit, reader.read_line(&mut line)).await {
            Ok(Ok(0)) => return Err("connection closed before the ssh banner".to_string()),
            Ok(Ok(_)) if line.starts_with("SSH-") => return Ok(line.trim_end().to_string()),
            Ok(Ok(_)) => {}
            Ok(Err(e)) => return Err(format!("reading ssh banner: {e}")),
            Err(_) => {
                return Err(format!("no ssh banner within {}s", limit.as_secs()));
            }
        }
    }
    Err("no ssh banner in the first lines".to_string())
}
