//! Tunnel pool backed by an OpenSSH control master on the gateway

use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use tokio::runtime::Handle;

use super::{
    PoolError, Tunnel, TunnelPool, TunnelState, TunnelStatus, check_ssh_banner, pick_ephemeral_port,
};
use crate::config::Settings;
use crate::models::{GatewayEndpoint, MonitoredSystem};
use crate::ssh::{ControlMaster, SshError, SshResult, SshTarget};
use crate::tracing::span_names;

/// The shared connection to the gateway that forwards are added to
///
/// Forwards are only added and removed from `start`/`stop`, one at a time.
pub trait GatewayTransport {
    /// Gateway name for log lines
    fn name(&self) -> String;

    /// Returns true while the connection is usable
    fn is_connected(&mut self) -> bool;

    /// Opens the connection, replacing a dead one
    fn connect(&mut self) -> impl Future<Output = SshResult<()>>;

    /// Closes the connection; closing twice does nothing
    fn disconnect(&mut self) -> impl Future<Output = ()>;

    /// Drops the connection without waiting, for use in `Drop`
    fn abandon(&mut self);

    /// Adds a `-L` forward
    fn add_forward(&self, spec: &str) -> impl Future<Output = SshResult<()>>;

    /// Removes a forward added with [`GatewayTransport::add_forward`]
    fn remove_forward(&self, spec: &str) -> impl Future<Output = SshResult<()>>;

    /// Checks that `tunnel`, bound on `port`, reaches an sshd
    fn check_banner(&self, tunnel: &Tunnel, port: u16, limit: Duration) -> impl Future<Output = Result<String, String>>;
}

/// [`GatewayTransport`] over an `ssh -M` control master
pub struct OpenSshGateway {
    target: SshTarget,
    timeout: Duration,
    master: Option<ControlMaster>,
}

impl OpenSshGateway {
    /// Not connected yet
    #[must_use]
    pub fn new(gateway: &GatewayEndpoint, timeout: Duration) -> Self {
        Self {
            target: SshTarget::from(gateway),
            timeout,
            master: None,
        }
    }

    fn master(&self) -> SshResult<&ControlMaster> {
        self.master
            .as_ref()
            .ok_or_else(|| SshError::Io("gateway connection missing".to_string()))
    }
}

impl std::fmt::Debug for OpenSshGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenSshGateway")
            .field("gateway", &self.target.display_name())
            .field("master", &self.master)
            .finish_non_exhaustive()
    }
}

impl GatewayTransport for OpenSshGateway {
    fn name(&self) -> String {
        self.target.display_name()
    }

    fn is_connected(&mut self) -> bool {
        self.master.as_mut().is_some_and(ControlMaster::is_running)
    }

    async fn connect(&mut self) -> SshResult<()> {
        if let Some(mut stale) = self.master.take() {
            stale.shutdown().await;
        }
        self.master = Some(ControlMaster::connect(self.target.clone(), self.timeout).await?);
        Ok(())
    }

    async fn disconnect(&mut self) {
        if let Some(mut master) = self.master.take() {
            master.shutdown().await;
        }
    }

    fn abandon(&mut self) {
        // The master's own Drop tears the connection and its forwards down
        self.master = None;
    }

    async fn add_forward(&self, spec: &str) -> SshResult<()> {
        self.master()?.forward(spec).await
    }

    async fn remove_forward(&self, spec: &str) -> SshResult<()> {
        self.master()?.cancel_forward(spec).await
    }

    async fn check_banner(&self, _tunnel: &Tunnel, port: u16, limit: Duration) -> Result<String, String> {
        check_ssh_banner(port, limit).await
    }
}

/// Gateway connection plus one `-L` forward per system
///
/// Forwards are added one at a time over the gateway connection, so
/// channel creation on the shared transport is serialized.
pub struct GatewayTunnelPool<G: GatewayTransport> {
    runtime: Handle,
    gateway: G,
    timeout: Duration,
    tunnels: BTreeMap<String, Tunnel>,
}

/// The pool used for live runs
pub type SshTunnelPool = GatewayTunnelPool<OpenSshGateway>;

impl<G: GatewayTransport + std::fmt::Debug> std::fmt::Debug for GatewayTunnelPool<G> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayTunnelPool")
            .field("gateway", &self.gateway)
            .field("tunnels", &self.tunnels)
            .finish_non_exhaustive()
    }
}

impl SshTunnelPool {
    /// Creates a pool with every tunnel down
    ///
    /// `runtime` drives the ssh processes; `start` and `stop` block on it,
    /// so they must not be called from inside an async task.
    #[must_use]
    pub fn new(
        runtime: Handle,
        gateway: &GatewayEndpoint,
        systems: &[MonitoredSystem],
        timeout: Duration,
    ) -> Self {
        Self::with_transport(runtime, OpenSshGateway::new(gateway, timeout), systems, timeout)
    }

    /// Pool for the gateway and systems of `settings`
    #[must_use]
    pub fn from_settings(runtime: Handle, settings: &Settings) -> Self {
        Self::new(
            runtime,
            &settings.gateway,
            &settings.systems,
            settings.misc.ssh_timeout,
        )
    }
}

impl<G: GatewayTransport> GatewayTunnelPool<G> {
    /// Pool over an already built transport, every tunnel down
    #[must_use]
    pub fn with_transport(runtime: Handle, gateway: G, systems: &[MonitoredSystem], timeout: Duration) -> Self {
        let tunnels = systems
            .iter()
            .map(|s| {
                (
                    s.id.clone(),
                    Tunnel::new(s.id.clone(), s.host.clone(), s.ssh_port, s.tunnel_port),
                )
            })
            .collect();
        Self {
            runtime,
            gateway,
            timeout,
            tunnels,
        }
    }

    /// Tunnel for `system_id`
    #[must_use]
    pub fn tunnel(&self, system_id: &str) -> Option<&Tunnel> {
        self.tunnels.get(system_id)
    }

    async fn start_async(&mut self) -> Result<(), PoolError> {
        if !self.gateway.is_connected() {
            if self.tunnels.values().any(|t| t.state == TunnelState::Up) {
                tracing::warn!(gateway = %self.gateway.name(), "Gateway connection lost, reconnecting");
            }
            for tunnel in self.tunnels.values_mut() {
                tunnel.state = TunnelState::Down;
                tunnel.local_port = 0;
            }
            self.gateway.connect().await.map_err(|e| match e {
                SshError::Auth { .. } => PoolError::GatewayAuth(e.to_string()),
                other => PoolError::GatewayConnect(other.to_string()),
            })?;
            tracing::info!(gateway = %self.gateway.name(), "Gateway connected");
        }

        for tunnel in self.tunnels.values_mut() {
            if tunnel.state == TunnelState::Up {
                continue;
            }
            tunnel.state = TunnelState::Starting;
            match bring_up(&self.gateway, tunnel, self.timeout).await {
                Ok(port) => {
                    tunnel.local_port = port;
                    tunnel.state = TunnelState::Up;
                    tunnel.last_error = None;
                    tracing::info!(system = %tunnel.system_id, port, "Tunnel up");
                }
                Err(e) => {
                    tunnel.local_port = 0;
                    tunnel.state = TunnelState::Failed;
                    tracing::warn!(system = %tunnel.system_id, error = %e, "Tunnel failed");
                    tunnel.last_error = Some(e.to_string());
                }
            }
        }
        Ok(())
    }

    fn shutdown(&mut self) {
        if !self.gateway.is_connected() && self.tunnels.values().all(|t| t.state == TunnelState::Down) {
            return;
        }
        let _span = tracing::info_span!(span_names::POOL_STOP).entered();
        let runtime = self.runtime.clone();
        runtime.block_on(self.stop_async());
    }

    async fn stop_async(&mut self) {
        for tunnel in self.tunnels.values().filter(|t| t.state == TunnelState::Up) {
            if let Err(e) = self.gateway.remove_forward(&tunnel.forward_spec(tunnel.local_port)).await {
                tracing::debug!(system = %tunnel.system_id, error = %e, "Cancel forward failed");
            }
        }
        for tunnel in self.tunnels.values_mut() {
            tunnel.state = TunnelState::Down;
            tunnel.local_port = 0;
        }
        self.gateway.disconnect().await;
        tracing::info!(gateway = %self.gateway.name(), "Gateway disconnected");
    }
}

/// Adds the forward for `tunnel` and waits for the remote sshd banner
async fn bring_up<G: GatewayTransport>(gateway: &G, tunnel: &Tunnel, limit: Duration) -> Result<u16, PoolError> {
    let fail = |reason: String| PoolError::Tunnel {
        system: tunnel.system_id.clone(),
        reason,
    };
    let port = match tunnel.requested_port {
        0 => pick_ephemeral_port().map_err(|e| fail(format!("no free local port: {e}")))?,
        fixed => fixed,
    };
    let spec = tunnel.forward_spec(port);
    gateway.add_forward(&spec).await.map_err(|e| fail(e.to_string()))?;

    if let Err(reason) = gateway.check_banner(tunnel, port, limit).await {
        if let Err(e) = gateway.remove_forward(&spec).await {
            tracing::debug!(system = %tunnel.system_id, error = %e, "Cancel forward failed");
        }
        return Err(fail(format!(
            "{}:{} unreachable through gateway: {reason}",
            tunnel.remote_host, tunnel.remote_port
        )));
    }
    Ok(port)
}

impl<G: GatewayTransport + Send + Sync> TunnelPool for GatewayTunnelPool<G> {
    fn start(&mut self) -> Result<(), PoolError> {
        let _span = tracing::info_span!(span_names::POOL_START, tunnels = self.tunnels.len()).entered();
        let runtime = self.runtime.clone();
        runtime.block_on(self.start_async())
    }

    fn stop(&mut self) {
        self.shutdown();
    }

    fn status(&self) -> BTreeMap<String, TunnelStatus> {
        self.tunnels
            .iter()
            .map(|(id, t)| (id.clone(), t.status()))
            .collect()
    }
}

impl<G: GatewayTransport> Drop for GatewayTunnelPool<G> {
    fn drop(&mut self) {
        if Handle::try_current().is_err() {
            self.shutdown();
        } else {
            // block_on is not allowed here
            self.gateway.abandon();
        }
    }
}
