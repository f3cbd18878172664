//! Monitored systems, the gateway and their credentials

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

/// Default SSH port for the gateway and the monitored systems
pub const DEFAULT_SSH_PORT: u16 = 22;

/// Extension filter applied when a system does not configure one
pub const DEFAULT_EXTENSION: &str = ".csv";

/// SSH credentials for one endpoint
///
/// The password never appears in `Debug` output; `secrecy` redacts it.
#[derive(Debug, Default)]
pub struct Credentials {
    /// Login name, `None` lets `ssh` fall back to `~/.ssh/config`
    pub username: Option<String>,
    /// Password for `sshpass`-driven authentication
    pub password: Option<SecretString>,
    /// Private key file (already tilde-expanded)
    pub identity_file: Option<PathBuf>,
}

impl Credentials {
    /// Creates credentials with only a username
    #[must_use]
    pub fn with_username(username: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: None,
            identity_file: None,
        }
    }

    /// Sets the password
    #[must_use]
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Sets the identity file
    #[must_use]
    pub fn identity_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.identity_file = Some(path.into());
        self
    }

    /// Returns true if a non-empty password is configured
    #[must_use]
    pub fn has_password(&self) -> bool {
        self.password
            .as_ref()
            .is_some_and(|p| !p.expose_secret().is_empty())
    }
}

impl Clone for Credentials {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: self
                .password
                .as_ref()
                .map(|p| SecretString::from(p.expose_secret().to_owned())),
            identity_file: self.identity_file.clone(),
        }
    }
}

/// The single jump host every tunnel is multiplexed through
#[derive(Debug, Clone)]
pub struct GatewayEndpoint {
    /// Gateway hostname or IP
    pub host: String,
    /// Gateway SSH port
    pub port: u16,
    /// Gateway credentials
    pub credentials: Credentials,
}

impl GatewayEndpoint {
    /// Creates a gateway endpoint on the default SSH port without credentials
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_SSH_PORT,
            credentials: Credentials::default(),
        }
    }
}

/// A remote host whose exporter files are collected
#[derive(Debug, Clone)]
pub struct MonitoredSystem {
    /// Unique system identifier (the settings section name)
    pub id: String,
    /// Private hostname or IP as seen from the gateway
    pub host: String,
    /// SSH port as seen from the gateway
    pub ssh_port: u16,
    /// Remote folder holding the exporter files
    pub folder: String,
    /// File-extension filters, any of them may match
    pub extensions: Vec<String>,
    /// Extra substring every collected filename must contain
    pub cluster_id: Option<String>,
    /// Per-system log command overriding the global one
    pub log_command: Option<String>,
    /// Per-system credentials
    pub credentials: Credentials,
    /// Requested local tunnel port, 0 asks the OS for an ephemeral one
    pub tunnel_port: u16,
    /// Timeout applied to every remote operation on this system
    pub ssh_timeout: Duration,
}

impl MonitoredSystem {
    /// Creates a system with default port, `.csv` filter and default timeout
    #[must_use]
    pub fn new(id: impl Into<String>, host: impl Into<String>, folder: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            host: host.into(),
            ssh_port: DEFAULT_SSH_PORT,
            folder: folder.into(),
            extensions: vec![DEFAULT_EXTENSION.to_string()],
            cluster_id: None,
            log_command: None,
            credentials: Credentials::default(),
            tunnel_port: 0,
            ssh_timeout: Duration::from_secs(crate::config::DEFAULT_SSH_TIMEOUT_SECS),
        }
    }

    /// Returns true if `name` passes the extension and cluster filters
    ///
    /// Matching is case-insensitive: the name must end with one of the
    /// extensions and, when a cluster id is configured, contain it.
    #[must_use]
    pub fn accepts_file_name(&self, name: &str) -> bool {
        let lower = name.to_lowercase();
        let extension_ok = self.extensions.is_empty()
            || self
                .extensions
                .iter()
                .any(|ext| lower.ends_with(&ext.to_lowercase()));
        let cluster_ok = self
            .cluster_id
            .as_ref()
            .is_none_or(|id| lower.contains(&id.to_lowercase()));
        extension_ok && cluster_ok
    }
}
