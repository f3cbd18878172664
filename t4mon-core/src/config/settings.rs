//! Raw TOML layout and its resolution into [`Settings`]

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use super::{ConfigError, ConfigResult};
use crate::models::{
    Credentials, DEFAULT_EXTENSION, DEFAULT_SSH_PORT, GatewayEndpoint, MonitoredSystem,
};
use crate::tracing::span_names;

/// Settings file looked up when no path is given
pub const DEFAULT_SETTINGS_FILE: &str = "settings.toml";
/// Checkpoint folder when `[misc] store_folder` is absent
pub const DEFAULT_STORE_FOLDER: &str = "store";
/// Report folder when `[misc] reports_folder` is absent
pub const DEFAULT_REPORTS_FOLDER: &str = "reports";
/// Timeout used by systems built in code rather than loaded from a file
pub const DEFAULT_SSH_TIMEOUT_SECS: u64 = 10;

const MASK: &str = "********";

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFile {
    #[serde(default)]
    defaults: RawSystem,
    gateway: Option<RawGateway>,
    #[serde(default)]
    misc: RawMisc,
    #[serde(default)]
    systems: BTreeMap<String, RawSystem>,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawSystem {
    host: Option<String>,
    ssh_port: Option<u16>,
    ssh_timeout: Option<f64>,
    folder: Option<String>,
    username: Option<String>,
    password: Option<String>,
    identity_file: Option<String>,
    tunnel_port: Option<u16>,
    extensions: Option<Vec<String>>,
    cluster_id: Option<String>,
    log_command: Option<String>,
}

impl RawSystem {
    /// Fills every unset slot from `defaults`
    fn inherit(self, defaults: &Self) -> Self {
        Self {
            host: self.host.or_else(|| defaults.host.clone()),
            ssh_port: self.ssh_port.or(defaults.ssh_port),
            ssh_timeout: self.ssh_timeout.or(defaults.ssh_timeout),
            folder: self.folder.or_else(|| defaults.folder.clone()),
            username: self.username.or_else(|| defaults.username.clone()),
            password: self.password.or_else(|| defaults.password.clone()),
            identity_file: self.identity_file.or_else(|| defaults.identity_file.clone()),
            tunnel_port: self.tunnel_port.or(defaults.tunnel_port),
            extensions: self.extensions.or_else(|| defaults.extensions.clone()),
            cluster_id: self.cluster_id.or_else(|| defaults.cluster_id.clone()),
            log_command: self.log_command.or_else(|| defaults.log_command.clone()),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawGateway {
    host: Option<String>,
    port: Option<u16>,
    username: Option<String>,
    password: Option<String>,
    identity_file: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMisc {
    remote_log_cmd: Option<String>,
    ssh_timeout: Option<f64>,
    store_folder: Option<String>,
    reports_folder: Option<String>,
    calculations_file: Option<String>,
}

/// Global settings from `[misc]`
#[derive(Debug, Clone)]
pub struct MiscSettings {
    /// Log command run on systems without their own
    pub remote_log_cmd: String,
    /// Timeout for gateway operations
    pub ssh_timeout: Duration,
    /// Where checkpoints are written
    pub store_folder: PathBuf,
    /// Where reports are written
    pub reports_folder: PathBuf,
    /// Derived-metric definitions, if any
    pub calculations_file: Option<PathBuf>,
}

/// Fully resolved settings for one run
#[derive(Debug, Clone)]
pub struct Settings {
    source: Option<PathBuf>,
    /// The jump host
    pub gateway: GatewayEndpoint,
    /// Global settings
    pub misc: MiscSettings,
    /// Monitored systems sorted by id
    pub systems: Vec<MonitoredSystem>,
}

impl Settings {
    /// Reads, resolves and validates a settings file
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if the file is missing, unreadable, not
    /// TOML, or fails validation.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let _span = tracing::info_span!(span_names::CONFIG_LOAD, file = %path.display()).entered();
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_toml_str(&content, Some(path))?;
        tracing::debug!(systems = settings.systems.len(), "Settings loaded");
        Ok(settings)
    }

    /// Parses settings from TOML text
    ///
    /// Relative paths resolve against the directory of `source`, or the
    /// current directory when there is none.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] on parse or validation failure.
    pub fn from_toml_str(content: &str, source: Option<&Path>) -> ConfigResult<Self> {
        let raw: RawFile = toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        let base = source
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_default();

        let misc = resolve_misc(raw.misc, &raw.defaults, &base)?;
        let gateway = resolve_gateway(raw.gateway)?;
        if raw.systems.is_empty() {
            return Err(ConfigError::NoSystems);
        }
        let systems = raw
            .systems
            .into_iter()
            .map(|(id, sys)| resolve_system(&id, sys.inherit(&raw.defaults), &misc))
            .collect::<ConfigResult<Vec<_>>>()?;

        let settings = Self {
            source: source.map(Path::to_path_buf),
            gateway,
            misc,
            systems,
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Cross-section checks
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateTunnelPort`] or
    /// [`ConfigError::MissingFile`].
    pub fn validate(&self) -> ConfigResult<()> {
        if self.systems.is_empty() {
            return Err(ConfigError::NoSystems);
        }
        let mut ports: HashMap<u16, &str> = HashMap::new();
        for system in &self.systems {
            if system.tunnel_port == 0 {
                continue;
            }
            if let Some(first) = ports.insert(system.tunnel_port, &system.id) {
                return Err(ConfigError::DuplicateTunnelPort {
                    port: system.tunnel_port,
                    first: first.to_string(),
                    second: system.id.clone(),
                });
            }
        }
        if let Some(path) = &self.misc.calculations_file
            && !path.is_file()
        {
            return Err(ConfigError::MissingFile {
                kind: "Calculations file",
                path: path.clone(),
            });
        }
        Ok(())
    }

    /// Settings file these settings came from
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Looks a system up by id, ignoring case
    #[must_use]
    pub fn system(&self, id: &str) -> Option<&MonitoredSystem> {
        self.systems.iter().find(|s| s.id.eq_ignore_ascii_case(id))
    }

    /// System ids in configuration order
    pub fn system_ids(&self) -> impl Iterator<Item = &str> {
        self.systems.iter().map(|s| s.id.as_str())
    }

    /// Log command for `system`: its own, or the global one
    #[must_use]
    pub fn log_command_for<'a>(&'a self, system: &'a MonitoredSystem) -> &'a str {
        system
            .log_command
            .as_deref()
            .unwrap_or(&self.misc.remote_log_cmd)
    }

    /// Effective settings as TOML, passwords masked
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if serialization fails.
    pub fn to_toml(&self) -> ConfigResult<String> {
        let dump = Dump {
            gateway: DumpGateway {
                host: &self.gateway.host,
                port: self.gateway.port,
                username: self.gateway.credentials.username.as_deref(),
                password: self.gateway.credentials.has_password().then_some(MASK),
                identity_file: self.gateway.credentials.identity_file.as_deref(),
            },
            misc: DumpMisc {
                remote_log_cmd: &self.misc.remote_log_cmd,
                ssh_timeout: self.misc.ssh_timeout.as_secs_f64(),
                store_folder: &self.misc.store_folder,
                reports_folder: &self.misc.reports_folder,
                calculations_file: self.misc.calculations_file.as_deref(),
            },
            systems: self
                .systems
                .iter()
                .map(|s| {
                    (
                        s.id.as_str(),
                        DumpSystem {
                            host: &s.host,
                            ssh_port: s.ssh_port,
                            ssh_timeout: s.ssh_timeout.as_secs_f64(),
                            folder: &s.folder,
                            username: s.credentials.username.as_deref(),
                            password: s.credentials.has_password().then_some(MASK),
                            identity_file: s.credentials.identity_file.as_deref(),
                            tunnel_port: s.tunnel_port,
                            extensions: &s.extensions,
                            cluster_id: s.cluster_id.as_deref(),
                            log_command: s.log_command.as_deref(),
                        },
                    )
                })
                .collect(),
        };
        toml::to_string_pretty(&dump).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Serialize)]
struct Dump<'a> {
    gateway: DumpGateway<'a>,
    misc: DumpMisc<'a>,
    systems: BTreeMap<&'a str, DumpSystem<'a>>,
}

#[derive(Serialize)]
struct DumpGateway<'a> {
    host: &'a str,
    port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity_file: Option<&'a Path>,
}

#[derive(Serialize)]
struct DumpMisc<'a> {
    remote_log_cmd: &'a str,
    ssh_timeout: f64,
    store_folder: &'a Path,
    reports_folder: &'a Path,
    #[serde(skip_serializing_if = "Option::is_none")]
    calculations_file: Option<&'a Path>,
}

#[derive(Serialize)]
struct DumpSystem<'a> {
    host: &'a str,
    ssh_port: u16,
    ssh_timeout: f64,
    folder: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    password: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    identity_file: Option<&'a Path>,
    tunnel_port: u16,
    extensions: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    cluster_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    log_command: Option<&'a str>,
}

/// Strips quotes and whitespace; empty values count as unset
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().trim_matches(|c| c == '"' || c == '\'').trim().to_string())
        .filter(|v| !v.is_empty())
}

fn resolve_path(base: &Path, value: &str) -> PathBuf {
    let expanded = PathBuf::from(shellexpand::tilde(value).as_ref());
    if expanded.is_absolute() {
        expanded
    } else {
        base.join(expanded)
    }
}

fn timeout(section: &str, secs: f64) -> ConfigResult<Duration> {
    let invalid = |reason: String| ConfigError::InvalidValue {
        section: section.to_string(),
        key: "ssh_timeout",
        reason,
    };
    if !(secs.is_finite() && secs > 0.0) {
        return Err(invalid(format!("{secs} is not a positive number of seconds")));
    }
    Duration::try_from_secs_f64(secs).map_err(|e| invalid(format!("{secs}: {e}")))
}

fn credentials(username: Option<String>, password: Option<String>, identity: Option<String>) -> Credentials {
    Credentials {
        username: clean(username),
        password: clean(password).map(SecretString::from),
        identity_file: clean(identity).map(|p| PathBuf::from(shellexpand::tilde(&p).as_ref())),
    }
}

fn resolve_misc(raw: RawMisc, defaults: &RawSystem, base: &Path) -> ConfigResult<MiscSettings> {
    let remote_log_cmd = clean(raw.remote_log_cmd).ok_or_else(|| ConfigError::MissingKey {
        section: "misc".to_string(),
        key: "remote_log_cmd",
    })?;
    let secs = raw
        .ssh_timeout
        .or(defaults.ssh_timeout)
        .ok_or_else(|| ConfigError::MissingKey {
            section: "misc".to_string(),
            key: "ssh_timeout",
        })?;
    Ok(MiscSettings {
        remote_log_cmd,
        ssh_timeout: timeout("misc", secs)?,
        store_folder: resolve_path(
            base,
            clean(raw.store_folder).as_deref().unwrap_or(DEFAULT_STORE_FOLDER),
        ),
        reports_folder: resolve_path(
            base,
            clean(raw.reports_folder)
                .as_deref()
                .unwrap_or(DEFAULT_REPORTS_FOLDER),
        ),
        calculations_file: clean(raw.calculations_file).map(|f| resolve_path(base, &f)),
    })
}

fn resolve_gateway(raw: Option<RawGateway>) -> ConfigResult<GatewayEndpoint> {
    let raw = raw.unwrap_or_default();
    let host = clean(raw.host).ok_or_else(|| ConfigError::MissingKey {
        section: "gateway".to_string(),
        key: "host",
    })?;
    Ok(GatewayEndpoint {
        host,
        port: raw.port.unwrap_or(DEFAULT_SSH_PORT),
        credentials: credentials(raw.username, raw.password, raw.identity_file),
    })
}

fn resolve_system(id: &str, raw: RawSystem, misc: &MiscSettings) -> ConfigResult<MonitoredSystem> {
    let section = format!("systems.{id}");
    let missing = |key: &'static str| ConfigError::MissingKey {
        section: section.clone(),
        key,
    };
    if id.is_empty()
        || !id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
    {
        return Err(ConfigError::InvalidValue {
            section: section.clone(),
            key: "id",
            reason: "system ids may only use letters, digits, '_', '-' and '.'".to_string(),
        });
    }

    let host = clean(raw.host).ok_or_else(|| missing("host"))?;
    let ssh_port = raw.ssh_port.ok_or_else(|| missing("ssh_port"))?;
    let folder = clean(raw.folder).ok_or_else(|| missing("folder"))?;
    let tunnel_port = raw.tunnel_port.ok_or_else(|| missing("tunnel_port"))?;
    let creds = credentials(raw.username, raw.password, raw.identity_file);
    if creds.username.is_none() {
        return Err(missing("username"));
    }
    let ssh_timeout = match raw.ssh_timeout {
        Some(secs) => timeout(&section, secs)?,
        None => misc.ssh_timeout,
    };
    let extensions: Vec<String> = raw
        .extensions
        .unwrap_or_default()
        .into_iter()
        .filter_map(|e| clean(Some(e)))
        .collect();

    Ok(MonitoredSystem {
        id: id.to_string(),
        host,
        ssh_port,
        folder,
        extensions: if extensions.is_empty() {
            vec![DEFAULT_EXTENSION.to_string()]
        } else {
            extensions
        },
        cluster_id: clean(raw.cluster_id),
        log_command: clean(raw.log_command),
        credentials: creds,
        tunnel_port,
        ssh_timeout,
    })
}
