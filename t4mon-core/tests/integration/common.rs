//! Shared fixtures: synthetic exports and in-memory pool and sessions

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::{Arc, Mutex};

use chrono::{Duration, NaiveDate, NaiveDateTime};
use t4mon_core::models::MonitoredSystem;
use t4mon_core::session::{RemoteFile, RemoteSession, SessionConnector, SessionError, SessionResult};
use t4mon_core::tunnel::{PoolError, TunnelPool, TunnelStatus};

pub const START: &str = "$$$ START COLUMN HEADERS $$$";
pub const END: &str = "$$$ END COLUMN HEADERS $$$";

/// 2015-06-05 23:00, the run time used throughout
pub fn run_at() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2015, 6, 5)
        .and_then(|d| d.and_hms_opt(23, 0, 0))
        .expect("valid run time")
}

fn sample_time(row: usize) -> String {
    let minutes = i64::try_from(row).expect("row fits i64") * 5;
    let ts = run_at().date().and_hms_opt(0, 0, 0).expect("midnight") + Duration::minutes(minutes);
    ts.format("%Y-%b-%d %H:%M:%S.00").to_string()
}

/// 930 data fields: 12 `FRONTEND_Counter*_Hits`, 370 `Processor*_CPU`,
/// the rest filler
pub fn wide_field_names() -> Vec<String> {
    let mut names = Vec::with_capacity(930);
    names.extend((0..12).map(|i| format!("FRONTEND_Counter{i}_Hits")));
    names.extend((0..370).map(|i| format!("Processor{i}_Busy_CPU")));
    names.extend((0..548).map(|i| format!("Misc_Metric_{i}")));
    names
}

/// A format 2 export: header fields between markers, one per line
///
/// `rows` genuine rows follow; with `trailing`, a `Column Average` row and
/// that many more rows are appended.
pub fn format2_export(system: &str, fields: &[String], rows: usize, trailing: Option<usize>) -> String {
    let mut out = format!("{system}/R12, T4 statistics export\n");
    out.push_str("Generated by exporter\n");
    out.push_str(START);
    out.push('\n');
    out.push_str("Sample Time\n");
    for name in fields {
        out.push_str(name);
        out.push('\n');
    }
    out.push_str(END);
    out.push('\n');

    let line = |out: &mut String, first: &str, row: usize| {
        out.push_str(first);
        for col in 0..fields.len() {
            let _ = write!(out, ",{}", row * 10 + col % 7);
        }
        out.push('\n');
    };
    for row in 0..rows {
        line(&mut out, &sample_time(row), row);
    }
    if let Some(extra) = trailing {
        line(&mut out, "Column Average", 0);
        for row in rows..rows + extra {
            line(&mut out, &sample_time(row), row);
        }
    }
    out
}

/// A small format 1 export for `system` with CPU and MEM columns
pub fn small_export(system: &str, first_row: usize, rows: usize) -> String {
    let mut out = format!("{system}/R1, export\n05/06/2015\n10:00\nSample Time,CPU,MEM\n");
    for row in first_row..first_row + rows {
        let _ = writeln!(out, "{},{},{}", sample_time(row), row, row * 2);
    }
    out
}

/// Settings text for `ids`, all sharing one folder
pub fn settings_toml(ids: &[&str]) -> String {
    let mut out = String::from(
        "[gateway]\nhost = \"gw.example.net\"\n\n\
         [misc]\nssh_timeout = 5\nremote_log_cmd = \"show log\"\n\n\
         [defaults]\nssh_port = 22\nfolder = \"/stats\"\nusername = \"t4\"\ntunnel_port = 0\n",
    );
    for (n, id) in ids.iter().enumerate() {
        let _ = write!(out, "\n[systems.{id}]\nhost = \"10.0.0.{}\"\n", n + 1);
    }
    out
}

/// Pool whose tunnels are all up except the listed systems
pub struct FakePool {
    pub ids: Vec<String>,
    pub down: Vec<String>,
    pub starts: usize,
    pub stops: usize,
    up: bool,
}

impl FakePool {
    pub fn new(ids: &[&str], down: &[&str]) -> Self {
        Self {
            ids: ids.iter().map(ToString::to_string).collect(),
            down: down.iter().map(ToString::to_string).collect(),
            starts: 0,
            stops: 0,
            up: false,
        }
    }
}

impl TunnelPool for FakePool {
    fn start(&mut self) -> Result<(), PoolError> {
        self.starts += 1;
        self.up = true;
        Ok(())
    }

    fn stop(&mut self) {
        self.stops += 1;
        self.up = false;
    }

    fn status(&self) -> BTreeMap<String, TunnelStatus> {
        self.ids
            .iter()
            .enumerate()
            .map(|(n, id)| {
                let is_up = self.up && !self.down.contains(id);
                let status = TunnelStatus {
                    is_up,
                    local_port: if is_up { 40_000 + u16::try_from(n).unwrap_or(0) } else { 0 },
                    error: (!is_up).then(|| "Connection refused".to_string()),
                };
                (id.clone(), status)
            })
            .collect()
    }
}

/// Remote content of one system
#[derive(Debug, Clone, Default)]
pub struct FakeSystem {
    /// `None` models a folder that does not exist
    pub files: Option<Vec<(String, Vec<u8>)>>,
    pub log: Option<String>,
}

impl FakeSystem {
    pub fn with_files(files: Vec<(String, String)>) -> Self {
        Self {
            files: Some(files.into_iter().map(|(n, c)| (n, c.into_bytes())).collect()),
            log: Some(String::from("log ok")),
        }
    }
}

/// Connector serving [`FakeSystem`]s from memory
#[derive(Default)]
pub struct FakeConnector {
    pub systems: BTreeMap<String, FakeSystem>,
    pub commands: Arc<Mutex<Vec<(String, String)>>>,
}

impl FakeConnector {
    pub fn with(mut self, id: &str, system: FakeSystem) -> Self {
        self.systems.insert(id.to_string(), system);
        self
    }
}

pub struct FakeSession {
    id: String,
    system: FakeSystem,
    commands: Arc<Mutex<Vec<(String, String)>>>,
}

impl RemoteSession for FakeSession {
    fn list_files(&self, _dir: &str, extensions: &[String]) -> SessionResult<Vec<RemoteFile>> {
        let Some(files) = &self.system.files else {
            return Ok(Vec::new());
        };
        Ok(files
            .iter()
            .filter(|(name, _)| t4mon_core::session::has_extension(name, extensions))
            .map(|(name, bytes)| RemoteFile {
                name: name.clone(),
                modified: None,
                size: bytes.len() as u64,
            })
            .collect())
    }

    fn fetch(&self, path: &str) -> SessionResult<Vec<u8>> {
        self.system
            .files
            .iter()
            .flatten()
            .find(|(name, _)| path.ends_with(name.as_str()))
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| SessionError::Io {
                operation: "fetch",
                reason: format!("{path}: No such file"),
            })
    }

    fn run_command(&self, command: &str) -> Option<String> {
        if let Ok(mut seen) = self.commands.lock() {
            seen.push((self.id.clone(), command.to_string()));
        }
        self.system.log.clone()
    }
}

impl SessionConnector for FakeConnector {
    type Session = FakeSession;

    fn connect(&self, system: &MonitoredSystem, _local_port: u16) -> SessionResult<FakeSession> {
        let remote = self.systems.get(&system.id).cloned().ok_or_else(|| SessionError::Connect {
            system: system.id.clone(),
            reason: "no route to host".to_string(),
        })?;
        Ok(FakeSession {
            id: system.id.clone(),
            system: remote,
            commands: Arc::clone(&self.commands),
        })
    }
}
