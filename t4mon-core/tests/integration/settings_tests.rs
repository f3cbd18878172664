//! Settings files on disk

use std::time::Duration;

use t4mon_core::config::ConfigError;
use t4mon_core::{Settings, SshTunnelPool, TunnelPool};

use super::common::settings_toml;

#[test]
fn load_resolves_relative_folders() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("settings.toml");
    let text = settings_toml(&["B", "A"]).replace(
        "[misc]\n",
        "[misc]\nstore_folder = \"data/store\"\nreports_folder = \"/var/reports\"\n",
    );
    std::fs::write(&path, text).expect("write");

    let settings = Settings::load(&path).expect("loads");
    assert_eq!(settings.system_ids().collect::<Vec<_>>(), vec!["A", "B"]);
    assert_eq!(settings.misc.store_folder, dir.path().join("data/store"));
    assert_eq!(settings.misc.reports_folder, std::path::PathBuf::from("/var/reports"));
    assert_eq!(settings.misc.ssh_timeout, Duration::from_secs(5));
    assert_eq!(settings.source(), Some(path.as_path()));
}

#[test]
fn missing_file_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let err = Settings::load(&dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::NotFound(_)));
}

#[test]
fn malformed_file_is_a_parse_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("settings.toml");
    std::fs::write(&path, "[gateway\nhost = 1").expect("write");
    assert!(matches!(Settings::load(&path), Err(ConfigError::Parse(_))));
}

#[test]
fn dump_round_trips() {
    let settings = Settings::from_toml_str(&settings_toml(&["SYS1", "SYS2"]), None).expect("valid");
    let dumped = settings.to_toml().expect("dumps");
    let again = Settings::from_toml_str(&dumped, None).expect("dump is valid settings");
    assert_eq!(again.system_ids().collect::<Vec<_>>(), vec!["SYS1", "SYS2"]);
    assert_eq!(again.gateway.host, "gw.example.net");
}

#[test]
fn stopped_pool_reports_every_system_down() {
    let settings = Settings::from_toml_str(&settings_toml(&["SYS1", "SYS2"]), None).expect("valid");
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let mut pool = SshTunnelPool::from_settings(runtime.handle().clone(), &settings);

    let status = pool.status();
    assert_eq!(status.len(), 2);
    assert!(status.values().all(|s| !s.is_up && s.local_port == 0));

    pool.stop();
    pool.stop();
    assert!(pool.status().values().all(|s| !s.is_up));
}
