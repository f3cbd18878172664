//! End-to-end runs against in-memory systems

use t4mon_core::checkpoint::read_snapshot;
use t4mon_core::models::LOG_OMITTED_PREFIX;
use t4mon_core::{ExecutionStrategy, Orchestrator, RunOptions, Settings};

use super::common::{FakeConnector, FakePool, FakeSystem, run_at, settings_toml, small_export};

const IDS: [&str; 4] = ["SYS1", "SYS2", "SYS3", "SYS4"];

fn settings() -> Settings {
    Settings::from_toml_str(&settings_toml(&IDS), None).expect("valid settings")
}

fn connector() -> FakeConnector {
    FakeConnector::default()
        .with(
            "SYS1",
            FakeSystem::with_files(vec![
                ("a_05jun2015.csv".into(), small_export("SYS1", 0, 4)),
                ("b_05jun2015.csv".into(), small_export("SYS1", 4, 2)),
                ("old_04jun2015.csv".into(), small_export("SYS1", 100, 9)),
            ]),
        )
        .with(
            "SYS2",
            FakeSystem::with_files(vec![
                ("x_05jun2015.csv".into(), small_export("SYS2", 0, 3)),
                ("broken_05jun2015.csv".into(), "garbage\n".into()),
                ("skip_05jun2015.txt".into(), small_export("SYS2", 0, 3)),
            ]),
        )
        .with(
            "SYS3",
            FakeSystem {
                files: None,
                log: Some("unused".into()),
            },
        )
        .with("SYS4", FakeSystem::with_files(vec![("y_05jun2015.csv".into(), small_export("SYS4", 0, 1))]))
}

fn options(strategy: ExecutionStrategy) -> RunOptions {
    RunOptions {
        strategy,
        write_checkpoint: false,
        ..RunOptions::new(run_at())
    }
}

#[test]
fn serial_and_parallel_runs_agree() {
    let settings = settings();
    let connector = connector();

    let mut pool = FakePool::new(&IDS, &[]);
    let serial = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector)
        .expect("serial run");
    let parallel = Orchestrator::new(&settings, options(ExecutionStrategy::Parallel))
        .collect(&mut pool, &connector)
        .expect("parallel run");

    assert_eq!(serial, parallel);
    assert_eq!(
        serde_json::to_string(&serial).expect("serializes"),
        serde_json::to_string(&parallel).expect("serializes")
    );
    assert_eq!((pool.starts, pool.stops), (2, 2));
}

#[test]
fn today_only_and_all_history() {
    let settings = settings();
    let connector = connector();
    let mut pool = FakePool::new(&IDS, &[]);

    let today = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector)
        .expect("run");
    assert_eq!(today.for_system("SYS1").len(), 6);
    assert_eq!(today.for_system("SYS2").len(), 3);
    assert_eq!(today.len(), 10);

    let all = Orchestrator::new(
        &settings,
        RunOptions {
            all_history: true,
            ..options(ExecutionStrategy::Serial)
        },
    )
    .collect(&mut pool, &connector)
    .expect("run");
    assert_eq!(all.for_system("SYS1").len(), 15);
}

#[test]
fn rows_are_grouped_by_system_in_id_order() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &[]);
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Parallel))
        .collect(&mut pool, &connector())
        .expect("run");

    let systems = merged.row_systems();
    assert!(systems.windows(2).all(|w| w[0] <= w[1]));
    assert_eq!(merged.table().column_names().collect::<Vec<_>>(), vec!["CPU", "MEM"]);
}

#[test]
fn missing_folder_gives_empty_data() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &[]);
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector())
        .expect("run");

    assert!(merged.for_system("SYS3").is_empty());
    assert_eq!(
        merged.log("SYS3"),
        Some("Log collection omitted: no data collected")
    );
    assert_eq!(merged.metadata_for("SYS3").and_then(|m| m.system.as_deref()), Some("SYS3"));
}

#[test]
fn conflicting_file_is_skipped_and_rest_kept() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &[]);
    let numeric = "SYS1/R1, export\n05/06/2015\n10:00\nSample Time,STATE\n\
                   2015-Jun-05 00:00:00.00,0\n2015-Jun-05 00:05:00.00,0\n";
    let text = "SYS1/R1, export\n05/06/2015\n10:00\nSample Time,STATE\n\
                2015-Jun-05 00:10:00.00,up\n";
    let connector = FakeConnector::default().with(
        "SYS1",
        FakeSystem::with_files(vec![
            ("a_05jun2015.csv".into(), numeric.into()),
            ("b_05jun2015.csv".into(), text.into()),
        ]),
    );
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector)
        .expect("run");

    assert_eq!(merged.for_system("SYS1").len(), 2);
    assert_eq!(merged.log("SYS1"), Some("log ok"));
    assert_eq!(
        merged.metadata_for("SYS1").map(|m| m.source_files.clone()),
        Some(vec!["a_05jun2015.csv".to_string()])
    );
}

#[test]
fn failed_tunnel_contributes_no_rows() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &["SYS2"]);
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Parallel))
        .collect(&mut pool, &connector())
        .expect("run");

    assert!(!merged.row_systems().iter().any(|s| s == "SYS2"));
    let log = merged.log("SYS2").expect("placeholder log");
    assert!(log.starts_with(LOG_OMITTED_PREFIX));
    assert!(log.contains("Connection refused"));
    assert_eq!(merged.system_ids().count(), IDS.len());
    assert_eq!(merged.for_system("SYS1").len(), 6);
}

#[test]
fn unreachable_system_is_isolated() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &[]);
    let connector = FakeConnector::default().with(
        "SYS1",
        FakeSystem::with_files(vec![("a_05jun2015.csv".into(), small_export("SYS1", 0, 2))]),
    );
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Parallel))
        .collect(&mut pool, &connector)
        .expect("run");

    assert_eq!(merged.len(), 2);
    for id in ["SYS2", "SYS3", "SYS4"] {
        assert!(merged.log(id).is_some_and(|l| l.contains("no route to host")), "{id}");
    }
}

#[test]
fn log_commands_run_only_with_data() {
    let settings = settings();
    let mut pool = FakePool::new(&IDS, &[]);
    let connector = connector();
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector)
        .expect("run");

    let mut ran: Vec<String> = connector
        .commands
        .lock()
        .expect("lock")
        .iter()
        .map(|(id, command)| {
            assert_eq!(command, "show log");
            id.clone()
        })
        .collect();
    ran.sort();
    assert_eq!(ran, vec!["SYS1", "SYS2", "SYS4"]);
    assert_eq!(merged.log("SYS1"), Some("log ok"));

    let quiet = Orchestrator::new(
        &settings,
        RunOptions {
            collect_logs: false,
            ..options(ExecutionStrategy::Serial)
        },
    )
    .collect(&mut pool, &FakeConnector::default())
    .expect("run");
    assert!(quiet.logs().values().all(|l| l.starts_with(LOG_OMITTED_PREFIX)));
}

#[test]
fn calculations_add_columns() {
    let dir = tempfile::tempdir().expect("tempdir");
    let calc = dir.path().join("calc.cfg");
    std::fs::write(&calc, "# derived\nRATIO = MEM / CPU\nTOTAL = CPU + MEM * 2\n").expect("write");
    let mut settings = settings();
    settings.misc.calculations_file = Some(calc);

    let mut pool = FakePool::new(&IDS, &[]);
    let merged = Orchestrator::new(&settings, options(ExecutionStrategy::Serial))
        .collect(&mut pool, &connector())
        .expect("run");

    let sys1 = merged.for_system("SYS1");
    let total = sys1.column("TOTAL").and_then(|c| c.values.as_numeric()).expect("numeric");
    assert_eq!(total[1], Some(1.0 + 2.0 * 2.0));
    let ratio = sys1.column("RATIO").and_then(|c| c.values.as_numeric()).expect("numeric");
    assert_eq!(ratio[0], None);
    assert_eq!(ratio[3], Some(2.0));
}

#[test]
fn run_writes_reloadable_checkpoint() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut settings = settings();
    settings.misc.store_folder = dir.path().join("store");

    let mut pool = FakePool::new(&IDS, &["SYS4"]);
    let outcome = Orchestrator::new(&settings, RunOptions::new(run_at()))
        .run(&mut pool, &connector())
        .expect("run");

    let files = outcome.checkpoint.expect("checkpoint written");
    assert_eq!(files.logs.len(), IDS.len());
    let reloaded = read_snapshot(&files.snapshot).expect("reloads");
    assert_eq!(reloaded.consolidated, outcome.consolidated);
    assert_eq!(reloaded.run_tag, "20150605_2300");
}
