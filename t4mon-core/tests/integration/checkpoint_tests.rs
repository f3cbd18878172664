//! Checkpoint files on disk and rendering from them

use t4mon_core::checkpoint::{Snapshot, fill_local_logs, load_csv, read_snapshot, write_checkpoint};
use t4mon_core::ingest::T4CsvParser;
use t4mon_core::models::CollectionResult;
use t4mon_core::report::{ReportContext, SummaryRenderer, render_all};
use t4mon_core::{ConsolidatedDataset, consolidate};

use super::common::{run_at, small_export};

fn consolidated() -> ConsolidatedDataset {
    let sys1 = T4CsvParser::parse(small_export("SYS1", 0, 5).as_bytes(), "a.csv").expect("parses");
    let sys2 = T4CsvParser::parse(small_export("SYS2", 2, 3).as_bytes(), "b.csv").expect("parses");
    consolidate(vec![
        CollectionResult::new("SYS2", sys2, "sys2 log"),
        CollectionResult::new("SYS1", sys1, "sys1 log"),
        CollectionResult::omitted("SYS3", "tunnel down"),
    ])
    .expect("consolidates")
}

#[test]
fn snapshot_and_text_forms_agree() {
    let dir = tempfile::tempdir().expect("tempdir");
    let snapshot = Snapshot::new(run_at(), consolidated());
    let files = write_checkpoint(dir.path(), &snapshot, true).expect("writes");

    let binary = read_snapshot(&files.snapshot).expect("snapshot reloads");
    assert_eq!(binary, snapshot);

    let text = load_csv(&files.csv, None).expect("text reloads");
    assert_eq!(text.table().index(), snapshot.consolidated.table().index());
    assert_eq!(text.table().columns(), snapshot.consolidated.table().columns());
    assert_eq!(text.row_systems(), snapshot.consolidated.row_systems());
    assert!(text.logs().is_empty());
    assert!(text.metadata_for("SYS1").is_some_and(|m| m.revision.is_none()));
}

#[test]
fn local_rendering_from_snapshot_keeps_stored_logs() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = write_checkpoint(dir.path(), &Snapshot::new(run_at(), consolidated()), false)
        .expect("writes");
    let mut reloaded = read_snapshot(&files.snapshot).expect("reloads").consolidated;

    let added = fill_local_logs(&mut reloaded, "20150605_2300", ["SYS1", "SYS2", "SYS3", "SYS9"]);
    assert_eq!(added, 1);
    assert_eq!(reloaded.log("SYS1"), Some("sys1 log"));
    assert_eq!(
        reloaded.log("SYS9"),
        Some("Log collection omitted for locally generated reports at 20150605_2300 for SYS9")
    );
}

#[test]
fn local_rendering_from_csv_marks_every_system() {
    let dir = tempfile::tempdir().expect("tempdir");
    let files = write_checkpoint(dir.path(), &Snapshot::new(run_at(), consolidated()), false)
        .expect("writes");
    let mut reloaded = load_csv(&files.csv, None).expect("reloads");

    assert_eq!(fill_local_logs(&mut reloaded, "20150605_2300", std::iter::empty()), 2);

    let out = dir.path().join("reports");
    let ctx = ReportContext::new(&reloaded, run_at(), &out);
    let written = render_all(&SummaryRenderer, &ctx).expect("renders");
    assert_eq!(written.len(), 2);
    let report = std::fs::read_to_string(&written[0]).expect("report exists");
    assert!(report.contains("Rows:     5"));
    assert!(report.contains("locally generated reports"));
}
