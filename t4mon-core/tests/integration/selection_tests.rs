//! Wildcard column selection on a wide export

use t4mon_core::dataset::matching_columns;
use t4mon_core::ingest::T4CsvParser;
use t4mon_core::models::CollectionResult;
use t4mon_core::{Dataset, consolidate};

use super::common::{format2_export, wide_field_names};

fn wide() -> Dataset {
    let text = format2_export("SYS1", &wide_field_names(), 20, None);
    T4CsvParser::parse(text.as_bytes(), "wide.csv").expect("parses")
}

#[test]
fn wildcard_match_counts() {
    let dataset = wide();
    assert_eq!(dataset.select(&["frontend*hits"]).width(), 12);
    assert_eq!(dataset.select(&["processor*cpu"]).width(), 370);
    assert_eq!(dataset.select(&["cpu*processor"]).width(), 0);
    assert!(dataset.select(&["no_such_metric"]).columns().is_empty());
}

#[test]
fn selection_keeps_rows_and_metadata() {
    let dataset = wide();
    let selected = dataset.select(&["frontend*hits", "processor1*"]);
    assert_eq!(selected.len(), 20);
    assert_eq!(selected.index(), dataset.index());
    assert_eq!(selected.metadata(), dataset.metadata());
    // Processor1, Processor10..19, Processor100..199
    assert_eq!(selected.width(), 12 + 1 + 10 + 100);
}

#[test]
fn matching_is_case_insensitive_and_ordered() {
    let names = wide_field_names();
    let found = matching_columns(names.iter().map(String::as_str), &["FRONTEND_counter1*"]);
    assert_eq!(found, vec!["FRONTEND_Counter1_Hits", "FRONTEND_Counter10_Hits", "FRONTEND_Counter11_Hits"]);
}

#[test]
fn per_system_selection_from_consolidated() {
    let merged = consolidate(vec![
        CollectionResult::new("SYS1", wide(), "log"),
        CollectionResult::omitted("SYS2", "tunnel down"),
    ])
    .expect("consolidates");

    let sys1 = merged.select_for_system("SYS1", &["frontend*hits"]);
    assert_eq!(sys1.shape(), (20, 12));
    assert_eq!(sys1.metadata().system.as_deref(), Some("SYS1"));

    let sys2 = merged.select_for_system("SYS2", &["frontend*hits"]);
    assert!(sys2.is_empty());
    assert_eq!(sys2.width(), 0);
}
