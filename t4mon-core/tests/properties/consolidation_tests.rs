//! Property tests for merging per-system results

use proptest::prelude::*;
use t4mon_core::checkpoint::{Snapshot, parse_text_checkpoint, to_csv};
use t4mon_core::dataset::{Column, Dataset, Metadata};
use t4mon_core::models::CollectionResult;
use t4mon_core::consolidate;

fn system_dataset(id: &str, rows: usize, seed: f64) -> Dataset {
    let start = chrono::NaiveDate::from_ymd_opt(2015, 6, 5)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let index = (0..rows)
        .map(|i| start + chrono::Duration::seconds(i as i64 * 300))
        .collect();
    let cpu = (0..rows).map(|i| Some(seed * i as f64)).collect();
    Dataset::new(index, vec![Column::numeric("CPU", cpu)], Metadata::for_system(id))
        .expect("consistent dataset")
}

fn results_strategy() -> impl Strategy<Value = Vec<CollectionResult>> {
    prop::collection::btree_map("[A-Z]{2,5}[0-9]", (0usize..30, -1.0e3f64..1.0e3), 1..8).prop_map(|systems| {
        systems
            .into_iter()
            .map(|(id, (rows, seed))| {
                let dataset = system_dataset(&id, rows, seed);
                CollectionResult::new(id.clone(), dataset, format!("log of {id}"))
            })
            .collect()
    })
}

proptest! {
    /// Property: The merge does not depend on completion order
    #[test]
    fn merge_is_order_independent(
        results in results_strategy(),
        rotate in 0usize..8,
    ) {
        let mut shuffled = results.clone();
        shuffled.reverse();
        let len = shuffled.len();
        shuffled.rotate_left(rotate % len);

        let a = consolidate(results).expect("merges");
        let b = consolidate(shuffled).expect("merges");
        prop_assert_eq!(a, b);
    }

    /// Property: Every system keeps its rows and its log
    #[test]
    fn merge_preserves_rows_and_logs(results in results_strategy()) {
        let expected: Vec<(String, usize)> = results
            .iter()
            .map(|r| (r.system_id.clone(), r.dataset.len()))
            .collect();
        let merged = consolidate(results).expect("merges");

        prop_assert_eq!(merged.len(), expected.iter().map(|(_, n)| n).sum::<usize>());
        for (id, rows) in &expected {
            prop_assert_eq!(merged.for_system(id).len(), *rows);
            let log = format!("log of {id}");
            prop_assert_eq!(merged.log(id), Some(log.as_str()));
        }
    }

    /// Property: Duplicate system ids are rejected
    #[test]
    fn duplicates_are_rejected(results in results_strategy()) {
        let mut doubled = results.clone();
        doubled.push(results[0].clone());
        prop_assert!(consolidate(doubled).is_err());
    }

    /// Property: Snapshot JSON reproduces the data exactly, metadata included
    #[test]
    fn snapshot_json_round_trip(results in results_strategy()) {
        let run_at = chrono::NaiveDate::from_ymd_opt(2015, 6, 5)
            .and_then(|d| d.and_hms_opt(23, 0, 0))
            .expect("valid date");
        let snapshot = Snapshot::new(run_at, consolidate(results).expect("merges"));
        let json = serde_json::to_string(&snapshot).expect("serializes");
        let back: Snapshot = serde_json::from_str(&json).expect("deserializes");
        prop_assert_eq!(back, snapshot);
    }

    /// Property: The text form keeps values, timestamps and row tags
    #[test]
    fn text_round_trip(results in results_strategy()) {
        let merged = consolidate(results).expect("merges");
        prop_assume!(!merged.is_empty());
        let back = parse_text_checkpoint(&to_csv(&merged)).expect("parses");
        prop_assert_eq!(back.table().index(), merged.table().index());
        prop_assert_eq!(back.table().columns(), merged.table().columns());
        prop_assert_eq!(back.row_systems(), merged.row_systems());
    }
}
