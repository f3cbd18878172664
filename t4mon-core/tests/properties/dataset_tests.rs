//! Property tests for dataset transformations

use proptest::prelude::*;
use t4mon_core::dataset::{Column, Dataset, Metadata, matches_pattern};

fn part(rows: usize, names: &[&str], revision: &str) -> Dataset {
    let start = chrono::NaiveDate::from_ymd_opt(2015, 6, 5)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("valid date");
    let index = (0..rows)
        .map(|i| start + chrono::Duration::minutes(i as i64))
        .collect();
    let columns = names
        .iter()
        .map(|n| Column::numeric(*n, (0..rows).map(|i| Some(i as f64)).collect()))
        .collect();
    let metadata = Metadata {
        revision: Some(revision.to_string()),
        source_files: vec![format!("{revision}.csv")],
        ..Metadata::for_system("SYS1")
    };
    Dataset::new(index, columns, metadata).expect("consistent dataset")
}

const NAMES: [&str; 5] = ["CPU", "MEM", "DISK", "NET", "IO"];

fn names_strategy() -> impl Strategy<Value = Vec<&'static str>> {
    prop::sample::subsequence(NAMES.to_vec(), 0..=NAMES.len())
}

proptest! {
    /// Property: Concatenation outer-joins columns and keeps every row
    #[test]
    fn concat_outer_join(
        rows_a in 0usize..20,
        rows_b in 0usize..20,
        names_a in names_strategy(),
        names_b in names_strategy(),
    ) {
        let merged = Dataset::concat(vec![part(rows_a, &names_a, "R1"), part(rows_b, &names_b, "R2")])
            .expect("compatible parts");

        prop_assert_eq!(merged.len(), rows_a + rows_b);
        for column in merged.columns() {
            prop_assert_eq!(column.values.len(), rows_a + rows_b);
            prop_assert!(names_a.contains(&column.name.as_str()) || names_b.contains(&column.name.as_str()));
        }
        let mut expected: Vec<&str> = names_a.clone();
        expected.extend(names_b.iter().copied().filter(|n| !names_a.contains(n)));
        prop_assert_eq!(merged.column_names().collect::<Vec<_>>(), expected);

        let meta = merged.metadata();
        prop_assert_eq!(meta.system.as_deref(), Some("SYS1"));
        prop_assert_eq!(meta.source_files.len(), 2);
    }

    /// Property: Slicing and filtering carry the metadata record along
    #[test]
    fn row_operations_keep_metadata(
        rows in 0usize..40,
        start in 0usize..50,
        len in 0usize..50,
        modulus in 1usize..5,
    ) {
        let data = part(rows, &NAMES, "R7");
        let sliced = data.slice(start..start + len);
        prop_assert_eq!(sliced.metadata(), data.metadata());
        prop_assert!(sliced.len() <= len);
        prop_assert_eq!(sliced.width(), data.width());

        let filtered = data.filter_rows(|row, _| row % modulus == 0);
        prop_assert_eq!(filtered.metadata(), data.metadata());
        prop_assert_eq!(filtered.len(), rows.div_ceil(modulus));
    }

    /// Property: A pattern without '*' is a case-insensitive substring test
    #[test]
    fn plain_pattern_is_substring(name in "[A-Za-z_]{1,20}", start in 0usize..20, len in 1usize..20) {
        let start = start.min(name.len() - 1);
        let end = (start + len).min(name.len());
        let fragment = name[start..end].to_lowercase();
        prop_assert!(matches_pattern(&name, &fragment));
    }

    /// Property: Splitting a pattern into starred pieces keeps it matching
    #[test]
    fn starred_pieces_still_match(name in "[A-Z_]{2,30}", cut in 1usize..30) {
        let cut = cut.min(name.len() - 1);
        let pattern = format!("{}*{}", &name[..cut], &name[cut..]);
        prop_assert!(matches_pattern(&name, &pattern));
    }
}
