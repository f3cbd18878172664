//! Property tests for exporter file parsing

use std::fmt::Write as _;

use chrono::{NaiveDate, NaiveDateTime};
use proptest::prelude::*;
use t4mon_core::ingest::{T4CsvParser, parse_timestamp, split_record};

fn quote(cell: &str) -> String {
    format!("\"{}\"", cell.replace('"', "\"\""))
}

fn datetime_strategy() -> impl Strategy<Value = NaiveDateTime> {
    (2000i32..2030, 1u32..13, 1u32..29, 0u32..24, 0u32..60, 0u32..60, 0u32..100).prop_map(
        |(y, mo, d, h, mi, s, cs)| {
            NaiveDate::from_ymd_opt(y, mo, d)
                .and_then(|date| date.and_hms_milli_opt(h, mi, s, cs * 10))
                .expect("valid datetime")
        },
    )
}

proptest! {
    /// Property: Quoted cells survive splitting unchanged
    #[test]
    fn quoted_cells_round_trip(cells in prop::collection::vec("[^\r\n]{0,12}", 1..8)) {
        let line = cells.iter().map(|c| quote(c)).collect::<Vec<_>>().join(",");
        let split = split_record(&line);
        let expected: Vec<String> = cells.iter().map(|c| c.trim().to_string()).collect();
        prop_assert_eq!(split, expected);
    }

    /// Property: Unquoted cells split on every separator
    #[test]
    fn plain_cells_split(cells in prop::collection::vec("[A-Za-z0-9 .:-]{0,12}", 1..10)) {
        let split = split_record(&cells.join(","));
        prop_assert_eq!(split.len(), cells.len());
    }

    /// Property: Exporter timestamps parse back to the same instant
    #[test]
    fn exporter_timestamps_parse(ts in datetime_strategy()) {
        let text = format!("{}.{:02}", ts.format("%Y-%b-%d %H:%M:%S"), ts.and_utc().timestamp_subsec_millis() / 10);
        prop_assert_eq!(parse_timestamp(&text), Some(ts));
        let iso = ts.format("%Y-%m-%d %H:%M:%S%.f").to_string();
        prop_assert_eq!(parse_timestamp(&iso), Some(ts));
    }

    /// Property: Only rows before the sentinel are kept
    #[test]
    fn sentinel_truncates(k in 0usize..40, j in 0usize..10) {
        let mut text = String::from("SYS1/R1, export\nx\ny\nSample Time,CPU\n");
        let start = NaiveDate::from_ymd_opt(2015, 6, 5)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .expect("valid date");
        for row in 0..k {
            let ts = start + chrono::Duration::minutes(row as i64);
            let _ = writeln!(text, "{},{row}", ts.format("%Y-%b-%d %H:%M:%S.00"));
        }
        text.push_str("Column Average,1.5\n");
        for row in 0..j {
            let _ = writeln!(text, "2015-Jun-06 00:00:00.00,{row}");
        }
        let dataset = T4CsvParser::parse(text.as_bytes(), "f.csv").expect("parses");
        prop_assert_eq!(dataset.len(), k);
    }

    /// Property: Repeated header names are disambiguated
    #[test]
    fn duplicate_fields_made_unique(copies in 1usize..6) {
        let mut header = String::from("Sample Time");
        for _ in 0..copies {
            header.push_str(",CPU");
        }
        let row = format!("2015-Jun-05 10:00:00.00{}", ",1".repeat(copies));
        let text = format!("S/R1, x\nx\ny\n{header}\n{row}\n");
        let raw = T4CsvParser::extract(&text).expect("extracts");
        let mut names = raw.field_names.clone();
        names.sort();
        names.dedup();
        prop_assert_eq!(names.len(), copies + 1);
    }
}
