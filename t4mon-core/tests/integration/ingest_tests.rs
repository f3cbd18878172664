//! Ingestion of synthetic exporter files

use std::io::Write;

use t4mon_core::ingest::{IngestError, T4CsvParser, extract_csv_members};

use super::common::{END, START, format2_export, small_export, wide_field_names};

#[test]
fn wide_format2_export_has_expected_shape() {
    let fields = wide_field_names();
    let text = format2_export("SYS1", &fields, 286, None);
    let dataset = T4CsvParser::parse(text.as_bytes(), "wide.csv").expect("parses");

    assert_eq!(dataset.shape(), (286, 930));
    assert!(dataset.index().windows(2).all(|w| w[0] < w[1]));
    assert_eq!(dataset.metadata().system.as_deref(), Some("SYS1"));
    assert_eq!(dataset.metadata().revision.as_deref(), Some("R12"));
    assert_eq!(dataset.metadata().source_files, vec!["wide.csv"]);
}

#[test]
fn sentinel_row_ends_the_data() {
    let fields: Vec<String> = vec!["CPU".into(), "MEM".into()];
    for (k, j) in [(1, 0), (5, 3), (40, 12)] {
        let text = format2_export("SYS1", &fields, k, Some(j));
        let dataset = T4CsvParser::parse(text.as_bytes(), "s.csv").expect("parses");
        assert_eq!(dataset.len(), k, "K={k} J={j}");
    }
}

#[test]
fn time_column_must_be_unique() {
    let none = format!("S/R1, x\n{START}\nA\nB\n{END}\n1,2\n");
    assert!(matches!(
        T4CsvParser::parse(none.as_bytes(), "none.csv"),
        Err(IngestError::MissingTimeColumn { found: 0 })
    ));

    let two = format!(
        "S/R1, x\n{START}\nSample Time\nSample Time local\n{END}\n2015-Jun-05 10:00:00.00,2015-Jun-05 10:00:00.00\n"
    );
    assert!(matches!(
        T4CsvParser::parse(two.as_bytes(), "two.csv"),
        Err(IngestError::MissingTimeColumn { found: 2 })
    ));
}

#[test]
fn unterminated_header_is_malformed() {
    let text = format!("S/R1, x\n{START}\nSample Time\nCPU\n");
    assert!(matches!(
        T4CsvParser::parse(text.as_bytes(), "bad.csv"),
        Err(IngestError::MalformedHeader(_))
    ));
}

#[test]
fn archive_members_are_extracted() {
    let mut buffer = std::io::Cursor::new(Vec::new());
    {
        let mut zip = zip::ZipWriter::new(&mut buffer);
        let options = zip::write::SimpleFileOptions::default();
        zip.start_file("day1.csv", options).expect("start member");
        zip.write_all(small_export("SYS1", 0, 3).as_bytes()).expect("write member");
        zip.start_file("notes.txt", options).expect("start member");
        zip.write_all(b"not data").expect("write member");
        zip.finish().expect("finish archive");
    }

    let members = extract_csv_members("bundle.zip", buffer.get_ref()).expect("extracts");
    assert_eq!(members.len(), 1);
    let dataset = T4CsvParser::parse(&members[0].bytes, &members[0].name).expect("parses");
    assert_eq!(dataset.shape(), (3, 2));
}
