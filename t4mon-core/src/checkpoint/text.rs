//! Delimited-text checkpoint form
//!
//! Values and timestamps survive a round trip; metadata records and logs
//! do not.

use std::collections::BTreeMap;
use std::path::Path;

use super::{CheckpointError, CheckpointResult};
use crate::dataset::{Column, ColumnValues, Dataset, Metadata};
use crate::ingest::{SEPARATOR, T4CsvParser, parse_timestamp, split_record};
use crate::models::CollectionResult;
use crate::orchestrator::{ConsolidatedDataset, consolidate};
use crate::tracing::span_names;

/// Header of the timestamp column
pub const DATETIME_COLUMN: &str = "datetime";

/// Header of the system tag column
pub const SYSTEM_COLUMN: &str = "system";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn quote(cell: &str) -> String {
    if cell.contains([SEPARATOR, '"', '\n', '\r']) || cell.trim() != cell {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

/// Renders the consolidated table as CSV
#[must_use]
pub fn to_csv(consolidated: &ConsolidatedDataset) -> String {
    let table = consolidated.table();
    let mut out = String::new();
    let header: Vec<String> = [DATETIME_COLUMN, SYSTEM_COLUMN]
        .into_iter()
        .chain(table.column_names())
        .map(quote)
        .collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for (row, (ts, system)) in table.index().iter().zip(consolidated.row_systems()).enumerate() {
        let mut cells = vec![ts.format(TIMESTAMP_FORMAT).to_string(), quote(system)];
        cells.extend(
            table
                .columns()
                .iter()
                .map(|c| c.values.display_at(row).map(|v| quote(&v)).unwrap_or_default()),
        );
        out.push_str(&cells.join(","));
        out.push('\n');
    }
    out
}

/// Returns true if `text` starts with a text checkpoint header
fn is_text_checkpoint(text: &str) -> bool {
    text.lines().next().is_some_and(|first| {
        let cells = split_record(first);
        cells.len() >= 2 && cells[0] == DATETIME_COLUMN && cells[1] == SYSTEM_COLUMN
    })
}

/// Parses text written by [`to_csv`]
///
/// Every system found gets a bare metadata record; no logs are restored.
///
/// # Errors
///
/// Returns [`CheckpointError::Text`] for a wrong header, a row of the
/// wrong width or an unreadable timestamp.
pub fn parse_text_checkpoint(text: &str) -> CheckpointResult<ConsolidatedDataset> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    if !is_text_checkpoint(text) {
        return Err(CheckpointError::Text(format!(
            "header must start with '{DATETIME_COLUMN},{SYSTEM_COLUMN}'"
        )));
    }
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header = lines.next().map(split_record).unwrap_or_default();
    let names = &header[2..];

    let mut index = Vec::new();
    let mut systems = Vec::new();
    let mut cells: Vec<Vec<String>> = vec![Vec::new(); names.len()];
    for (n, line) in lines.enumerate() {
        let record = split_record(line);
        if record.len() != header.len() {
            return Err(CheckpointError::Text(format!(
                "row {} has {} cells, expected {}",
                n + 1,
                record.len(),
                header.len()
            )));
        }
        let mut record = record.into_iter();
        let (Some(ts), Some(system)) = (record.next(), record.next()) else {
            continue;
        };
        let ts = parse_timestamp(&ts)
            .ok_or_else(|| CheckpointError::Text(format!("row {}: bad timestamp '{ts}'", n + 1)))?;
        index.push(ts);
        systems.push(system);
        for (column, cell) in cells.iter_mut().zip(record) {
            column.push(cell);
        }
    }

    let columns = names
        .iter()
        .zip(cells)
        .map(|(name, values)| Column {
            name: name.clone(),
            values: ColumnValues::infer(&values),
        })
        .collect();
    let table = Dataset::new(index, columns, Metadata::default())
        .map_err(|e| CheckpointError::Text(e.to_string()))?;
    let metadata: BTreeMap<String, Metadata> = systems
        .iter()
        .map(|s| (s.clone(), Metadata::for_system(s.clone())))
        .collect();
    Ok(ConsolidatedDataset::from_parts(
        table,
        systems,
        BTreeMap::new(),
        metadata,
    )?)
}

/// Loads a text checkpoint or a raw exporter CSV
///
/// Raw exports are attributed to `system`, else to the system named in
/// the file, else to the file stem.
///
/// # Errors
///
/// Returns [`CheckpointError::Io`] if the file cannot be read, or a parse
/// error from the detected format.
pub fn load_csv(path: &Path, system: Option<&str>) -> CheckpointResult<ConsolidatedDataset> {
    let _span = tracing::info_span!(span_names::CHECKPOINT_LOAD, file = %path.display()).entered();
    let bytes = std::fs::read(path).map_err(|e| CheckpointError::io(path, e))?;
    let text = String::from_utf8_lossy(&bytes);
    if is_text_checkpoint(text.strip_prefix('\u{feff}').unwrap_or(&text)) {
        tracing::debug!("Reading text checkpoint");
        return parse_text_checkpoint(&text);
    }

    tracing::debug!("Reading raw exporter file");
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut dataset = T4CsvParser::parse(&bytes, &source)?;
    let id = system
        .map(str::to_string)
        .or_else(|| dataset.metadata().system.clone())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "local".to_string());
    dataset.metadata_mut().system = Some(id.clone());
    Ok(consolidate(vec![CollectionResult::new(id, dataset, String::new())])?)
}
