//! Header detection, row scanning and typed table construction

use std::collections::HashSet;

use chrono::NaiveDateTime;

use super::{
    DATETIME_TAG, END_HEADER_TAG, IngestError, IngestResult, SENTINEL_MARKER, SEPARATOR,
    START_HEADER_TAG, T4_DATE_FORMAT,
};
use crate::dataset::{Column, ColumnValues, Dataset, Metadata};
use crate::tracing::span_names;

/// Layouts tried after [`T4_DATE_FORMAT`], most common first
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%b-%d %H:%M",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S%.f",
];

/// Index of the header line in format 1 files
const FORMAT1_HEADER_LINE: usize = 3;

/// An export split into header, rows and file metadata, before typing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawExport {
    /// Header fields, duplicates already disambiguated
    pub field_names: Vec<String>,
    /// Data rows with exactly `field_names.len()` cells each
    pub rows: Vec<Vec<String>>,
    /// System and revision from the first line
    pub metadata: Metadata,
    /// Position of the timestamp column, if exactly one field carries the tag
    pub time_column: Option<usize>,
    /// Number of fields containing the timestamp tag
    pub time_candidates: usize,
}

/// Stateless T4 CSV parser
pub struct T4CsvParser;

impl T4CsvParser {
    /// Parses one export into a dataset
    ///
    /// `source` is recorded as the dataset's source file.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MalformedHeader`] for a start marker without
    /// an end marker and [`IngestError::MissingTimeColumn`] when the header
    /// does not name exactly one timestamp column.
    pub fn parse(bytes: &[u8], source: &str) -> IngestResult<Dataset> {
        let _span = tracing::debug_span!(span_names::INGEST_FILE, file = %source).entered();
        let text = String::from_utf8_lossy(bytes);
        let mut raw = Self::extract(&text)?;
        raw.metadata.source_files.push(source.to_string());
        Self::to_dataset(raw)
    }

    /// Splits the text into header fields, data rows and file metadata
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MalformedHeader`] if a start marker has no
    /// matching end marker.
    pub fn extract(text: &str) -> IngestResult<RawExport> {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
        let Some(first) = lines.first() else {
            return Ok(RawExport::default());
        };
        let metadata = Self::parse_first_line(first);

        let (header, body) = match Self::locate_format2_header(&lines)? {
            Some((start, end)) => (lines[start + 1..end].join(","), end + 1),
            None if lines.len() > FORMAT1_HEADER_LINE => (
                lines[FORMAT1_HEADER_LINE].to_string(),
                FORMAT1_HEADER_LINE + 1,
            ),
            None => {
                return Ok(RawExport {
                    metadata,
                    ..RawExport::default()
                });
            }
        };

        let field_names = disambiguate(split_record(&header));
        let candidates: Vec<usize> = field_names
            .iter()
            .enumerate()
            .filter(|(_, name)| name.contains(DATETIME_TAG))
            .map(|(i, _)| i)
            .collect();
        let time_column = (candidates.len() == 1).then(|| candidates[0]);
        let rows = Self::scan_rows(&lines[body..], field_names.len(), time_column.unwrap_or(0));

        Ok(RawExport {
            field_names,
            rows,
            metadata,
            time_column,
            time_candidates: candidates.len(),
        })
    }

    /// Types the raw rows into a dataset
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::MissingTimeColumn`] when there are fields and
    /// rows but no single timestamp column.
    pub fn to_dataset(raw: RawExport) -> IngestResult<Dataset> {
        let RawExport {
            field_names,
            rows,
            metadata,
            time_column,
            time_candidates,
        } = raw;

        if field_names.is_empty() || rows.is_empty() {
            return Ok(Dataset::empty(metadata));
        }
        let time_column = time_column.ok_or(IngestError::MissingTimeColumn {
            found: time_candidates,
        })?;

        let mut index = Vec::with_capacity(rows.len());
        let mut kept = Vec::with_capacity(rows.len());
        let mut dropped = 0usize;
        for row in &rows {
            match parse_timestamp(&row[time_column]) {
                Some(ts) => {
                    index.push(ts);
                    kept.push(row);
                }
                None => dropped += 1,
            }
        }
        if dropped > 0 {
            tracing::warn!(
                rows = dropped,
                column = %field_names[time_column],
                "Dropped rows with unparseable timestamps"
            );
        }

        let columns = field_names
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != time_column)
            .map(|(i, name)| {
                let cells: Vec<&str> = kept.iter().map(|row| row[i].as_str()).collect();
                Column {
                    name: name.clone(),
                    values: ColumnValues::infer(&cells),
                }
            })
            .collect();

        Ok(Dataset::new(index, columns, metadata)?)
    }

    /// Reads system and revision from the first line
    ///
    /// The part before the first comma is a `/`-separated path such as
    /// `Merged/SYSTEM_1/R12`; a leading `Merged` is skipped.
    fn parse_first_line(line: &str) -> Metadata {
        let head = line.split(SEPARATOR).next().unwrap_or_default();
        let mut parts = head
            .split('/')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .peekable();
        if parts.peek().is_some_and(|p| p.eq_ignore_ascii_case("merged")) {
            parts.next();
        }
        let system = parts.next().map(str::to_string);
        let revision = parts.next().map(str::to_string);
        Metadata {
            system,
            revision,
            ..Metadata::default()
        }
    }

    /// Finds the last start marker and the first end marker after it
    ///
    /// Files glued together by the exporter's merge repeat the header; only
    /// the last copy describes the rows that follow.
    fn locate_format2_header(lines: &[&str]) -> IngestResult<Option<(usize, usize)>> {
        let Some(start) = lines.iter().rposition(|l| l.trim() == START_HEADER_TAG) else {
            return Ok(None);
        };
        let end = lines[start + 1..]
            .iter()
            .position(|l| l.trim() == END_HEADER_TAG)
            .map(|offset| start + 1 + offset)
            .ok_or_else(|| {
                IngestError::MalformedHeader(format!(
                    "'{START_HEADER_TAG}' on line {} has no matching '{END_HEADER_TAG}'",
                    start + 1
                ))
            })?;
        Ok(Some((start, end)))
    }

    /// Collects data rows up to the sentinel average row
    fn scan_rows(lines: &[&str], width: usize, time_column: usize) -> Vec<Vec<String>> {
        let mut rows = Vec::new();
        for (offset, line) in lines.iter().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let cells = split_record(line);
            if cells.len() != width {
                tracing::debug!(
                    line = offset + 1,
                    expected = width,
                    found = cells.len(),
                    "Skipping row with unexpected column count"
                );
                continue;
            }
            if cells[time_column].trim_start().starts_with(SENTINEL_MARKER) {
                let discarded = lines.len() - offset;
                tracing::debug!(discarded, "Sentinel average row reached");
                break;
            }
            rows.push(cells);
        }
        rows
    }
}

/// Splits one CSV record, honouring double quotes
///
/// Quoted fields may contain separators and `""` escapes. Cells are
/// trimmed of surrounding whitespace.
#[must_use]
pub fn split_record(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => in_quotes = !in_quotes,
            c if c == SEPARATOR && !in_quotes => {
                cells.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    cells.push(current.trim().to_string());
    cells
}

/// Parses an exporter or checkpoint timestamp
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    std::iter::once(T4_DATE_FORMAT)
        .chain(FALLBACK_DATE_FORMATS.iter().copied())
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

/// Renames repeated header fields `X`, `X.1`, `X.2`, ...
fn disambiguate(fields: Vec<String>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::with_capacity(fields.len());
    fields
        .into_iter()
        .map(|name| {
            let mut candidate = name.clone();
            let mut n = 1;
            while seen.contains(&candidate) {
                candidate = format!("{name}.{n}");
                n += 1;
            }
            seen.insert(candidate.clone());
            candidate
        })
        .collect()
}
