//! Time-indexed tables with explicit metadata
//!
//! A [`Dataset`] is a column store indexed by sample timestamps. Metadata is
//! not an attribute that may or may not survive a transformation: every
//! operation here takes the metadata record and hands it to its output.

mod select;

use std::collections::HashMap;
use std::ops::Range;
use std::path::PathBuf;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use select::{matches_pattern, matching_columns};

/// Errors raised when building or combining datasets
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DatasetError {
    /// A column does not have one value per index entry
    #[error("Column '{column}' has {found} values but the index has {expected}")]
    LengthMismatch {
        /// Offending column
        column: String,
        /// Index length
        expected: usize,
        /// Column length
        found: usize,
    },

    /// Two columns share a name
    #[error("Duplicate column '{0}'")]
    DuplicateColumn(String),

    /// The same column holds numbers in one part and text in another
    #[error("Column '{column}' is {existing} in one part and {incoming} in another")]
    IncompatibleColumn {
        /// Offending column
        column: String,
        /// Kind already present
        existing: ColumnKind,
        /// Kind being merged in
        incoming: ColumnKind,
    },
}

/// Result type for dataset operations
pub type DatasetResult<T> = Result<T, DatasetError>;

/// Out-of-band attributes that travel with a table
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// System identifier embedded in the export or assigned by the collector
    pub system: Option<String>,
    /// Exporter revision string from the first line of the file
    pub revision: Option<String>,
    /// Files the rows came from, in load order
    pub source_files: Vec<String>,
    /// When the table was produced
    pub generated_at: Option<NaiveDateTime>,
    /// Settings file in effect when the table was produced
    pub settings_path: Option<PathBuf>,
}

impl Metadata {
    /// Metadata for rows that belong to `system`
    #[must_use]
    pub fn for_system(system: impl Into<String>) -> Self {
        Self {
            system: Some(system.into()),
            ..Self::default()
        }
    }

    /// Folds `other` into `self`
    ///
    /// Scalar slots keep the first value seen, source files accumulate
    /// without duplicates and `generated_at` keeps the latest timestamp.
    pub fn merge(&mut self, other: &Self) {
        if self.system.is_none() {
            self.system.clone_from(&other.system);
        }
        if self.revision.is_none() {
            self.revision.clone_from(&other.revision);
        }
        if self.settings_path.is_none() {
            self.settings_path.clone_from(&other.settings_path);
        }
        for file in &other.source_files {
            if !self.source_files.contains(file) {
                self.source_files.push(file.clone());
            }
        }
        self.generated_at = match (self.generated_at, other.generated_at) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };
    }
}

/// Storage kind of a column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnKind {
    /// Floating point samples
    Numeric,
    /// Free text
    Text,
}

impl std::fmt::Display for ColumnKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Numeric => f.write_str("numeric"),
            Self::Text => f.write_str("text"),
        }
    }
}

/// Values of one column; `None` is a missing sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "values", rename_all = "lowercase")]
pub enum ColumnValues {
    /// Numeric samples
    Numeric(Vec<Option<f64>>),
    /// Text samples
    Text(Vec<Option<String>>),
}

impl ColumnValues {
    /// A column of `len` missing values
    #[must_use]
    pub fn missing(kind: ColumnKind, len: usize) -> Self {
        match kind {
            ColumnKind::Numeric => Self::Numeric(vec![None; len]),
            ColumnKind::Text => Self::Text(vec![None; len]),
        }
    }

    /// Builds a column from raw cells
    ///
    /// The column is numeric when every non-empty cell parses as a finite
    /// float, text otherwise. Empty cells are missing either way.
    #[must_use]
    pub fn infer<S: AsRef<str>>(cells: &[S]) -> Self {
        let parsed: Option<Vec<Option<f64>>> = cells
            .iter()
            .map(|cell| {
                let cell = cell.as_ref().trim();
                if cell.is_empty() {
                    Some(None)
                } else {
                    cell.parse::<f64>().ok().filter(|v| v.is_finite()).map(Some)
                }
            })
            .collect();
        match parsed {
            Some(values) => Self::Numeric(values),
            None => Self::Text(
                cells
                    .iter()
                    .map(|cell| {
                        let cell = cell.as_ref().trim();
                        (!cell.is_empty()).then(|| cell.to_string())
                    })
                    .collect(),
            ),
        }
    }

    /// Number of values
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Numeric(v) => v.len(),
            Self::Text(v) => v.len(),
        }
    }

    /// Returns true if the column has no values
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Storage kind
    #[must_use]
    pub const fn kind(&self) -> ColumnKind {
        match self {
            Self::Numeric(_) => ColumnKind::Numeric,
            Self::Text(_) => ColumnKind::Text,
        }
    }

    /// Returns true if every value is missing
    #[must_use]
    pub fn is_all_missing(&self) -> bool {
        match self {
            Self::Numeric(v) => v.iter().all(Option::is_none),
            Self::Text(v) => v.iter().all(Option::is_none),
        }
    }

    /// Numeric values, if this is a numeric column
    #[must_use]
    pub fn as_numeric(&self) -> Option<&[Option<f64>]> {
        match self {
            Self::Numeric(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    /// Value at `row` rendered as text, `None` when missing
    #[must_use]
    pub fn display_at(&self, row: usize) -> Option<String> {
        match self {
            Self::Numeric(v) => v.get(row).copied().flatten().map(|x| x.to_string()),
            Self::Text(v) => v.get(row).cloned().flatten(),
        }
    }

    fn take(&self, rows: &[usize]) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(rows.iter().map(|&i| v[i]).collect()),
            Self::Text(v) => Self::Text(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    fn range(&self, range: Range<usize>) -> Self {
        match self {
            Self::Numeric(v) => Self::Numeric(v[range].to_vec()),
            Self::Text(v) => Self::Text(v[range].to_vec()),
        }
    }

    fn append(&mut self, other: Self) {
        match (self, other) {
            (Self::Numeric(a), Self::Numeric(b)) => a.extend(b),
            (Self::Text(a), Self::Text(b)) => a.extend(b),
            (Self::Numeric(a), Self::Text(b)) => a.extend(std::iter::repeat_n(None, b.len())),
            (Self::Text(a), Self::Numeric(b)) => a.extend(std::iter::repeat_n(None, b.len())),
        }
    }
}

/// A named column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    /// Metric name as it appears in the export header
    pub name: String,
    /// Column values, one per index entry
    pub values: ColumnValues,
}

impl Column {
    /// Creates a numeric column
    #[must_use]
    pub fn numeric(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Numeric(values),
        }
    }

    /// Creates a text column
    #[must_use]
    pub fn text(name: impl Into<String>, values: Vec<Option<String>>) -> Self {
        Self {
            name: name.into(),
            values: ColumnValues::Text(values),
        }
    }
}

/// A time-indexed table plus its metadata record
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Dataset {
    index: Vec<NaiveDateTime>,
    columns: Vec<Column>,
    metadata: Metadata,
}

impl Dataset {
    /// Builds a dataset, checking column lengths and name uniqueness
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` or `DuplicateColumn`.
    pub fn new(
        index: Vec<NaiveDateTime>,
        columns: Vec<Column>,
        metadata: Metadata,
    ) -> DatasetResult<Self> {
        let mut seen = HashMap::with_capacity(columns.len());
        for column in &columns {
            if column.values.len() != index.len() {
                return Err(DatasetError::LengthMismatch {
                    column: column.name.clone(),
                    expected: index.len(),
                    found: column.values.len(),
                });
            }
            if seen.insert(column.name.as_str(), ()).is_some() {
                return Err(DatasetError::DuplicateColumn(column.name.clone()));
            }
        }
        Ok(Self {
            index,
            columns,
            metadata,
        })
    }

    /// An empty table that still carries `metadata`
    #[must_use]
    pub fn empty(metadata: Metadata) -> Self {
        Self {
            index: Vec::new(),
            columns: Vec::new(),
            metadata,
        }
    }

    /// Number of rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if the table has no rows
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Number of columns
    #[must_use]
    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// `(rows, columns)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        (self.len(), self.width())
    }

    /// Row timestamps
    #[must_use]
    pub fn index(&self) -> &[NaiveDateTime] {
        &self.index
    }

    /// All columns in order
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Column names in order
    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    /// Looks a column up by exact name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Metadata record
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Mutable metadata record
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    /// Replaces the metadata record
    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// First and last timestamps
    #[must_use]
    pub fn time_span(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        let first = self.index.iter().min()?;
        let last = self.index.iter().max()?;
        Some((*first, *last))
    }

    /// Adds a column or replaces one with the same name
    ///
    /// # Errors
    ///
    /// Returns `LengthMismatch` if the column does not fit the index.
    pub fn upsert_column(&mut self, column: Column) -> DatasetResult<()> {
        if column.values.len() != self.index.len() {
            return Err(DatasetError::LengthMismatch {
                column: column.name,
                expected: self.index.len(),
                found: column.values.len(),
            });
        }
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
        Ok(())
    }

    /// Rows in `range`, clamped to the table
    #[must_use]
    pub fn slice(&self, range: Range<usize>) -> Self {
        let end = range.end.min(self.len());
        let start = range.start.min(end);
        Self {
            index: self.index[start..end].to_vec(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.range(start..end),
                })
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Rows for which `keep(row, timestamp)` is true
    #[must_use]
    pub fn filter_rows<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(usize, &NaiveDateTime) -> bool,
    {
        let rows: Vec<usize> = self
            .index
            .iter()
            .enumerate()
            .filter(|(i, ts)| keep(*i, ts))
            .map(|(i, _)| i)
            .collect();
        self.take_rows(&rows)
    }

    /// Rows at the given positions, in the given order
    ///
    /// # Panics
    ///
    /// Panics if a position is out of bounds.
    #[must_use]
    pub fn take_rows(&self, rows: &[usize]) -> Self {
        Self {
            index: rows.iter().map(|&i| self.index[i]).collect(),
            columns: self
                .columns
                .iter()
                .map(|c| Column {
                    name: c.name.clone(),
                    values: c.values.take(rows),
                })
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Restricts the table to `names`, in the given order
    ///
    /// Unknown names are ignored.
    #[must_use]
    pub fn select_columns<S: AsRef<str>>(&self, names: &[S]) -> Self {
        Self {
            index: self.index.clone(),
            columns: names
                .iter()
                .filter_map(|name| self.column(name.as_ref()).cloned())
                .collect(),
            metadata: self.metadata.clone(),
        }
    }

    /// Wildcard column selection
    ///
    /// Each pattern may contain `*`; a column matches when every
    /// `*`-separated fragment occurs in its name, in order and ignoring
    /// case. Columns whose values are all missing are never selected.
    #[must_use]
    pub fn select<S: AsRef<str>>(&self, patterns: &[S]) -> Self {
        let names = matching_columns(
            self.columns
                .iter()
                .filter(|c| !c.values.is_all_missing())
                .map(|c| c.name.as_str()),
            patterns,
        );
        self.select_columns(&names)
    }

    /// Appends `parts` row-wise, outer-joining their columns
    ///
    /// Columns are ordered by first appearance. A part that lacks a column
    /// contributes missing values for it. Metadata records are merged in
    /// order, so the first part's system id wins.
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleColumn` when a column is numeric in one part and
    /// text in another, unless one side holds only missing values.
    pub fn concat(parts: Vec<Self>) -> DatasetResult<Self> {
        let mut parts = parts.into_iter();
        let Some(mut acc) = parts.next() else {
            return Ok(Self::default());
        };
        for part in parts {
            acc.append(part)?;
        }
        Ok(acc)
    }

    /// Appends one part, see [`Dataset::concat`]
    ///
    /// # Errors
    ///
    /// Returns `IncompatibleColumn` for conflicting column kinds.
    pub fn append(&mut self, other: Self) -> DatasetResult<()> {
        let Self {
            index,
            columns,
            metadata,
        } = other;

        // Kinds are checked before anything is mutated
        for incoming in &columns {
            if let Some(existing) = self.column(&incoming.name) {
                check_compatible(&incoming.name, &existing.values, &incoming.values)?;
            }
        }

        let old_len = self.index.len();
        let added = index.len();
        let mut incoming: HashMap<String, ColumnValues> =
            columns.iter().map(|c| (c.name.clone(), c.values.clone())).collect();

        for column in &mut self.columns {
            match incoming.remove(&column.name) {
                Some(values) => {
                    if column.values.kind() != values.kind() && column.values.is_all_missing() {
                        column.values = ColumnValues::missing(values.kind(), old_len);
                    }
                    column.values.append(values);
                }
                None => column
                    .values
                    .append(ColumnValues::missing(column.values.kind(), added)),
            }
        }
        for column in columns {
            if let Some(values) = incoming.remove(&column.name) {
                let mut padded = ColumnValues::missing(values.kind(), old_len);
                padded.append(values);
                self.columns.push(Column {
                    name: column.name,
                    values: padded,
                });
            }
        }

        self.index.extend(index);
        self.metadata.merge(&metadata);
        Ok(())
    }
}

fn check_compatible(
    name: &str,
    existing: &ColumnValues,
    incoming: &ColumnValues,
) -> DatasetResult<()> {
    if existing.kind() == incoming.kind()
        || existing.is_all_missing()
        || incoming.is_all_missing()
    {
        return Ok(());
    }
    Err(DatasetError::IncompatibleColumn {
        column: name.to_string(),
        existing: existing.kind(),
        incoming: incoming.kind(),
    })
}
