//! Ingestion of T4 exporter CSV files
//!
//! The exporter writes two layouts. Format 2 wraps the header line between
//! `$$$ START COLUMN HEADERS $$$` and `$$$ END COLUMN HEADERS $$$` markers;
//! format 1 puts it on the fourth line. Both may end with a bogus
//! "Column Average" row that has to be cut off together with anything after
//! it. Parsing is pure: bytes in, [`Dataset`](crate::dataset::Dataset) out.

mod archive;
mod parser;

use thiserror::Error;

use crate::dataset::DatasetError;

pub use archive::{ArchiveMember, extract_csv_members};
pub use parser::{RawExport, T4CsvParser, parse_timestamp, split_record};

/// Field separator
pub const SEPARATOR: char = ',';
/// Opening marker of a format 2 header
pub const START_HEADER_TAG: &str = "$$$ START COLUMN HEADERS $$$";
/// Closing marker of a format 2 header
pub const END_HEADER_TAG: &str = "$$$ END COLUMN HEADERS $$$";
/// Substring identifying the sample timestamp column
pub const DATETIME_TAG: &str = "Sample Time";
/// Value in the timestamp column that marks the trailing average row
pub const SENTINEL_MARKER: &str = "Column Average";
/// Timestamp layout written by the exporter, e.g. `2015-Jun-05 10:00:00.00`
pub const T4_DATE_FORMAT: &str = "%Y-%b-%d %H:%M:%S%.f";

/// Errors raised while turning an export into a dataset
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// Zero or several header fields contain the timestamp tag
    #[error("Expected exactly one '{DATETIME_TAG}' column, found {found}")]
    MissingTimeColumn {
        /// Number of candidate columns
        found: usize,
    },

    /// The header markers are unbalanced
    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    /// A zip archive could not be read
    #[error("Unreadable archive {name}: {reason}")]
    Archive {
        /// Archive file name
        name: String,
        /// Underlying failure
        reason: String,
    },

    /// The parsed table is inconsistent
    #[error(transparent)]
    Dataset(#[from] DatasetError),
}

/// Result type for ingestion
pub type IngestResult<T> = Result<T, IngestError>;
