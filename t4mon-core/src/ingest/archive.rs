//! In-memory inflation of zipped exports

use std::io::{Cursor, Read};

use super::{IngestError, IngestResult};

/// One CSV file found inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveMember {
    /// `<archive>/<member path>`
    pub name: String,
    /// Inflated contents
    pub bytes: Vec<u8>,
}

/// Inflates every `.csv` member of a zip archive, sorted by member name
///
/// # Errors
///
/// Returns [`IngestError::Archive`] if the archive or one of its CSV
/// members cannot be read.
pub fn extract_csv_members(archive_name: &str, bytes: &[u8]) -> IngestResult<Vec<ArchiveMember>> {
    let fail = |reason: String| IngestError::Archive {
        name: archive_name.to_string(),
        reason,
    };
    let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).map_err(|e| fail(e.to_string()))?;

    let mut members = Vec::new();
    for i in 0..archive.len() {
        let mut file = archive.by_index(i).map_err(|e| fail(e.to_string()))?;
        if file.is_dir() || !file.name().to_lowercase().ends_with(".csv") {
            continue;
        }
        let name = format!("{archive_name}/{}", file.name());
        let mut content = Vec::new();
        file.read_to_end(&mut content)
            .map_err(|e| fail(format!("{name}: {e}")))?;
        members.push(ArchiveMember {
            name,
            bytes: content,
        });
    }
    members.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(members)
}
