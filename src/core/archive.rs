//! Archive assembler: packages a file set into one downloadable zip.

use std::io::{Cursor, Write};

use tracing::debug;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use crate::error::ArchiveError;
use crate::models::FileSet;

/// Build an in-memory zip with one entry per path, content copied verbatim.
///
/// Entries are written in sorted path order with a fixed modification time,
/// so a given file set always produces byte-identical output.
pub fn build(files: &FileSet) -> Result<Vec<u8>, ArchiveError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    for (path, content) in files.iter() {
        writer.start_file(path, options)?;
        writer
            .write_all(content.as_bytes())
            .map_err(|source| ArchiveError::Entry {
                path: path.to_string(),
                source,
            })?;
    }

    let cursor = writer.finish()?;
    let bytes = cursor.into_inner();
    debug!("Built archive: {} entries, {} bytes", files.len(), bytes.len());
    Ok(bytes)
}
