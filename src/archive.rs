//! Output archive assembly
//!
//! Successful captures are packed into a ZIP whose entry names are derived
//! from the job index, never from completion order, so repeated runs of
//! the same batch produce identically laid out archives.

use std::io::{Cursor, Write};

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{Error, Result};

/// Deterministic, zero-padded entry name for a job's capture
pub fn entry_name(job_index: usize) -> String {
    format!("screenshot_{:04}.png", job_index)
}

/// Pack `(job_index, png_bytes)` pairs into an in-memory ZIP archive.
///
/// PNG payloads are already compressed, so entries are stored rather than
/// deflated again.
pub fn build_archive<'a, I>(entries: I) -> Result<Vec<u8>>
where
    I: IntoIterator<Item = (usize, &'a [u8])>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for (job_index, bytes) in entries {
        writer
            .start_file(entry_name(job_index), options)
            .map_err(|e| Error::Archive(e.to_string()))?;
        writer.write_all(bytes)?;
    }

    let cursor = writer
        .finish()
        .map_err(|e| Error::Archive(e.to_string()))?;
    Ok(cursor.into_inner())
}
