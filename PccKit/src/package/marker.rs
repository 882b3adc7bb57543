//! Trailing marker identifying packages this tool has written

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::error::Result;

/// Bytes appended to the end of a processed package
pub const PROCESSED_MARKER: &[u8; 24] = b"PccKitProcessedPackage\0\0";

/// Whether the file at `path` ends with [`PROCESSED_MARKER`]
pub fn has_processed_marker(path: impl AsRef<Path>) -> Result<bool> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    stream_has_marker(&mut file, len)
}

pub(crate) fn stream_has_marker<R: Read + Seek>(reader: &mut R, stream_len: u64) -> Result<bool> {
    let marker_len = PROCESSED_MARKER.len() as u64;
    if stream_len < marker_len {
        return Ok(false);
    }
    reader.seek(SeekFrom::Start(stream_len - marker_len))?;
    let mut tail = [0u8; 24];
    reader.read_exact(&mut tail)?;
    Ok(&tail == PROCESSED_MARKER)
}
