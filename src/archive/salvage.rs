//! Best-effort reassembly of damaged packages
//!
//! Entries are enumerated through the central directory when it is readable, otherwise by
//! scanning for local file headers and reading each one as a stream. Every entry that can
//! be opened is copied into a fresh package; an entry whose data fails to decompress is
//! truncated at the point of failure.

use std::collections::HashSet;
use std::io::{Cursor, Read, Write};

use tracing::{debug, info, warn};
use zip::result::ZipResult;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::ParseError;

const LOCAL_HEADER_SIGNATURE: &[u8; 4] = b"PK\x03\x04";
const MIMETYPE_ENTRY: &str = "mimetype";

/// An entry recovered from a damaged package
#[derive(Debug)]
pub(crate) struct RecoveredEntry {
    pub name: String,
    pub data: Vec<u8>,
    /// Whether decompression failed partway and `data` is incomplete
    pub truncated: bool,
}

/// Rebuild a structurally valid package from whatever entries of `bytes` survive
pub(crate) fn salvage(bytes: &[u8]) -> Result<Vec<u8>, ParseError> {
    let entries = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(mut zip) => indexed_entries(&mut zip),
        Err(e) => {
            warn!(error = %e, "central directory unreadable, scanning local headers");
            streamed_entries(bytes)
        }
    };

    if entries.is_empty() {
        return Err(ParseError::SalvageFailed {
            reason: "no entries could be recovered".to_string(),
        });
    }

    let truncated = entries.iter().filter(|e| e.truncated).count();
    info!(
        entries = entries.len(),
        truncated = truncated,
        "recovered package entries"
    );

    rebuild(entries)
}

/// Enumerate entries by central directory index
pub(crate) fn indexed_entries<R: Read + std::io::Seek>(
    zip: &mut ZipArchive<R>,
) -> Vec<RecoveredEntry> {
    let mut entries = Vec::new();

    for index in 0..zip.len() {
        let mut file = match zip.by_index(index) {
            Ok(file) => file,
            Err(e) => {
                warn!(index = index, error = %e, "dropping entry that cannot be opened");
                continue;
            }
        };
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let (data, truncated) = copy_until_error(&mut file, &name);
        entries.push(RecoveredEntry {
            name,
            data,
            truncated,
        });
    }

    entries
}

/// Enumerate entries by scanning for local file headers
pub(crate) fn streamed_entries(bytes: &[u8]) -> Vec<RecoveredEntry> {
    let mut entries = Vec::new();
    let mut offset = 0;

    while let Some(found) = find_signature(bytes, offset) {
        let mut next = found + LOCAL_HEADER_SIGNATURE.len();

        match read_local_entry(&bytes[found..]) {
            Ok(Some((entry, consumed))) => {
                entries.extend(entry);
                next = next.max(found + consumed);
            }
            // reached the central directory
            Ok(None) => break,
            Err(e) => {
                debug!(offset = found, error = %e, "skipping unreadable local header");
            }
        }

        offset = next;
    }

    entries
}

/// Read the entry whose local header starts `slice`; returns the entry (None for
/// directories) and the number of bytes it occupies
fn read_local_entry(slice: &[u8]) -> ZipResult<Option<(Option<RecoveredEntry>, usize)>> {
    let mut cursor = Cursor::new(slice);
    let entry = {
        let Some(mut file) = zip::read::read_zipfile_from_stream(&mut cursor)? else {
            return Ok(None);
        };
        if file.is_dir() {
            None
        } else {
            let name = file.name().to_string();
            let (data, truncated) = copy_until_error(&mut file, &name);
            Some(RecoveredEntry {
                name,
                data,
                truncated,
            })
        }
        // dropping the file drains the rest of its data
    };
    Ok(Some((entry, cursor.position() as usize)))
}

fn find_signature(bytes: &[u8], from: usize) -> Option<usize> {
    bytes
        .get(from..)?
        .windows(LOCAL_HEADER_SIGNATURE.len())
        .position(|w| w == LOCAL_HEADER_SIGNATURE)
        .map(|pos| from + pos)
}

/// Read until end of stream or the first error; returns the bytes read and whether the
/// read stopped early
fn copy_until_error(reader: &mut impl Read, name: &str) -> (Vec<u8>, bool) {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];

    loop {
        match reader.read(&mut buf) {
            Ok(0) => return (data, false),
            Ok(n) => data.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                warn!(
                    entry = %name,
                    recovered_bytes = data.len(),
                    error = %e,
                    "entry data damaged, truncating"
                );
                return (data, true);
            }
        }
    }
}

/// Write recovered entries into a new package
fn rebuild(entries: Vec<RecoveredEntry>) -> Result<Vec<u8>, ParseError> {
    let failed = |e: &dyn std::fmt::Display| ParseError::SalvageFailed {
        reason: format!("failed to rebuild package: {e}"),
    };

    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let stored = FileOptions::default().compression_method(CompressionMethod::Stored);
    let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut seen = HashSet::new();
    // mimetype goes first, uncompressed
    let (mimetype, rest): (Vec<_>, Vec<_>) = entries
        .into_iter()
        .partition(|entry| entry.name == MIMETYPE_ENTRY);

    for entry in mimetype.into_iter().chain(rest) {
        if !seen.insert(entry.name.clone()) {
            debug!(entry = %entry.name, "dropping duplicate entry");
            continue;
        }
        let options = if entry.name == MIMETYPE_ENTRY {
            stored
        } else {
            deflated
        };
        writer
            .start_file(entry.name.as_str(), options)
            .map_err(|e| failed(&e))?;
        writer.write_all(&entry.data).map_err(|e| failed(&e))?;
    }

    let cursor = writer.finish().map_err(|e| failed(&e))?;
    Ok(cursor.into_inner())
}
