//! Content fingerprinting for extraction-cache checks.

use std::fs::File;
use std::io::{ErrorKind, Read};
use std::path::Path;

/// Chunk size for streaming reads.
const CHUNK: usize = 4096;

/// CRC-32 of everything remaining in `reader`, as lowercase hex.
///
/// A read error mid-stream does not fail the call: the checksum of the
/// bytes read so far is returned instead. Cache directories written by
/// earlier runs are keyed this way, so changing the answer here would
/// orphan them. The truncated fingerprint will simply never match a
/// complete copy, forcing a re-extraction.
pub fn crc(reader: &mut dyn Read) -> String {
    let mut hasher = crc32fast::Hasher::new();
    let mut buffer = [0u8; CHUNK];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                tracing::warn!(
                    "read failed mid-checksum, fingerprinting the truncated prefix: {}",
                    err
                );
                break;
            }
        }
    }
    format!("{:x}", hasher.finalize())
}

/// CRC-32 of a file's contents, or `None` if the file cannot be opened.
pub fn crc_of_file(path: &Path) -> Option<String> {
    match File::open(path) {
        Ok(mut file) => Some(crc(&mut file)),
        Err(err) => {
            tracing::debug!("cannot fingerprint {}: {}", path.display(), err);
            None
        }
    }
}
