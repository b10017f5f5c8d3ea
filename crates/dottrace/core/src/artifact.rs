// Dottrace
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Supplementary artifact framing.
//!
//! Both build stages persist their result next to the trace so a later run
//! can attach to it instead of re-processing the event source. The framing
//! is shared: a magic tag, a format version, a completeness flag and a
//! crc32 checksum ahead of an opaque payload. An artifact whose header does
//! not validate, or whose completeness flag is unset, is stale and gets
//! rebuilt.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Magic tag of state-system (`.ht`) artifacts
pub const STATE_SYSTEM_MAGIC: [u8; 4] = *b"DTHT";
/// Magic tag of segment-store (`.dat`) artifacts
pub const SEGMENT_STORE_MAGIC: [u8; 4] = *b"DTSG";
/// Current artifact format version
const ARTIFACT_VERSION: u32 = 1;

/// Flag bit: the payload covers the whole event source
const FLAG_COMPLETE: u8 = 0b0000_0001;

/// Errors raised by artifact reads and writes.
#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("artifact carries a foreign magic tag")]
    BadMagic,

    #[error("unsupported artifact version {0}")]
    UnsupportedVersion(u32),

    #[error("artifact checksum mismatch")]
    ChecksumMismatch,

    #[error("artifact codec failure: {0}")]
    Codec(String),
}

/// Result alias for artifact operations.
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// Writes `payload` to `path` under the framing header.
///
/// `complete` records whether the payload covers the whole event source;
/// partial payloads are readable but never reused as a build shortcut.
pub fn write(path: &Path, magic: [u8; 4], payload: &[u8], complete: bool) -> ArtifactResult<()> {
    let mut hasher = crc32fast::Hasher::new();
    hasher.update(payload);
    let checksum = hasher.finalize();

    let mut file = File::create(path)?;
    file.write_all(&magic)?;
    file.write_u32::<LittleEndian>(ARTIFACT_VERSION)?;
    file.write_u8(if complete { FLAG_COMPLETE } else { 0 })?;
    file.write_u64::<LittleEndian>(payload.len() as u64)?;
    file.write_u32::<LittleEndian>(checksum)?;
    file.write_all(payload)?;
    file.sync_all()?;
    debug!(path = %path.display(), bytes = payload.len(), complete, "artifact written");
    Ok(())
}

/// Reads and validates the artifact at `path`.
///
/// Returns the payload and its completeness flag. Any framing violation
/// (foreign magic, unknown version, checksum mismatch, truncation) is an
/// error; staleness decisions are the caller's.
pub fn read(path: &Path, magic: [u8; 4]) -> ArtifactResult<(Vec<u8>, bool)> {
    let mut file = File::open(path)?;

    let mut tag = [0u8; 4];
    file.read_exact(&mut tag)?;
    if tag != magic {
        return Err(ArtifactError::BadMagic);
    }

    let version = file.read_u32::<LittleEndian>()?;
    if version != ARTIFACT_VERSION {
        return Err(ArtifactError::UnsupportedVersion(version));
    }

    let flags = file.read_u8()?;
    let payload_len = file.read_u64::<LittleEndian>()? as usize;
    let checksum = file.read_u32::<LittleEndian>()?;

    let mut payload = vec![0u8; payload_len];
    file.read_exact(&mut payload)?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != checksum {
        return Err(ArtifactError::ChecksumMismatch);
    }

    Ok((payload, flags & FLAG_COMPLETE != 0))
}

/// Whether a valid, complete artifact exists at `path`.
pub fn is_reusable(path: &Path, magic: [u8; 4]) -> bool {
    match read(path, magic) {
        Ok((_, complete)) => complete,
        Err(error) => {
            debug!(path = %path.display(), %error, "artifact not reusable");
            false
        }
    }
}

/// Removes the artifact at `path`; a missing file is not an error.
pub fn invalidate(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => Err(error),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_payload_and_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.ht");

        write(&path, STATE_SYSTEM_MAGIC, b"payload bytes", true).unwrap();
        let (payload, complete) = read(&path, STATE_SYSTEM_MAGIC).unwrap();

        assert_eq!(payload, b"payload bytes");
        assert!(complete);
        assert!(is_reusable(&path, STATE_SYSTEM_MAGIC));
    }

    #[test]
    fn test_incomplete_artifact_is_not_reusable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.dat");

        write(&path, SEGMENT_STORE_MAGIC, b"partial", false).unwrap();

        assert!(read(&path, SEGMENT_STORE_MAGIC).is_ok());
        assert!(!is_reusable(&path, SEGMENT_STORE_MAGIC));
    }

    #[test]
    fn test_wrong_magic_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.ht");

        write(&path, SEGMENT_STORE_MAGIC, b"data", true).unwrap();

        assert!(matches!(read(&path, STATE_SYSTEM_MAGIC), Err(ArtifactError::BadMagic)));
    }

    #[test]
    fn test_corrupted_payload_fails_checksum() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stats.ht");

        write(&path, STATE_SYSTEM_MAGIC, b"pristine payload", true).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        assert!(matches!(read(&path, STATE_SYSTEM_MAGIC), Err(ArtifactError::ChecksumMismatch)));
        assert!(!is_reusable(&path, STATE_SYSTEM_MAGIC));
    }

    #[test]
    fn test_invalidate_tolerates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.ht");
        assert!(invalidate(&path).is_ok());

        write(&path, STATE_SYSTEM_MAGIC, b"x", true).unwrap();
        assert!(invalidate(&path).is_ok());
        assert!(!path.exists());
    }
}
