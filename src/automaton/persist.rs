//! Static index persistence.
//!
//! On-disk layout: the lowercase hex SHA-256 of the payload, a newline, then
//! the JSON payload. Loading memory-maps the file and rejects any blob whose
//! digest or structure does not check out.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::index::CorpusIndex;

/// Current payload format version.
pub const FORMAT_VERSION: u32 = 1;

const DIGEST_HEX_LEN: usize = 64;

/// Errors raised while saving or loading a static index.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("Malformed index: {0}")]
    Malformed(String),

    #[error("Unsupported index format version {0}")]
    UnsupportedVersion(u32),
}

impl CorpusIndex {
    /// Serialize into the checksummed blob format.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| IndexError::Malformed(format!("failed to encode index: {}", e)))?;
        let digest = hex::encode(Sha256::digest(&payload));

        let mut out = Vec::with_capacity(DIGEST_HEX_LEN + 1 + payload.len());
        out.extend_from_slice(digest.as_bytes());
        out.push(b'\n');
        out.extend_from_slice(&payload);
        Ok(out)
    }

    /// Parse and validate a blob produced by [`CorpusIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let split = bytes
            .iter()
            .position(|&b| b == b'\n')
            .ok_or_else(|| IndexError::Malformed("missing checksum header".into()))?;
        if split != DIGEST_HEX_LEN {
            return Err(IndexError::Malformed("checksum header has wrong length".into()));
        }

        let expected = std::str::from_utf8(&bytes[..split])
            .map_err(|_| IndexError::Malformed("checksum header is not UTF-8".into()))?
            .to_ascii_lowercase();
        let payload = &bytes[split + 1..];
        let actual = hex::encode(Sha256::digest(payload));
        if expected != actual {
            return Err(IndexError::ChecksumMismatch { expected, actual });
        }

        let index: CorpusIndex = serde_json::from_slice(payload)
            .map_err(|e| IndexError::Malformed(format!("invalid index payload: {}", e)))?;
        if index.format_version != FORMAT_VERSION {
            return Err(IndexError::UnsupportedVersion(index.format_version));
        }
        index.automaton.verify_structure().map_err(IndexError::Malformed)?;
        Ok(index)
    }

    /// Write the index to `path`, replacing any existing file.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let bytes = self.to_bytes()?;
        std::fs::write(path, bytes)?;
        tracing::info!(
            path = %path.display(),
            tokens = self.automaton.len(),
            states = self.automaton.num_states(),
            "static index saved"
        );
        Ok(())
    }

    /// Load an index previously written by [`CorpusIndex::save`].
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        // SAFETY: the mapping is read-only and only lives for the duration of
        // this call; index files are not modified while being loaded.
        let mmap = unsafe { Mmap::map(&file)? };
        let index = Self::from_bytes(&mmap)?;
        tracing::info!(
            path = %path.display(),
            tokens = index.automaton.len(),
            states = index.automaton.num_states(),
            "static index loaded"
        );
        Ok(index)
    }
}
