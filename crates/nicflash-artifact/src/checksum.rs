//! MD5 digests for firmware packages

use std::fmt;
use std::path::Path;

use md5::{Digest, Md5};
use tokio::io::AsyncReadExt;

use crate::error::ArtifactError;

const READ_CHUNK: usize = 64 * 1024;

/// A validated, lowercase MD5 hex digest
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checksum(String);

impl Checksum {
    /// Length of an MD5 digest in hex characters
    pub const HEX_LEN: usize = 32;

    /// Parse a declared checksum
    ///
    /// # Errors
    /// Returns `ArtifactError::InvalidChecksum` unless `value` is exactly 32
    /// hex characters (surrounding whitespace is ignored).
    pub fn parse(value: &str) -> Result<Self, ArtifactError> {
        let trimmed = value.trim();
        if trimmed.len() != Self::HEX_LEN || !trimmed.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ArtifactError::InvalidChecksum(value.to_string()));
        }
        Ok(Self(trimmed.to_ascii_lowercase()))
    }

    /// Digest of an in-memory buffer
    #[must_use]
    pub fn of_bytes(data: &[u8]) -> Self {
        Self(hex::encode(Md5::digest(data)))
    }

    /// Digest accumulated by a hasher
    #[must_use]
    pub fn from_hasher(hasher: Md5) -> Self {
        Self(hex::encode(hasher.finalize()))
    }

    /// Digest of a file on disk, read in chunks
    ///
    /// # Errors
    /// Returns `ArtifactError::Io` if the file cannot be read.
    pub async fn of_file(path: &Path) -> Result<Self, ArtifactError> {
        let mut file = tokio::fs::File::open(path)
            .await
            .map_err(|e| ArtifactError::io(path, e))?;
        let mut hasher = Md5::new();
        let mut buf = vec![0u8; READ_CHUNK];
        loop {
            let n = file
                .read(&mut buf)
                .await
                .map_err(|e| ArtifactError::io(path, e))?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
        }
        Ok(Self::from_hasher(hasher))
    }

    /// Hex representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
