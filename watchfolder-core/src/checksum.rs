//! SHA-256 content checksums used to decide whether a file has settled.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{io_err, StoreError};

/// Marker checksum for a path that does not exist at check time.
///
/// It can never collide with a hex digest.
pub const ABSENT: &str = "absent";

/// Lowercase hex SHA-256 digest of a file's full byte content.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checksum(String);

impl Checksum {
    pub fn absent() -> Self {
        Self(ABSENT.to_string())
    }

    pub fn is_absent(&self) -> bool {
        self.0 == ABSENT
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digest of an in-memory buffer.
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Checksum {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Checksum {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Stream `path` through SHA-256.
pub fn file_checksum(path: &Path) -> Result<Checksum, StoreError> {
    let mut file = File::open(path).map_err(|e| io_err(path, e))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
    Ok(Checksum(hex::encode(hasher.finalize())))
}
