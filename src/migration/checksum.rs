//! Checksum calculation for migration files

use sha2::{Digest, Sha256};

/// Hex-encoded SHA-256 of a migration file's content
///
/// Stored alongside each applied version so `validate` can detect files
/// that were edited after they ran.
pub fn checksum(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    format!("{:x}", hasher.finalize())
}

/// Compare a stored checksum with a freshly calculated one
///
/// Versions marked before checksums were recorded have no stored value and always pass.
pub fn checksum_matches(stored: Option<&str>, current: &str) -> bool {
    stored.map_or(true, |stored| stored == current)
}
