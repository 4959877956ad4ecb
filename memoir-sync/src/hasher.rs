//! Content digests over synchronizable fields.
//!
//! The digest is the unit of comparison for conflict detection: two records
//! with identical synchronizable content hash identically regardless of how
//! their source files ordered the fields, and any single-character change
//! produces a different digest. Computation is pure: no I/O, no clock.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

/// A hex-encoded SHA-256 digest of a record's synchronizable fields.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHash(String);

impl ContentHash {
    /// Wraps a digest previously stored as a string.
    pub fn from_stored(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    /// Returns the digest as a hex string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Hashes a canonical field projection.
///
/// Keys and values are fed length-delimited in key order, so the digest is
/// injective over the projection and independent of any source ordering
/// (the `BTreeMap` already fixed the key order).
#[must_use]
pub fn content_hash(fields: &BTreeMap<String, String>) -> ContentHash {
    let mut hasher = Sha256::new();
    for (key, value) in fields {
        hasher.update((key.len() as u64).to_be_bytes());
        hasher.update(key.as_bytes());
        hasher.update((value.len() as u64).to_be_bytes());
        hasher.update(value.as_bytes());
    }
    ContentHash(hex::encode(hasher.finalize()))
}
