//! Canonical serialization for content checksums.
//!
//! Records serialize in a canonical, deterministic format so that two
//! snapshots with identical content always produce identical checksums.
//!
//! ## Determinism Guarantees
//!
//! - Stable field order: struct fields serialize in declaration order
//! - Stable Vec order: vectors serialize in index order
//! - No HashMap allowed: use BTreeMap for maps in checksummed data

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Serialize a value to canonical JSON bytes.
pub fn to_canonical_bytes<T: Serialize>(value: &T) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec(value)
}

/// SHA-256 checksum of a value's canonical bytes, as lowercase hex.
pub fn content_checksum<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = to_canonical_bytes(value)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}
