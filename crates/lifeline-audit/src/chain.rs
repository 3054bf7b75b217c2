//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   3. canonical JSON of the record (serde_json, no pretty-printing)
//!
//! The record carries every other entry field (id, timestamp, event type,
//! severity, actor, resource, action, outcome and both detail forms), so the
//! hash commits to the whole entry.

use sha2::{Digest, Sha256};

use lifeline_contracts::{
    audit::{AuditLogEntry, AuditRecord},
    error::{LifelineError, LifelineResult},
};

/// Compute the SHA-256 integrity hash for one entry.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_entry(sequence: u64, prev_hash: &str, record: &AuditRecord) -> LifelineResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| LifelineError::AuditFailure {
        reason: format!("audit record could not be serialized: {}", e),
    })?;

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// Recompute one entry's hash and compare it with the stored value.
pub fn verify_entry(entry: &AuditLogEntry) -> bool {
    hash_entry(entry.sequence, &entry.prev_hash, &entry.record)
        .map(|h| h == entry.integrity_hash)
        .unwrap_or(false)
}

/// Sequence number of the first entry that breaks the chain, if any.
///
/// An entry breaks the chain when its `prev_hash` is not the previous
/// entry's `integrity_hash` (or the genesis hash for the first entry), when
/// its sequence is not consecutive, or when its own hash does not verify.
pub fn first_break(entries: &[AuditLogEntry]) -> Option<u64> {
    let mut expected_prev = AuditLogEntry::GENESIS_HASH.to_string();
    let mut expected_sequence = 0u64;

    for entry in entries {
        if entry.sequence != expected_sequence
            || entry.prev_hash != expected_prev
            || !verify_entry(entry)
        {
            return Some(entry.sequence);
        }
        expected_prev = entry.integrity_hash.clone();
        expected_sequence += 1;
    }
    None
}

/// True when the whole chain, starting at genesis, verifies. An empty chain
/// is valid.
pub fn verify_chain(entries: &[AuditLogEntry]) -> bool {
    first_break(entries).is_none()
}
