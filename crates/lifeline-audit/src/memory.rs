//! In-memory audit store.
//!
//! `InMemoryAuditStore` is the reference `AuditSink`. It keeps persisted
//! entries in append order behind a `Mutex` and answers audit queries. Every
//! entry returned from `query` is re-hashed, and tampered entries are flagged
//! rather than hidden.

use std::sync::Mutex;

use tracing::{info, warn};

use lifeline_contracts::{
    audit::{AuditLogEntry, AuditQuery, VerifiedAuditEntry},
    error::{LifelineError, LifelineResult},
};
use lifeline_core::traits::AuditSink;

use crate::chain::{first_break, verify_entry};

// ── Store ─────────────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryAuditStore {
    entries: Mutex<Vec<AuditLogEntry>>,
}

impl InMemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A copy of every stored entry, in chain order.
    pub fn entries(&self) -> LifelineResult<Vec<AuditLogEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit store", e))?;
        Ok(entries.clone())
    }

    /// Filter by `query`, newest first, then apply offset and limit.
    pub fn query(&self, query: &AuditQuery) -> LifelineResult<Vec<VerifiedAuditEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit store", e))?;

        let results: Vec<VerifiedAuditEntry> = entries
            .iter()
            .rev()
            .filter(|entry| query.matches(&entry.record))
            .skip(query.offset)
            .take(query.limit)
            .map(|entry| {
                let intact = verify_entry(entry);
                if !intact {
                    warn!(
                        audit_id = %entry.record.id,
                        sequence = entry.sequence,
                        "audit entry failed integrity check"
                    );
                }
                VerifiedAuditEntry {
                    entry: entry.clone(),
                    intact,
                }
            })
            .collect();

        Ok(results)
    }

    /// Sequence number of the first entry that breaks the stored chain.
    pub fn first_break(&self) -> LifelineResult<Option<u64>> {
        let entries = self
            .entries
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit store", e))?;
        Ok(first_break(&entries))
    }

    /// True when the whole stored chain verifies from genesis.
    pub fn verify_integrity(&self) -> bool {
        matches!(self.first_break(), Ok(None))
    }

    /// Direct access to the stored rows, bypassing the chain. Stands in for
    /// someone editing the backing table.
    pub fn with_raw_entries<R>(&self, f: impl FnOnce(&mut Vec<AuditLogEntry>) -> R) -> LifelineResult<R> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit store", e))?;
        Ok(f(&mut entries))
    }
}

// ── AuditSink impl ────────────────────────────────────────────────────────────

impl AuditSink for InMemoryAuditStore {
    fn persist(&self, batch: &[AuditLogEntry]) -> LifelineResult<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit store", e))?;
        entries.extend_from_slice(batch);

        info!(
            persisted = batch.len(),
            total = entries.len(),
            last_hash = %entries.last().map(|e| e.integrity_hash.as_str()).unwrap_or(""),
            "audit batch persisted"
        );
        Ok(())
    }
}
