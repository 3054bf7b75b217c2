//! Buffered audit logger.
//!
//! `BufferedAuditLogger` implements `AuditLogger`. Each `log` call:
//!
//! 1. builds an `AuditRecord`, sealing PHI-bearing details through the
//!    configured `FieldCipher`;
//! 2. under the chain mutex, assigns the next sequence number, links to the
//!    previous hash, computes the integrity hash and pushes the entry into
//!    the buffer;
//! 3. flushes when the buffer is full or the entry is critical.
//!
//! Flushes are serialized by a second mutex that also owns the fallback
//! queue, so batches reach the sink in chain order. A failed batch stays at
//! the head of the fallback queue and is retried before anything newer.
//! After `max_retries` failed attempts it is parked for manual
//! reconciliation. Operators are notified on the first failure of a batch
//! and again when it is parked, and each of those moments also lands on the
//! chain as an `audit_failure` entry. None of this is ever surfaced to the
//! caller of `log`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use lifeline_contracts::{
    audit::{
        AuditEventType, AuditLogEntry, AuditOutcome, AuditRecord, AuditRequest, AuditSeverity,
        SealedBlob,
    },
    config::LifelineConfig,
    error::{LifelineError, LifelineResult},
    notify::Notification,
};
use lifeline_core::traits::{AuditLogger, AuditSink, FieldCipher, NotificationSender};

use crate::chain::hash_entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLoggerSettings {
    pub buffer_size: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
}

impl Default for AuditLoggerSettings {
    fn default() -> Self {
        Self {
            buffer_size: 100,
            flush_interval: Duration::from_millis(5_000),
            max_retries: 5,
        }
    }
}

impl From<&LifelineConfig> for AuditLoggerSettings {
    fn from(config: &LifelineConfig) -> Self {
        Self {
            buffer_size: config.audit_buffer_size.max(1),
            flush_interval: config.audit_flush_interval(),
            max_retries: config.audit_max_retries.max(1),
        }
    }
}

/// Chain position and entries not yet handed to a flush.
struct ChainState {
    sequence: u64,
    last_hash: String,
    buffer: Vec<AuditLogEntry>,
}

/// A batch that failed to persist at least once.
#[derive(Debug, Clone)]
pub struct FailedBatch {
    pub entries: Vec<AuditLogEntry>,
    pub attempts: u32,
    pub last_error: String,
}

#[derive(Default)]
struct Recovery {
    fallback: VecDeque<FailedBatch>,
    reconciliation: Vec<FailedBatch>,
}

pub struct BufferedAuditLogger {
    sink: Arc<dyn AuditSink>,
    cipher: Option<Arc<dyn FieldCipher>>,
    notifier: Arc<dyn NotificationSender>,
    settings: AuditLoggerSettings,
    state: Mutex<ChainState>,
    /// Held for the whole of a flush.
    recovery: Mutex<Recovery>,
}

impl BufferedAuditLogger {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        notifier: Arc<dyn NotificationSender>,
        settings: AuditLoggerSettings,
    ) -> Self {
        Self {
            sink,
            cipher: None,
            notifier,
            settings,
            state: Mutex::new(ChainState {
                sequence: 0,
                last_hash: AuditLogEntry::GENESIS_HASH.to_string(),
                buffer: Vec::with_capacity(settings.buffer_size),
            }),
            recovery: Mutex::new(Recovery::default()),
        }
    }

    /// Seal sensitive details with `cipher`. Without a cipher, sensitive
    /// details are dropped rather than stored in the clear.
    pub fn with_cipher(mut self, cipher: Arc<dyn FieldCipher>) -> Self {
        self.cipher = Some(cipher);
        self
    }

    /// Flush on `settings.flush_interval` until the handle is aborted.
    pub fn spawn_flush_timer(logger: Arc<Self>) -> JoinHandle<()> {
        let period = logger.settings.flush_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if let Err(e) = logger.flush() {
                    warn!(error = %e, "timed audit flush left entries pending");
                }
            }
        })
    }

    /// Entries buffered and not yet handed to a flush.
    pub fn buffered_len(&self) -> usize {
        self.state.lock().map(|s| s.buffer.len()).unwrap_or(0)
    }

    /// Batches waiting to be retried.
    pub fn fallback_len(&self) -> usize {
        self.recovery.lock().map(|r| r.fallback.len()).unwrap_or(0)
    }

    /// Batches that exhausted their retries, oldest first.
    pub fn reconciliation_batches(&self) -> Vec<FailedBatch> {
        self.recovery
            .lock()
            .map(|r| r.reconciliation.clone())
            .unwrap_or_default()
    }

    fn build_record(&self, request: AuditRequest) -> AuditRecord {
        let sealed = request.needs_sealing();
        let AuditRequest {
            event_type,
            severity,
            actor_id,
            resource_id,
            action,
            outcome,
            details,
            ..
        } = request;

        let (details, details_encrypted) = if details.is_null() {
            (None, None)
        } else if !sealed {
            (Some(details), None)
        } else {
            match self.seal(&details) {
                Ok(blob) => (None, Some(blob)),
                Err(e) => {
                    error!(
                        error = %e,
                        event_type = ?event_type,
                        resource_id = %resource_id,
                        "could not seal audit details; recording without them"
                    );
                    (Some(json!({ "details_withheld": true })), None)
                }
            }
        };

        AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            event_type,
            severity,
            actor_id,
            resource_id,
            action,
            outcome,
            details,
            details_encrypted,
        }
    }

    fn seal(&self, details: &serde_json::Value) -> LifelineResult<SealedBlob> {
        let cipher = self.cipher.as_ref().ok_or_else(|| LifelineError::Crypto {
            reason: "no cipher configured for sensitive audit details".to_string(),
        })?;
        let plaintext = serde_json::to_vec(details).map_err(|e| LifelineError::Crypto {
            reason: format!("details could not be serialized: {}", e),
        })?;
        cipher.seal(&plaintext)
    }

    /// Chain `record` onto the tail and buffer it. Returns the buffer length.
    fn append(&self, record: AuditRecord) -> LifelineResult<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit chain", e))?;
        let sequence = state.sequence;
        let integrity_hash = hash_entry(sequence, &state.last_hash, &record)?;
        let id = record.id.clone();
        let entry = AuditLogEntry {
            sequence,
            prev_hash: state.last_hash.clone(),
            record,
            integrity_hash,
        };
        state.last_hash = entry.integrity_hash.clone();
        state.sequence += 1;
        state.buffer.push(entry);
        debug!(audit_id = %id, sequence, "audit entry buffered");
        Ok(state.buffer.len())
    }

    /// Put a flush failure on the trail itself. It rides the next flush.
    fn record_failure(&self, action: &str, severity: AuditSeverity, batch: &FailedBatch) {
        let first = batch.entries.first().map(|e| e.sequence).unwrap_or(0);
        let last = batch.entries.last().map(|e| e.sequence).unwrap_or(0);
        let record = self.build_record(
            AuditRequest::new(
                AuditEventType::AuditFailure,
                None,
                format!("sequence:{}-{}", first, last),
                action,
            )
            .severity(severity)
            .outcome(AuditOutcome::Failure)
            .details(json!({
                "entries": batch.entries.len(),
                "attempts": batch.attempts,
                "error": batch.last_error,
            })),
        );
        if let Err(e) = self.append(record) {
            error!(error = %e, action, "could not record audit failure");
        }
    }

    fn notify(&self, subject: &str, body: String) {
        if let Err(e) = self.notifier.deliver(&Notification::operator_alert(subject, body)) {
            error!(error = %e, subject, "operator notification failed");
        }
    }
}

impl AuditLogger for BufferedAuditLogger {
    fn log(&self, request: AuditRequest) -> LifelineResult<String> {
        let record = self.build_record(request);
        let id = record.id.clone();
        let critical = record.severity == AuditSeverity::Critical;
        let buffered = self.append(record)?;
        let should_flush = critical || buffered >= self.settings.buffer_size;

        if should_flush {
            if let Err(e) = self.flush() {
                // Already escalated inside flush; the caller's operation stands.
                debug!(error = %e, "audit flush deferred to fallback queue");
            }
        }
        Ok(id)
    }

    fn flush(&self) -> LifelineResult<()> {
        let mut recovery = self
            .recovery
            .lock()
            .map_err(|e| LifelineError::lock_poisoned("audit flush", e))?;

        let fresh = {
            let mut state = self
                .state
                .lock()
                .map_err(|e| LifelineError::lock_poisoned("audit chain", e))?;
            std::mem::take(&mut state.buffer)
        };
        if !fresh.is_empty() {
            recovery.fallback.push_back(FailedBatch {
                entries: fresh,
                attempts: 0,
                last_error: String::new(),
            });
        }

        while let Some(batch) = recovery.fallback.front_mut() {
            match self.sink.persist(&batch.entries) {
                Ok(()) => {
                    debug!(
                        entries = batch.entries.len(),
                        retried = batch.attempts,
                        "audit batch persisted"
                    );
                    recovery.fallback.pop_front();
                }
                Err(e) => {
                    batch.attempts += 1;
                    batch.last_error = e.to_string();
                    let first = batch.entries.first().map(|x| x.sequence).unwrap_or(0);
                    let attempts = batch.attempts;
                    error!(
                        critical = true,
                        error = %e,
                        first_sequence = first,
                        entries = batch.entries.len(),
                        attempts,
                        "AUDIT FLUSH FAILED"
                    );

                    if attempts == 1 {
                        self.record_failure("flush_failed", AuditSeverity::High, batch);
                        self.notify(
                            "Audit log flush failed",
                            format!(
                                "{} audit entries starting at sequence {} could not be persisted: {}. They are queued for retry.",
                                batch.entries.len(),
                                first,
                                e
                            ),
                        );
                    }

                    if attempts < self.settings.max_retries {
                        return Err(LifelineError::AuditFailure {
                            reason: format!("flush failed ({} attempt(s)): {}", attempts, e),
                        });
                    }

                    if let Some(parked) = recovery.fallback.pop_front() {
                        self.record_failure(
                            "moved_to_reconciliation",
                            AuditSeverity::Critical,
                            &parked,
                        );
                        self.notify(
                            "Audit batch requires manual reconciliation",
                            format!(
                                "{} audit entries starting at sequence {} failed {} times and were moved to reconciliation.",
                                parked.entries.len(),
                                first,
                                parked.attempts
                            ),
                        );
                        recovery.reconciliation.push(parked);
                    }
                }
            }
        }

        Ok(())
    }
}
