//! # lifeline-audit
//!
//! Tamper-evident audit trail for LIFELINE.
//!
//! ## Overview
//!
//! Every audited action becomes an `AuditLogEntry` linked to its
//! predecessor by SHA-256 hash. Editing any stored field (even one byte of a
//! sealed blob) breaks the chain, and reads flag the damaged entry.
//! Details that reference PHI are sealed with ChaCha20-Poly1305 before they
//! are hashed, so the chain commits to the ciphertext.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lifeline_audit::{BufferedAuditLogger, ChaChaFieldCipher, InMemoryAuditStore};
//!
//! let store = Arc::new(InMemoryAuditStore::new());
//! let logger = BufferedAuditLogger::new(store.clone(), notifier, settings)
//!     .with_cipher(Arc::new(ChaChaFieldCipher::generate("audit-key-1")));
//! logger.log(request)?;
//! logger.flush()?;
//! assert!(store.verify_integrity());
//! ```

pub mod chain;
pub mod cipher;
pub mod logger;
pub mod memory;

pub use chain::{first_break, hash_entry, verify_chain, verify_entry};
pub use cipher::{open_details, ChaChaFieldCipher};
pub use logger::{AuditLoggerSettings, BufferedAuditLogger, FailedBatch};
pub use memory::InMemoryAuditStore;

// ── Tests ─────────────────────────────────────────────────────────────────────
