//! Audit logging system for Stockpile
//!
//! Records every significant operation in an append-only audit log. The
//! backup engine emits one entry per create/verify/restore/prune call with
//! the actor, action, artifact id, and outcome.
//!
//! # Architecture
//!
//! - `AuditEntry`: a single flat entry (timestamp, actor, action, entity,
//!   artifact, outcome, detail). Flat so the audit log survives a CSV
//!   round-trip when included in a backup.
//! - `AuditLogger`: writes entries to the audit log file using a
//!   line-delimited JSON format (JSONL).

mod entry;
mod logger;

pub use entry::{AuditAction, AuditEntry, AuditOutcome};
pub use logger::AuditLogger;
