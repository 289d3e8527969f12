//! Error types for the AgentMesh audit core.
//!
//! All fallible operations in the audit crates return `AuditResult<T>`.
//! Lookups that can merely miss return `Option` instead — absence is an
//! expected condition, not an error.

use thiserror::Error;

/// The unified error type for the audit core and its storage wrapper.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The caller described an event that cannot become an audit entry
    /// (e.g. a required field was empty). Rejected before any state mutates.
    #[error("invalid audit event: {reason}")]
    InvalidEvent { reason: String },

    /// A storage collaborator operation failed.
    ///
    /// The core itself performs no I/O; this surfaces failures from
    /// whatever `AuditStore` implementation wraps it.
    #[error("audit storage operation failed: {reason}")]
    Storage { reason: String },

    /// A persisted record could not be read back or decoded.
    ///
    /// Treated as fatal at load time — a log that cannot be fully restored
    /// cannot be trusted.
    #[error("corrupt audit record at '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },

    /// A restored chain failed integrity verification.
    ///
    /// `index` is the position of the first entry that failed. Callers must
    /// refuse to serve the restored data and escalate.
    #[error("audit chain integrity failure at entry {index}: {reason}")]
    IntegrityFailure { index: usize, reason: String },
}

/// Convenience alias used throughout the AgentMesh audit crates.
pub type AuditResult<T> = Result<T, AuditError>;
