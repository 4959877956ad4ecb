//! Error types for the reconciliation engine.

use thiserror::Error;

/// Result type for reconciliation operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during reconciliation.
///
/// A detected conflict is deliberately *not* represented here; conflicts
/// are a flagged state surfaced through the review queue, never an error
/// that aborts a pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Storage failure. Aborts the enclosing pass; progress up to the last
    /// committed per-record transaction is retained.
    #[error("storage error: {0}")]
    Storage(#[from] memoir_store::StorageError),

    /// A record that cannot be processed. Reported per record; the batch
    /// continues unless strict mode is set.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// A programming-contract violation, e.g. rebinding an already-bound
    /// reference to a different target without an explicit override.
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// The addressed record or row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}
