//! Synchronization and conflict detection engine for Memoir.
//!
//! Memoir keeps the same personal records in two representations: flat files
//! edited by hand (and merged across machines by an external VCS) and a
//! relational store used for querying and presentation. This crate keeps the
//! two reconcilable across independently-edited copies.
//!
//! # Components
//!
//! - **Hasher**: stable digest over a record's synchronizable fields
//! - **Detector**: classifies an incoming record against its baseline
//!   (first sync / unchanged / clean update / conflict)
//! - **Resolver**: two-pass binding of forward references between records
//! - **Orchestrator**: drives a pass (hash, classify, consult tombstones,
//!   apply with last-writer-wins, re-baseline)
//!
//! # Reconciliation model
//!
//! There is no multi-writer concurrency control here. At most one writer
//! process runs at a time; divergence arises because two machines each
//! advanced their own copy before their file trees were merged externally.
//! Conflict detection is therefore retrospective and batch-time: both sides
//! moving since the last agreed baseline flags the record for human review,
//! while the incoming file version wins so the pass always makes forward
//! progress.
//!
//! # Example
//!
//! ```
//! use memoir_store::Store;
//! use memoir_sync::{ReconcileConfig, ReconciliationOrchestrator};
//! use memoir_types::MachineId;
//!
//! let store = Store::open_in_memory().unwrap();
//! let config = ReconcileConfig {
//!     machine_id: MachineId::new("laptop"),
//!     ..Default::default()
//! };
//! let orchestrator = ReconciliationOrchestrator::new(store, config);
//! let report = orchestrator.run_pass(&[]).unwrap();
//! assert_eq!(report.updated, 0);
//! ```

mod detector;
mod error;
mod hasher;
mod orchestrator;
mod resolver;

pub use detector::{ConflictDetector, SyncDecision};
pub use error::{SyncError, SyncResult};
pub use hasher::{content_hash, ContentHash};
pub use orchestrator::{
    ConflictReport, PassReport, ReconcileConfig, ReconciliationOrchestrator, RecordFailure,
};
pub use resolver::{
    DeferredReferenceResolver, EntryDateResolver, ReferenceResolver, ResolutionReport,
};
