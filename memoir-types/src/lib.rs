//! Core type definitions for Memoir.
//!
//! This crate defines the fundamental types shared by the store and the
//! reconciliation engine:
//! - Record and machine identifiers
//! - The closed, tagged record model (Entry, Event, Person, Location, Thread)
//! - The synchronizable-field projection each record kind exposes
//!
//! Parsing of the flat-file formats and rendering of human-readable pages
//! belong to the import/export layers, not here.

mod ids;
mod record;

pub use ids::{MachineId, RecordId};
pub use record::{
    Association, EntryRecord, EventRecord, LocationRecord, PersonRecord, Record, RecordKind,
    ThreadRecord,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("unknown record kind: {0}")]
    UnknownKind(String),
}
