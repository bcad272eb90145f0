//! Core type definitions for propsync.
//!
//! This crate defines the fundamental, schema-agnostic types used throughout
//! the reconciliation engine:
//! - Tenant, source, target, record, snapshot and run identifiers (UUID v7)
//! - Content fingerprints (canonical-JSON SHA-256)
//! - Source/target record models and the per-record sync state machine
//! - Run statistics and the append-only sync run log entry
//!
//! Business schema (what the property documents actually contain) is not
//! defined here: documents are opaque JSON mappings and only their canonical
//! fingerprint matters to the engine.

mod diff;
mod fingerprint;
mod ids;
mod record;
mod timestamp;

pub use diff::{document_diff, FieldChange};
pub use timestamp::now_utc;
pub use fingerprint::Fingerprint;
pub use ids::{RecordId, RunId, SnapshotId, SourceId, TargetId, TenantId};
pub use record::{
    ImportStats, RunStats, RunStatus, Snapshot, SnapshotSide, SourceRecord, SyncRun, SyncState,
    TargetRecord,
};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid fingerprint: {0}")]
    InvalidFingerprint(String),

    #[error("invalid {kind}: {value}")]
    InvalidDiscriminant { kind: &'static str, value: String },
}
