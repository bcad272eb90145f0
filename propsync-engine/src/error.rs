//! Error types for the reconciliation engine.
//!
//! Conflicts are deliberately not represented here: a conflicted record is a
//! first-class run outcome (a warning counter plus a conflict note), never an
//! `Err`. Malformed import records are a silent skip. Everything else — a
//! missing source/target or a persistence failure — aborts the call's unit of
//! work and propagates.

use propsync_storage::StorageError;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Referenced tenant, source or target does not exist in the caller's
    /// scope. No mutation has occurred.
    #[error("not found: {0}")]
    NotFound(String),

    /// Persistence failure from the storage layer.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
