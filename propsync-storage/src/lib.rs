//! SQLite storage layer for propsync.
//!
//! Provides persistent, tenant-scoped storage for the reconciliation engine.
//!
//! # Architecture
//!
//! - One [`Database`] per process wraps the SQLite connection; stores are
//!   cheap clones sharing it
//! - Documents are stored as JSON text alongside their canonical fingerprint
//! - Snapshots and sync runs are append-only; snapshots are the only rows
//!   with a deletion path (time-based retention)
//! - Multi-statement operations run inside a [`UnitOfWork`] so a failing
//!   call leaves no partial effects

mod db;
mod error;
mod record_store;
mod registry;
mod run_store;
mod snapshot_store;

pub use db::{Database, UnitOfWork};
pub use error::{StorageError, StorageResult};
pub use record_store::RecordStore;
pub use registry::{Registry, Source, Target, Tenant};
pub use run_store::RunStore;
pub use snapshot_store::SnapshotStore;
