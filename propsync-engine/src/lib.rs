//! Reconciliation and change-detection engine for propsync.
//!
//! The engine keeps target systems' copies of property records in step with
//! their source feeds, using content fingerprints to detect change and
//! pre-mutation snapshots to make every automated overwrite reversible.
//! Manually edited target records are never overwritten: the
//! [`ConflictGuard`] disables auto-sync for them until a human resolves the
//! conflict.
//!
//! Entry points, all scoped to one tenant:
//! - [`ImportEngine::import`] — feed documents into source records
//! - [`ReconciliationEngine::run`] — reconcile a source into a target
//! - [`ConflictGuard`] — manual-edit detection and resolution
//! - [`RetentionSweeper`] — time-based snapshot cleanup

mod config;
mod engine;
mod error;
mod guard;
mod import;
mod locks;
mod retention;

pub use config::EngineConfig;
pub use engine::ReconciliationEngine;
pub use error::{EngineError, EngineResult};
pub use guard::ConflictGuard;
pub use import::ImportEngine;
pub use locks::PairLocks;
pub use retention::RetentionSweeper;
