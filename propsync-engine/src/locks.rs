//! In-process advisory locking for reconciliation pairs.
//!
//! Two concurrent runs over the same (source, target) pair would interleave
//! their decisions; the second caller blocks until the first finishes.
//! Distinct pairs proceed independently. The registry only grows: the set of
//! registered pairs is small and stable, so entries are never evicted.

use propsync_types::{SourceId, TargetId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Registry of per-pair run locks, shared by clone.
#[derive(Clone, Default)]
pub struct PairLocks {
    inner: Arc<Mutex<HashMap<(SourceId, TargetId), Arc<Mutex<()>>>>>,
}

impl PairLocks {
    /// Creates an empty lock registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the lock for a pair, creating it on first use. The caller
    /// locks the returned mutex for the duration of its run.
    pub fn for_pair(&self, source_id: SourceId, target_id: TargetId) -> Arc<Mutex<()>> {
        self.inner
            .lock()
            .unwrap()
            .entry((source_id, target_id))
            .or_default()
            .clone()
    }
}
