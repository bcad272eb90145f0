//! Time-based snapshot retention.

use crate::config::EngineConfig;
use crate::error::EngineResult;
use chrono::Duration;
use propsync_storage::{Database, SnapshotStore};
use propsync_types::now_utc;

/// Deletes snapshots older than the retention window.
#[derive(Clone)]
pub struct RetentionSweeper {
    config: EngineConfig,
    snapshots: SnapshotStore,
}

impl RetentionSweeper {
    /// Creates a sweeper over the shared database handle.
    pub fn new(db: &Database, config: EngineConfig) -> Self {
        Self {
            config,
            snapshots: SnapshotStore::new(db),
        }
    }

    /// Deletes snapshots on both sides captured strictly before
    /// `now - days`, defaulting to the configured retention window.
    /// Returns the number of snapshots removed; re-running immediately
    /// removes nothing further.
    pub fn sweep(&self, days: Option<u32>) -> EngineResult<u64> {
        let days = days.unwrap_or(self.config.retention_days);
        let cutoff = now_utc() - Duration::days(i64::from(days));
        let purged = self.snapshots.purge_older_than(cutoff)?;
        tracing::info!(days, purged, "retention sweep complete");
        Ok(purged)
    }

    /// Sweeps on a fixed interval until the task is dropped. Errors are
    /// logged and the loop keeps going; a failed sweep retries next tick.
    pub async fn run_scheduled(&self, every: std::time::Duration) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            if let Err(e) = self.sweep(None) {
                tracing::warn!("retention sweep failed: {e}");
            }
        }
    }
}
