//! Manual-edit protection for target records.
//!
//! Once a human has edited a target record, the engine must never silently
//! overwrite that work. The guard owns the sync-state transitions around
//! manual edits: detecting drift, disabling auto-sync, refreshing conflict
//! notes on later runs, and the explicit resolution action that hands the
//! record back to the engine.

use crate::error::{EngineError, EngineResult};
use chrono::{DateTime, Utc};
use propsync_storage::{Database, RecordStore, SnapshotStore};
use propsync_types::{document_diff, RecordId, SnapshotSide, SyncState, TargetRecord};

/// Guards target records that carry manual edits.
#[derive(Clone)]
pub struct ConflictGuard {
    db: Database,
    records: RecordStore,
    snapshots: SnapshotStore,
}

impl ConflictGuard {
    /// Creates a guard over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self {
            db: db.clone(),
            records: RecordStore::new(db),
            snapshots: SnapshotStore::new(db),
        }
    }

    /// Returns true if a reconciliation run may overwrite this record.
    #[must_use]
    pub fn may_auto_update(record: &TargetRecord) -> bool {
        !record.sync_state.is_diverged()
    }

    /// Returns true if the target's content has drifted from its linked
    /// source record. A record with no source link cannot drift.
    pub fn detect_drift(&self, record_id: RecordId) -> EngineResult<bool> {
        let target = self.get_target(record_id)?;
        self.has_drifted(&target)
    }

    /// Marks a target record as manually edited, disabling automatic sync.
    ///
    /// When the record has drifted from its linked source, the current
    /// (manually edited) document is snapshotted before the state flips to
    /// [`SyncState::Diverged`]. Calling this on an already-diverged record
    /// refreshes the note without a second snapshot and without losing the
    /// original detection time. A record with no drift is left untouched.
    pub fn mark_manual(
        &self,
        record_id: RecordId,
        detected_at: DateTime<Utc>,
    ) -> EngineResult<SyncState> {
        let uow = self.db.begin()?;
        let target = self.get_target(record_id)?;

        let state = match &target.sync_state {
            SyncState::Diverged {
                detected_at: original,
                ..
            } => SyncState::Diverged {
                note: manual_note(*original),
                detected_at: *original,
            },
            SyncState::Synced => {
                if !self.has_drifted(&target)? {
                    tracing::debug!(record_id = %record_id, "no drift; record stays synced");
                    return Ok(SyncState::Synced);
                }
                self.snapshots.capture(
                    SnapshotSide::Target,
                    target.id,
                    &target.document,
                    &target.fingerprint,
                )?;
                SyncState::Diverged {
                    note: manual_note(detected_at),
                    detected_at,
                }
            }
        };

        self.records.set_sync_state(record_id, &state)?;
        uow.commit()?;
        tracing::info!(record_id = %record_id, "automatic sync disabled after manual edit");
        Ok(state)
    }

    /// Refreshes the conflict note on a record whose manual edits blocked an
    /// update during a run. Never touches the document, fingerprint, or the
    /// original detection time. Runs inside the caller's transaction.
    pub(crate) fn annotate_conflict(
        &self,
        record: &TargetRecord,
        last_synced_at: DateTime<Utc>,
    ) -> EngineResult<SyncState> {
        let detected_at = record.sync_state.detected_at().unwrap_or(last_synced_at);
        let state = SyncState::Diverged {
            note: conflict_note(last_synced_at),
            detected_at,
        };
        self.records.set_sync_state(record.id, &state)?;
        Ok(state)
    }

    /// Explicit human resolution: snapshots the manually edited document and
    /// returns the record to [`SyncState::Synced`] so the next run may
    /// overwrite it. No-op on a record that is already synced.
    pub fn resolve_manual(&self, record_id: RecordId) -> EngineResult<SyncState> {
        let uow = self.db.begin()?;
        let target = self.get_target(record_id)?;

        if !target.sync_state.is_diverged() {
            return Ok(SyncState::Synced);
        }
        self.snapshots.capture(
            SnapshotSide::Target,
            target.id,
            &target.document,
            &target.fingerprint,
        )?;
        self.records.set_sync_state(record_id, &SyncState::Synced)?;
        uow.commit()?;
        tracing::info!(record_id = %record_id, "conflict resolved; automatic sync re-enabled");
        Ok(SyncState::Synced)
    }

    fn get_target(&self, record_id: RecordId) -> EngineResult<TargetRecord> {
        self.records
            .get_target_record_by_id(record_id)?
            .ok_or_else(|| EngineError::NotFound(format!("target record {record_id}")))
    }

    fn has_drifted(&self, target: &TargetRecord) -> EngineResult<bool> {
        let Some(source_record_id) = target.source_record_id else {
            return Ok(false);
        };
        let Some(source) = self.records.get_source_record_by_id(source_record_id)? else {
            return Ok(false);
        };
        let drifted = target.fingerprint.differs(&source.fingerprint);
        if drifted {
            let diff = document_diff(&source.document, &target.document);
            tracing::debug!(
                record_id = %target.id,
                fields = diff.len(),
                "target document drifted from source"
            );
        }
        Ok(drifted)
    }
}

fn manual_note(detected_at: DateTime<Utc>) -> String {
    format!(
        "Manual changes detected. Automatic sync disabled. Detected at: {}",
        detected_at.to_rfc3339()
    )
}

fn conflict_note(last_synced_at: DateTime<Utc>) -> String {
    format!(
        "Source has changes but target has manual modifications. Last sync: {}",
        last_synced_at.to_rfc3339()
    )
}
