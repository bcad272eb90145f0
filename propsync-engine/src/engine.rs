//! The reconciliation run.
//!
//! One run walks every record under a source and reconciles the target's
//! copy: unmatched records are created, unchanged ones skipped, changed ones
//! snapshotted and overwritten, and manually edited ones left alone with a
//! refreshed conflict note. The whole run is one transaction plus one
//! appended audit row, and runs over the same pair never interleave.

use crate::error::{EngineError, EngineResult};
use crate::guard::ConflictGuard;
use crate::locks::PairLocks;
use propsync_storage::{Database, RecordStore, Registry, RunStore, SnapshotStore};
use propsync_types::{
    now_utc, RunId, RunStats, SnapshotSide, SourceId, SyncRun, TargetId, TargetRecord, TenantId,
};

/// Reconciles a tenant's sources into its targets.
#[derive(Clone)]
pub struct ReconciliationEngine {
    db: Database,
    tenant_id: TenantId,
    registry: Registry,
    records: RecordStore,
    snapshots: SnapshotStore,
    runs: RunStore,
    guard: ConflictGuard,
    locks: PairLocks,
}

impl ReconciliationEngine {
    /// Creates a reconciliation engine scoped to one tenant.
    pub fn new(db: &Database, tenant_id: TenantId) -> Self {
        Self {
            db: db.clone(),
            tenant_id,
            registry: Registry::new(db),
            records: RecordStore::new(db),
            snapshots: SnapshotStore::new(db),
            runs: RunStore::new(db),
            guard: ConflictGuard::new(db),
            locks: PairLocks::new(),
        }
    }

    /// Creates an engine sharing a lock registry with other engine handles,
    /// so runs over the same pair are serialized across all of them.
    pub fn with_locks(db: &Database, tenant_id: TenantId, locks: PairLocks) -> Self {
        Self {
            locks,
            ..Self::new(db, tenant_id)
        }
    }

    /// Runs one reconciliation pass from a source into a target.
    ///
    /// Both must be registered under this engine's tenant, otherwise
    /// [`EngineError::NotFound`] is returned with no side effects. A run row
    /// is appended even when the source is empty. A concurrent run over the
    /// same pair blocks until this one finishes.
    pub fn run(&self, source_id: SourceId, target_id: TargetId) -> EngineResult<SyncRun> {
        self.registry
            .get_source(self.tenant_id, source_id)?
            .ok_or_else(|| EngineError::NotFound(format!("source {source_id}")))?;
        self.registry
            .get_target(self.tenant_id, target_id)?
            .ok_or_else(|| EngineError::NotFound(format!("target {target_id}")))?;

        let pair = self.locks.for_pair(source_id, target_id);
        let _running = pair.lock().unwrap();

        tracing::debug!(source_id = %source_id, target_id = %target_id, "run starting");
        let uow = self.db.begin()?;
        let mut stats = RunStats::default();

        for source_record in self.records.list_source_records(source_id)? {
            match self
                .records
                .get_target_record(target_id, &source_record.external_id)?
            {
                None => {
                    let record = TargetRecord::from_source(target_id, &source_record);
                    self.records.insert_target_record(&record)?;
                    stats.created += 1;
                }
                Some(target) if !target.fingerprint.differs(&source_record.fingerprint) => {
                    stats.skipped += 1;
                }
                Some(target) if ConflictGuard::may_auto_update(&target) => {
                    self.snapshots.capture_then(
                        SnapshotSide::Target,
                        target.id,
                        &target.document,
                        &target.fingerprint,
                        || {
                            self.records.overwrite_target_record(
                                target.id,
                                &source_record.document,
                                &source_record.fingerprint,
                                source_record.id,
                                now_utc(),
                            )
                        },
                    )?;
                    stats.updated += 1;
                }
                Some(target) => {
                    self.guard.annotate_conflict(&target, target.updated_at)?;
                    tracing::warn!(
                        external_id = %target.external_id,
                        "update blocked by manual edits"
                    );
                    stats.warnings += 1;
                    stats.skipped += 1;
                }
            }
        }

        let run = SyncRun {
            id: RunId::new(),
            tenant_id: self.tenant_id,
            source_id,
            target_id,
            status: stats.status(),
            stats,
            message: None,
            created_at: now_utc(),
        };
        self.runs.append(&run)?;
        uow.commit()?;

        tracing::info!(
            run_id = %run.id,
            status = %run.status,
            created = stats.created,
            updated = stats.updated,
            skipped = stats.skipped,
            warnings = stats.warnings,
            "run complete"
        );
        Ok(run)
    }
}
