//! Append-only reconciliation run log.
//!
//! One row per run invocation, written even when every record was a no-op,
//! so an executed empty sync is distinguishable from one that never ran.
//! Rows are never mutated after insert.

use crate::db::{from_micros, parse_id, to_micros, Database};
use crate::error::{StorageError, StorageResult};
use propsync_types::{SyncRun, TenantId};
use rusqlite::{params, Row};
use std::str::FromStr;

/// Store for the reconciliation audit trail.
#[derive(Clone)]
pub struct RunStore {
    db: Database,
}

impl RunStore {
    /// Creates a run store over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Appends a completed run to the log.
    pub fn append(&self, run: &SyncRun) -> StorageResult<()> {
        self.db.conn().execute(
            "INSERT INTO sync_runs
                (id, tenant_id, source_id, target_id, status, stats, message, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                run.id.to_string(),
                run.tenant_id.to_string(),
                run.source_id.to_string(),
                run.target_id.to_string(),
                run.status.as_str(),
                serde_json::to_string(&run.stats)?,
                run.message,
                to_micros(run.created_at),
            ],
        )?;
        Ok(())
    }

    /// Lists a tenant's runs, newest first.
    pub fn list_for_tenant(&self, tenant_id: TenantId, limit: usize) -> StorageResult<Vec<SyncRun>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, source_id, target_id, status, stats, message, created_at
             FROM sync_runs WHERE tenant_id = ?1
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![tenant_id.to_string(), limit as i64], run_row)?;
        rows.map(|r| decode_run(r?)).collect()
    }
}

// ── Row decoding ─────────────────────────────────────────────────

#[allow(clippy::type_complexity)]
type RunRow = (String, String, String, String, String, String, Option<String>, i64);

fn run_row(row: &Row<'_>) -> rusqlite::Result<RunRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_run(row: RunRow) -> StorageResult<SyncRun> {
    let (id, tenant_id, source_id, target_id, status, stats, message, created_at) = row;
    Ok(SyncRun {
        id: parse_id(&id, "run")?,
        tenant_id: parse_id(&tenant_id, "tenant")?,
        source_id: parse_id(&source_id, "source")?,
        target_id: parse_id(&target_id, "target")?,
        status: FromStr::from_str(&status)
            .map_err(|e: propsync_types::Error| StorageError::InvalidData(e.to_string()))?,
        stats: serde_json::from_str(&stats)?,
        message,
        created_at: from_micros(created_at)?,
    })
}
