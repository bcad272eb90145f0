//! Append-only snapshot ledger.
//!
//! A snapshot is captured immediately before an automated process overwrites
//! a record's document, for either side of the pair. Snapshots are never
//! updated; the only deletion path is time-based retention.

use crate::db::{from_micros, parse_id, to_micros, Database};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use propsync_types::{now_utc, Fingerprint, RecordId, Snapshot, SnapshotId, SnapshotSide};
use rusqlite::{params, Row};
use serde_json::Value;
use std::str::FromStr;

/// Store for pre-mutation snapshots on both record sides.
#[derive(Clone)]
pub struct SnapshotStore {
    db: Database,
}

impl SnapshotStore {
    /// Creates a snapshot store over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    /// Captures a snapshot of a record's current content. Pure append.
    pub fn capture(
        &self,
        side: SnapshotSide,
        record_id: RecordId,
        document: &Value,
        fingerprint: &Fingerprint,
    ) -> StorageResult<Snapshot> {
        let snapshot = Snapshot {
            id: SnapshotId::new(),
            side,
            record_id,
            document: document.clone(),
            fingerprint: fingerprint.clone(),
            captured_at: now_utc(),
        };
        self.db.conn().execute(
            "INSERT INTO snapshots (id, side, record_id, document, fingerprint, captured_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                snapshot.id.to_string(),
                snapshot.side.as_str(),
                snapshot.record_id.to_string(),
                serde_json::to_string(&snapshot.document)?,
                snapshot.fingerprint.as_str(),
                to_micros(snapshot.captured_at),
            ],
        )?;
        Ok(snapshot)
    }

    /// Captures a snapshot of a record's current content, then applies the
    /// overwrite. The two steps must never be reordered: a snapshot taken
    /// after the overwrite would record the new content as history.
    pub fn capture_then<T>(
        &self,
        side: SnapshotSide,
        record_id: RecordId,
        document: &Value,
        fingerprint: &Fingerprint,
        overwrite: impl FnOnce() -> StorageResult<T>,
    ) -> StorageResult<T> {
        self.capture(side, record_id, document, fingerprint)?;
        overwrite()
    }

    /// Deletes snapshots captured strictly before the cutoff, on both sides.
    /// Returns the number of rows removed; re-running with the same cutoff
    /// deletes nothing further.
    pub fn purge_older_than(&self, cutoff: DateTime<Utc>) -> StorageResult<u64> {
        let deleted = self.db.conn().execute(
            "DELETE FROM snapshots WHERE captured_at < ?1",
            params![to_micros(cutoff)],
        )?;
        Ok(deleted as u64)
    }

    /// Lists a record's snapshots, newest first.
    pub fn list_for_record(&self, record_id: RecordId) -> StorageResult<Vec<Snapshot>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, side, record_id, document, fingerprint, captured_at
             FROM snapshots WHERE record_id = ?1 ORDER BY captured_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![record_id.to_string()], snapshot_row)?;
        rows.map(|r| decode_snapshot(r?)).collect()
    }

    /// Total number of retained snapshots.
    pub fn count(&self) -> StorageResult<u64> {
        let count: i64 =
            self.db
                .conn()
                .query_row("SELECT COUNT(*) FROM snapshots", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

// ── Row decoding ─────────────────────────────────────────────────

type SnapshotRow = (String, String, String, String, String, i64);

fn snapshot_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_snapshot(row: SnapshotRow) -> StorageResult<Snapshot> {
    let (id, side, record_id, document, fingerprint, captured_at) = row;
    Ok(Snapshot {
        id: parse_id(&id, "snapshot")?,
        side: SnapshotSide::from_str(&side)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?,
        record_id: parse_id(&record_id, "record")?,
        document: serde_json::from_str(&document)?,
        fingerprint: Fingerprint::parse(&fingerprint)
            .map_err(|e| StorageError::InvalidData(e.to_string()))?,
        captured_at: from_micros(captured_at)?,
    })
}
