//! Persistence for source and target records.
//!
//! The join key between the two sides is `external_id`, unique within its
//! owning source or target (enforced by the schema). Documents are stored as
//! JSON text next to their canonical fingerprint so lookups never have to
//! re-hash.

use crate::db::{from_micros, parse_id, to_micros, Database};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use propsync_types::{
    Fingerprint, RecordId, SourceId, SourceRecord, SyncState, TargetId, TargetRecord,
};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

/// Store for records on both sides of a reconciliation pair.
#[derive(Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    /// Creates a record store over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    // ── Source records ───────────────────────────────────────────

    /// Inserts a new source record.
    pub fn insert_source_record(&self, record: &SourceRecord) -> StorageResult<()> {
        self.db.conn().execute(
            "INSERT INTO source_records
                (id, source_id, external_id, document, fingerprint, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.id.to_string(),
                record.source_id.to_string(),
                record.external_id,
                serde_json::to_string(&record.document)?,
                record.fingerprint.as_str(),
                to_micros(record.created_at),
                to_micros(record.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Looks up a source record by its external id within a source.
    pub fn get_source_record(
        &self,
        source_id: SourceId,
        external_id: &str,
    ) -> StorageResult<Option<SourceRecord>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, source_id, external_id, document, fingerprint, created_at, updated_at
                 FROM source_records WHERE source_id = ?1 AND external_id = ?2",
                params![source_id.to_string(), external_id],
                source_row,
            )
            .optional()?;
        row.map(decode_source_record).transpose()
    }

    /// Looks up a source record by primary id.
    pub fn get_source_record_by_id(&self, id: RecordId) -> StorageResult<Option<SourceRecord>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, source_id, external_id, document, fingerprint, created_at, updated_at
                 FROM source_records WHERE id = ?1",
                params![id.to_string()],
                source_row,
            )
            .optional()?;
        row.map(decode_source_record).transpose()
    }

    /// Overwrites a source record's content after its snapshot was captured.
    pub fn overwrite_source_record(
        &self,
        id: RecordId,
        document: &Value,
        fingerprint: &Fingerprint,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.db.conn().execute(
            "UPDATE source_records
             SET document = ?2, fingerprint = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(document)?,
                fingerprint.as_str(),
                to_micros(updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("source record {id}")));
        }
        Ok(())
    }

    /// Lists every record under a source, in external-id order.
    pub fn list_source_records(&self, source_id: SourceId) -> StorageResult<Vec<SourceRecord>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, source_id, external_id, document, fingerprint, created_at, updated_at
             FROM source_records WHERE source_id = ?1 ORDER BY external_id",
        )?;
        let rows = stmt.query_map(params![source_id.to_string()], source_row)?;
        rows.map(|r| decode_source_record(r?)).collect()
    }

    // ── Target records ───────────────────────────────────────────

    /// Inserts a new target record.
    pub fn insert_target_record(&self, record: &TargetRecord) -> StorageResult<()> {
        let (state, note, diverged_at) = encode_state(&record.sync_state);
        self.db.conn().execute(
            "INSERT INTO target_records
                (id, target_id, source_record_id, external_id, document, fingerprint,
                 sync_state, conflict_note, diverged_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.id.to_string(),
                record.target_id.to_string(),
                record.source_record_id.map(|id| id.to_string()),
                record.external_id,
                serde_json::to_string(&record.document)?,
                record.fingerprint.as_str(),
                state,
                note,
                diverged_at,
                to_micros(record.created_at),
                to_micros(record.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Looks up a target record by its external id within a target.
    pub fn get_target_record(
        &self,
        target_id: TargetId,
        external_id: &str,
    ) -> StorageResult<Option<TargetRecord>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                &format!("{TARGET_SELECT} WHERE target_id = ?1 AND external_id = ?2"),
                params![target_id.to_string(), external_id],
                target_row,
            )
            .optional()?;
        row.map(decode_target_record).transpose()
    }

    /// Looks up a target record by primary id.
    pub fn get_target_record_by_id(&self, id: RecordId) -> StorageResult<Option<TargetRecord>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                &format!("{TARGET_SELECT} WHERE id = ?1"),
                params![id.to_string()],
                target_row,
            )
            .optional()?;
        row.map(decode_target_record).transpose()
    }

    /// Overwrites a target record's content from a source record, after the
    /// pre-update snapshot was captured. Leaves the sync state untouched.
    pub fn overwrite_target_record(
        &self,
        id: RecordId,
        document: &Value,
        fingerprint: &Fingerprint,
        source_record_id: RecordId,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.db.conn().execute(
            "UPDATE target_records
             SET document = ?2, fingerprint = ?3, source_record_id = ?4, updated_at = ?5
             WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(document)?,
                fingerprint.as_str(),
                source_record_id.to_string(),
                to_micros(updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("target record {id}")));
        }
        Ok(())
    }

    /// Persists a target record's sync state transition.
    pub fn set_sync_state(&self, id: RecordId, state: &SyncState) -> StorageResult<()> {
        let (state_text, note, diverged_at) = encode_state(state);
        let changed = self.db.conn().execute(
            "UPDATE target_records
             SET sync_state = ?2, conflict_note = ?3, diverged_at = ?4
             WHERE id = ?1",
            params![id.to_string(), state_text, note, diverged_at],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("target record {id}")));
        }
        Ok(())
    }

    /// Records a human edit made directly on the target system: replaces the
    /// document and fingerprint without touching the sync state. The engine
    /// never calls this; it exists for the outer edit surface.
    pub fn apply_manual_edit(
        &self,
        id: RecordId,
        document: &Value,
        fingerprint: &Fingerprint,
        updated_at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let changed = self.db.conn().execute(
            "UPDATE target_records
             SET document = ?2, fingerprint = ?3, updated_at = ?4
             WHERE id = ?1",
            params![
                id.to_string(),
                serde_json::to_string(document)?,
                fingerprint.as_str(),
                to_micros(updated_at),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("target record {id}")));
        }
        Ok(())
    }

    /// Lists every record under a target with its conflict state, in
    /// external-id order.
    pub fn list_target_records(&self, target_id: TargetId) -> StorageResult<Vec<TargetRecord>> {
        let conn = self.db.conn();
        let mut stmt =
            conn.prepare(&format!("{TARGET_SELECT} WHERE target_id = ?1 ORDER BY external_id"))?;
        let rows = stmt.query_map(params![target_id.to_string()], target_row)?;
        rows.map(|r| decode_target_record(r?)).collect()
    }
}

// ── Row decoding ─────────────────────────────────────────────────

const TARGET_SELECT: &str = "SELECT id, target_id, source_record_id, external_id, document, \
     fingerprint, sync_state, conflict_note, diverged_at, created_at, updated_at \
     FROM target_records";

type SourceRow = (String, String, String, String, String, i64, i64);

#[allow(clippy::type_complexity)]
type TargetRow = (
    String,
    String,
    Option<String>,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<i64>,
    i64,
    i64,
);

fn source_row(row: &Row<'_>) -> rusqlite::Result<SourceRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn target_row(row: &Row<'_>) -> rusqlite::Result<TargetRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
        row.get(10)?,
    ))
}

fn decode_source_record(row: SourceRow) -> StorageResult<SourceRecord> {
    let (id, source_id, external_id, document, fingerprint, created, updated) = row;
    Ok(SourceRecord {
        id: parse_id(&id, "record")?,
        source_id: parse_id(&source_id, "source")?,
        external_id,
        document: serde_json::from_str(&document)?,
        fingerprint: parse_fingerprint(&fingerprint)?,
        created_at: from_micros(created)?,
        updated_at: from_micros(updated)?,
    })
}

fn decode_target_record(row: TargetRow) -> StorageResult<TargetRecord> {
    let (
        id,
        target_id,
        source_record_id,
        external_id,
        document,
        fingerprint,
        state,
        note,
        diverged_at,
        created,
        updated,
    ) = row;
    Ok(TargetRecord {
        id: parse_id(&id, "record")?,
        target_id: parse_id(&target_id, "target")?,
        source_record_id: source_record_id
            .as_deref()
            .map(|s| parse_id(s, "record"))
            .transpose()?,
        external_id,
        document: serde_json::from_str(&document)?,
        fingerprint: parse_fingerprint(&fingerprint)?,
        sync_state: decode_state(&state, note, diverged_at)?,
        created_at: from_micros(created)?,
        updated_at: from_micros(updated)?,
    })
}

fn parse_fingerprint(s: &str) -> StorageResult<Fingerprint> {
    Fingerprint::parse(s).map_err(|e| StorageError::InvalidData(e.to_string()))
}

fn encode_state(state: &SyncState) -> (&'static str, Option<&str>, Option<i64>) {
    match state {
        SyncState::Synced => ("synced", None, None),
        SyncState::Diverged { note, detected_at } => {
            ("diverged", Some(note.as_str()), Some(to_micros(*detected_at)))
        }
    }
}

fn decode_state(
    state: &str,
    note: Option<String>,
    diverged_at: Option<i64>,
) -> StorageResult<SyncState> {
    match state {
        "synced" => Ok(SyncState::Synced),
        "diverged" => {
            let (Some(note), Some(diverged_at)) = (note, diverged_at) else {
                return Err(StorageError::InvalidData(
                    "diverged record missing note or detection time".to_string(),
                ));
            };
            Ok(SyncState::Diverged {
                note,
                detected_at: from_micros(diverged_at)?,
            })
        }
        other => Err(StorageError::InvalidData(format!(
            "unknown sync state {other:?}"
        ))),
    }
}
