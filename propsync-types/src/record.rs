//! Record models for both sides of a reconciliation pair.
//!
//! Source records mirror what an external feed delivered; target records are
//! the engine-managed copies living in the destination system. Both carry an
//! opaque JSON document plus its canonical fingerprint. Target records
//! additionally carry an explicit sync state so the legal transitions around
//! manual edits are visible in the type rather than hidden in a flag column.

use crate::timestamp::now_utc;
use crate::{Fingerprint, RecordId, RunId, SnapshotId, SourceId, TargetId, TenantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// A record as last imported from a source system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRecord {
    /// Unique identifier for this record.
    pub id: RecordId,
    /// The source this record belongs to.
    pub source_id: SourceId,
    /// Identifier assigned by the external system; unique within the source.
    pub external_id: String,
    /// Opaque property document.
    pub document: Value,
    /// Canonical fingerprint of `document`.
    pub fingerprint: Fingerprint,
    /// When the record was first imported.
    pub created_at: DateTime<Utc>,
    /// When the record's document last changed.
    pub updated_at: DateTime<Utc>,
}

impl SourceRecord {
    /// Creates a new source record, fingerprinting the document.
    #[must_use]
    pub fn new(source_id: SourceId, external_id: impl Into<String>, document: Value) -> Self {
        let now = now_utc();
        let fingerprint = Fingerprint::of(&document);
        Self {
            id: RecordId::new(),
            source_id,
            external_id: external_id.into(),
            document,
            fingerprint,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Per-record sync state for a target record.
///
/// Transitions:
/// - `Synced -> Diverged` when manual drift is detected (a snapshot of the
///   last-synced document is captured first).
/// - `Diverged -> Diverged` when a later run refreshes the conflict note;
///   the original detection time is preserved.
/// - `Diverged -> Synced` only through an explicit resolution action, never
///   by a reconciliation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SyncState {
    /// Written by the engine; the next run may overwrite it.
    Synced,
    /// Human edits detected; automatic sync is disabled for this record.
    Diverged {
        /// Human-readable conflict note, refreshed on each run that finds
        /// the record still diverged.
        note: String,
        /// When the manual drift was first detected.
        detected_at: DateTime<Utc>,
    },
}

impl SyncState {
    /// Returns true if the record carries unreconciled manual edits.
    #[must_use]
    pub fn is_diverged(&self) -> bool {
        matches!(self, Self::Diverged { .. })
    }

    /// Returns the conflict note, if any.
    #[must_use]
    pub fn note(&self) -> Option<&str> {
        match self {
            Self::Synced => None,
            Self::Diverged { note, .. } => Some(note),
        }
    }

    /// Returns when manual drift was first detected, if diverged.
    #[must_use]
    pub fn detected_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Synced => None,
            Self::Diverged { detected_at, .. } => Some(*detected_at),
        }
    }
}

/// The engine-managed copy of a record in the destination system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetRecord {
    /// Unique identifier for this record.
    pub id: RecordId,
    /// The target this record belongs to.
    pub target_id: TargetId,
    /// The source record this copy was derived from, when known.
    pub source_record_id: Option<RecordId>,
    /// Identifier joining this record to its source counterpart; unique
    /// within the target.
    pub external_id: String,
    /// Opaque property document.
    pub document: Value,
    /// Canonical fingerprint of `document`.
    pub fingerprint: Fingerprint,
    /// Whether the record is engine-owned or carries manual edits.
    pub sync_state: SyncState,
    /// When the record was created by a run.
    pub created_at: DateTime<Utc>,
    /// When the record's document last changed.
    pub updated_at: DateTime<Utc>,
}

impl TargetRecord {
    /// Creates a new target record from a source record, linked back to it.
    #[must_use]
    pub fn from_source(target_id: TargetId, source: &SourceRecord) -> Self {
        let now = now_utc();
        Self {
            id: RecordId::new(),
            target_id,
            source_record_id: Some(source.id),
            external_id: source.external_id.clone(),
            document: source.document.clone(),
            fingerprint: source.fingerprint.clone(),
            sync_state: SyncState::Synced,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Which side of the pair a snapshot belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SnapshotSide {
    Source,
    Target,
}

impl SnapshotSide {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Source => "source",
            Self::Target => "target",
        }
    }
}

impl fmt::Display for SnapshotSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SnapshotSide {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "source" => Ok(Self::Source),
            "target" => Ok(Self::Target),
            other => Err(crate::Error::InvalidDiscriminant {
                kind: "snapshot side",
                value: other.to_string(),
            }),
        }
    }
}

/// Immutable pre-mutation copy of a record's document.
///
/// Captured immediately before an automated process overwrites the record,
/// never after, and never for human-originated edits themselves.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Unique identifier for this snapshot.
    pub id: SnapshotId,
    /// Which side's record was snapshotted.
    pub side: SnapshotSide,
    /// The record whose document was captured.
    pub record_id: RecordId,
    /// The document as it stood before the overwrite.
    pub document: Value,
    /// Fingerprint of `document` at capture time.
    pub fingerprint: Fingerprint,
    /// When the snapshot was captured.
    pub captured_at: DateTime<Utc>,
}

/// Aggregate counters for one reconciliation run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Target records created from unmatched source records.
    pub created: u64,
    /// Target records overwritten (after a snapshot).
    pub updated: u64,
    /// Records left untouched, including conflict skips.
    pub skipped: u64,
    /// Conflict skips: matched records whose manual edits blocked an update.
    /// Every warning is also counted in `skipped`.
    pub warnings: u64,
}

impl RunStats {
    /// Classifies the run: `Partial` as soon as any conflict was seen.
    #[must_use]
    pub fn status(&self) -> RunStatus {
        if self.warnings == 0 {
            RunStatus::Success
        } else {
            RunStatus::Partial
        }
    }
}

/// Outcome classification of a reconciliation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every source record was created, updated, or cleanly skipped.
    Success,
    /// The run completed but at least one record was conflict-skipped.
    Partial,
}

impl RunStatus {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            other => Err(crate::Error::InvalidDiscriminant {
                kind: "run status",
                value: other.to_string(),
            }),
        }
    }
}

/// Append-only audit log entry for one reconciliation invocation.
///
/// Written at the end of every run, including runs where every record was a
/// no-op — an executed empty sync is distinguishable from one that never ran.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Unique identifier for this run.
    pub id: RunId,
    /// Tenant the run executed under.
    pub tenant_id: TenantId,
    /// The source side of the pair.
    pub source_id: SourceId,
    /// The target side of the pair.
    pub target_id: TargetId,
    /// Outcome classification.
    pub status: RunStatus,
    /// Final counters.
    pub stats: RunStats,
    /// Optional free-text context.
    pub message: Option<String>,
    /// When the run completed.
    pub created_at: DateTime<Utc>,
}

/// Counters returned by an import call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    /// Source records created on first sight of an external id.
    pub created: u64,
    /// Source records overwritten because their content changed.
    pub updated: u64,
}
