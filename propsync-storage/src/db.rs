//! SQLite connection management and schema initialization.
//!
//! One `Database` wraps one connection behind a mutex; the individual stores
//! clone the handle and share it. Engine operations that must be atomic wrap
//! their store calls in a [`UnitOfWork`]. While a unit of work is open, the
//! connection gate admits only the thread that opened it: store calls from
//! other threads block until commit or rollback, so a standalone write can
//! never land inside someone else's transaction and be undone with it.

use crate::error::{StorageError, StorageResult};
use rusqlite::Connection;
use std::ops::Deref;
use std::path::Path;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

/// Shared handle to the propsync SQLite database.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
    gate: Arc<TxGate>,
}

impl Database {
    /// Opens (or creates) the database at the given path and ensures the
    /// schema exists.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory database (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> StorageResult<Self> {
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
            gate: Arc::new(TxGate::default()),
        };
        db.init_schema()?;
        Ok(db)
    }

    pub(crate) fn conn(&self) -> ConnGuard<'_> {
        let gate = self.gate.enter();
        ConnGuard {
            conn: self.conn.lock().unwrap(),
            _gate: gate,
        }
    }

    /// Begins a unit of work. All store calls made by this thread until
    /// `commit` execute inside one SQLite transaction; dropping the guard
    /// without committing rolls everything back. Store calls from other
    /// threads wait at the gate until the unit of work ends.
    pub fn begin(&self) -> StorageResult<UnitOfWork<'_>> {
        let gate = self.gate.enter();
        self.conn().execute_batch("BEGIN IMMEDIATE")?;
        Ok(UnitOfWork {
            db: self,
            _gate: gate,
            committed: false,
        })
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tenants (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                api_key TEXT NOT NULL UNIQUE,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sources (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                config TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sources_tenant_id ON sources(tenant_id);

            CREATE TABLE IF NOT EXISTS targets (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                config TEXT,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_targets_tenant_id ON targets(tenant_id);

            CREATE TABLE IF NOT EXISTS source_records (
                id TEXT PRIMARY KEY,
                source_id TEXT NOT NULL REFERENCES sources(id),
                external_id TEXT NOT NULL,
                document TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(source_id, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_source_records_source_id
                ON source_records(source_id);
            CREATE INDEX IF NOT EXISTS idx_source_records_fingerprint
                ON source_records(fingerprint);

            CREATE TABLE IF NOT EXISTS target_records (
                id TEXT PRIMARY KEY,
                target_id TEXT NOT NULL REFERENCES targets(id),
                source_record_id TEXT,
                external_id TEXT NOT NULL,
                document TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                sync_state TEXT NOT NULL DEFAULT 'synced',
                conflict_note TEXT,
                diverged_at INTEGER,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(target_id, external_id)
            );
            CREATE INDEX IF NOT EXISTS idx_target_records_target_id
                ON target_records(target_id);
            CREATE INDEX IF NOT EXISTS idx_target_records_fingerprint
                ON target_records(fingerprint);
            CREATE INDEX IF NOT EXISTS idx_target_records_sync_state
                ON target_records(sync_state);

            CREATE TABLE IF NOT EXISTS snapshots (
                id TEXT PRIMARY KEY,
                side TEXT NOT NULL,
                record_id TEXT NOT NULL,
                document TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                captured_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_snapshots_record_id
                ON snapshots(record_id);
            CREATE INDEX IF NOT EXISTS idx_snapshots_captured_at
                ON snapshots(captured_at);

            CREATE TABLE IF NOT EXISTS sync_runs (
                id TEXT PRIMARY KEY,
                tenant_id TEXT NOT NULL REFERENCES tenants(id),
                source_id TEXT NOT NULL,
                target_id TEXT NOT NULL,
                status TEXT NOT NULL,
                stats TEXT NOT NULL,
                message TEXT,
                created_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sync_runs_tenant_id ON sync_runs(tenant_id);
            CREATE INDEX IF NOT EXISTS idx_sync_runs_created_at ON sync_runs(created_at);
            ",
        )?;
        Ok(())
    }
}

/// Thread-aware connection gate.
///
/// Re-entrant for the holding thread (a unit of work keeps issuing
/// statements into its own transaction); exclusive against every other
/// thread until the holder's depth drops back to zero.
#[derive(Default)]
struct TxGate {
    state: Mutex<GateState>,
    released: Condvar,
}

#[derive(Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

impl TxGate {
    fn enter(&self) -> GateToken<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock().unwrap();
        while state.owner.is_some_and(|owner| owner != me) {
            state = self.released.wait(state).unwrap();
        }
        state.owner = Some(me);
        state.depth += 1;
        GateToken { gate: self }
    }
}

struct GateToken<'a> {
    gate: &'a TxGate,
}

impl Drop for GateToken<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock().unwrap();
        state.depth -= 1;
        if state.depth == 0 {
            state.owner = None;
            self.gate.released.notify_all();
        }
    }
}

/// Gated access to the connection for the duration of one store call.
pub(crate) struct ConnGuard<'a> {
    conn: MutexGuard<'a, Connection>,
    _gate: GateToken<'a>,
}

impl Deref for ConnGuard<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        &self.conn
    }
}

/// An open transaction spanning multiple store calls.
///
/// Rolls back on drop unless [`commit`](UnitOfWork::commit) is called.
pub struct UnitOfWork<'a> {
    db: &'a Database,
    _gate: GateToken<'a>,
    committed: bool,
}

impl UnitOfWork<'_> {
    /// Commits the transaction.
    pub fn commit(mut self) -> StorageResult<()> {
        self.db.conn().execute_batch("COMMIT")?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for UnitOfWork<'_> {
    fn drop(&mut self) {
        if !self.committed {
            if let Err(e) = self.db.conn().execute_batch("ROLLBACK") {
                tracing::warn!("rollback failed: {e}");
            }
        }
    }
}

// ── Row conversion helpers shared by the stores ──────────────────

pub(crate) fn parse_id<T>(s: &str, what: &str) -> StorageResult<T>
where
    T: std::str::FromStr<Err = uuid::Error>,
{
    s.parse()
        .map_err(|e| StorageError::InvalidData(format!("invalid {what} id {s:?}: {e}")))
}

pub(crate) fn to_micros(ts: chrono::DateTime<chrono::Utc>) -> i64 {
    ts.timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> StorageResult<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| StorageError::InvalidData(format!("timestamp out of range: {micros}")))
}
