//! Tenant, source and target registry.
//!
//! Every query below is tenant-scoped: the storage layer never resolves a
//! source or target without the caller's tenant id in the filter.

use crate::db::{from_micros, parse_id, to_micros, Database};
use crate::error::StorageResult;
use chrono::{DateTime, Utc};
use propsync_types::{now_utc, SourceId, TargetId, TenantId};
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Isolation boundary that owns sources, targets and run history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub api_key: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered origin of truth data (feed, import, upstream system).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub id: SourceId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Free-form connector kind, e.g. "json_feed".
    pub kind: String,
    /// Opaque connector configuration.
    pub config: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A registered destination system whose copy the engine maintains.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Target {
    pub id: TargetId,
    pub tenant_id: TenantId,
    pub name: String,
    pub kind: String,
    pub config: Option<Value>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Store for tenants and their sources/targets.
#[derive(Clone)]
pub struct Registry {
    db: Database,
}

impl Registry {
    /// Creates a registry over the shared database handle.
    pub fn new(db: &Database) -> Self {
        Self { db: db.clone() }
    }

    // ── Tenants ──────────────────────────────────────────────────

    /// Creates a tenant.
    pub fn create_tenant(
        &self,
        name: impl Into<String>,
        api_key: impl Into<String>,
    ) -> StorageResult<Tenant> {
        let tenant = Tenant {
            id: TenantId::new(),
            name: name.into(),
            api_key: api_key.into(),
            created_at: now_utc(),
            updated_at: now_utc(),
        };
        self.db.conn().execute(
            "INSERT INTO tenants (id, name, api_key, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                tenant.id.to_string(),
                tenant.name,
                tenant.api_key,
                to_micros(tenant.created_at),
                to_micros(tenant.updated_at),
            ],
        )?;
        Ok(tenant)
    }

    /// Looks up a tenant by id.
    pub fn get_tenant(&self, id: TenantId) -> StorageResult<Option<Tenant>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, name, api_key, created_at, updated_at
                 FROM tenants WHERE id = ?1",
                params![id.to_string()],
                tenant_row,
            )
            .optional()?;
        row.map(decode_tenant).transpose()
    }

    /// Looks up a tenant by API key (used by the outer API layer for
    /// authentication; the core itself only needs the id).
    pub fn find_tenant_by_api_key(&self, api_key: &str) -> StorageResult<Option<Tenant>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, name, api_key, created_at, updated_at
                 FROM tenants WHERE api_key = ?1",
                params![api_key],
                tenant_row,
            )
            .optional()?;
        row.map(decode_tenant).transpose()
    }

    // ── Sources ──────────────────────────────────────────────────

    /// Registers a source under a tenant.
    pub fn create_source(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: Option<Value>,
    ) -> StorageResult<Source> {
        let source = Source {
            id: SourceId::new(),
            tenant_id,
            name: name.into(),
            kind: kind.into(),
            config,
            is_active: true,
            created_at: now_utc(),
            updated_at: now_utc(),
        };
        let config_text = source
            .config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.conn().execute(
            "INSERT INTO sources (id, tenant_id, name, kind, config, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                source.id.to_string(),
                source.tenant_id.to_string(),
                source.name,
                source.kind,
                config_text,
                source.is_active,
                to_micros(source.created_at),
                to_micros(source.updated_at),
            ],
        )?;
        Ok(source)
    }

    /// Looks up a source by id, scoped to the tenant.
    pub fn get_source(&self, tenant_id: TenantId, id: SourceId) -> StorageResult<Option<Source>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, tenant_id, name, kind, config, is_active, created_at, updated_at
                 FROM sources WHERE id = ?1 AND tenant_id = ?2",
                params![id.to_string(), tenant_id.to_string()],
                owned_row,
            )
            .optional()?;
        row.map(decode_source).transpose()
    }

    /// Lists a tenant's sources.
    pub fn list_sources(&self, tenant_id: TenantId) -> StorageResult<Vec<Source>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, kind, config, is_active, created_at, updated_at
             FROM sources WHERE tenant_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![tenant_id.to_string()], owned_row)?;
        rows.map(|r| decode_source(r?)).collect()
    }

    // ── Targets ──────────────────────────────────────────────────

    /// Registers a target under a tenant.
    pub fn create_target(
        &self,
        tenant_id: TenantId,
        name: impl Into<String>,
        kind: impl Into<String>,
        config: Option<Value>,
    ) -> StorageResult<Target> {
        let target = Target {
            id: TargetId::new(),
            tenant_id,
            name: name.into(),
            kind: kind.into(),
            config,
            is_active: true,
            created_at: now_utc(),
            updated_at: now_utc(),
        };
        let config_text = target
            .config
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        self.db.conn().execute(
            "INSERT INTO targets (id, tenant_id, name, kind, config, is_active, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                target.id.to_string(),
                target.tenant_id.to_string(),
                target.name,
                target.kind,
                config_text,
                target.is_active,
                to_micros(target.created_at),
                to_micros(target.updated_at),
            ],
        )?;
        Ok(target)
    }

    /// Looks up a target by id, scoped to the tenant.
    pub fn get_target(&self, tenant_id: TenantId, id: TargetId) -> StorageResult<Option<Target>> {
        let conn = self.db.conn();
        let row = conn
            .query_row(
                "SELECT id, tenant_id, name, kind, config, is_active, created_at, updated_at
                 FROM targets WHERE id = ?1 AND tenant_id = ?2",
                params![id.to_string(), tenant_id.to_string()],
                owned_row,
            )
            .optional()?;
        row.map(decode_target).transpose()
    }

    /// Lists a tenant's targets.
    pub fn list_targets(&self, tenant_id: TenantId) -> StorageResult<Vec<Target>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT id, tenant_id, name, kind, config, is_active, created_at, updated_at
             FROM targets WHERE tenant_id = ?1 ORDER BY created_at",
        )?;
        let rows = stmt.query_map(params![tenant_id.to_string()], owned_row)?;
        rows.map(|r| decode_target(r?)).collect()
    }
}

// ── Row decoding ─────────────────────────────────────────────────

type TenantRow = (String, String, String, i64, i64);
type OwnedRow = (String, String, String, String, Option<String>, bool, i64, i64);

fn tenant_row(row: &Row<'_>) -> rusqlite::Result<TenantRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn owned_row(row: &Row<'_>) -> rusqlite::Result<OwnedRow> {
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

fn decode_tenant((id, name, api_key, created, updated): TenantRow) -> StorageResult<Tenant> {
    Ok(Tenant {
        id: parse_id(&id, "tenant")?,
        name,
        api_key,
        created_at: from_micros(created)?,
        updated_at: from_micros(updated)?,
    })
}

fn decode_source(row: OwnedRow) -> StorageResult<Source> {
    let (id, tenant_id, name, kind, config, is_active, created, updated) = row;
    Ok(Source {
        id: parse_id(&id, "source")?,
        tenant_id: parse_id(&tenant_id, "tenant")?,
        name,
        kind,
        config: config.as_deref().map(serde_json::from_str).transpose()?,
        is_active,
        created_at: from_micros(created)?,
        updated_at: from_micros(updated)?,
    })
}

fn decode_target(row: OwnedRow) -> StorageResult<Target> {
    let (id, tenant_id, name, kind, config, is_active, created, updated) = row;
    Ok(Target {
        id: parse_id(&id, "target")?,
        tenant_id: parse_id(&tenant_id, "tenant")?,
        name,
        kind,
        config: config.as_deref().map(serde_json::from_str).transpose()?,
        is_active,
        created_at: from_micros(created)?,
        updated_at: from_micros(updated)?,
    })
}
