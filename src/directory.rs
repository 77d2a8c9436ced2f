//! External principal data access.
//!
//! CRUD for principals and credentials lives elsewhere; this subsystem only
//! reads. The [`Directory`] trait is the narrow seam, and [`PgDirectory`]
//! is the production implementation over Postgres.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::fmt;
use tracing::Instrument;

use crate::principal::PrincipalKind;

/// A user, admin, or manager row joined with its credential record.
#[derive(Clone, Debug)]
pub struct HumanRecord {
    pub id: i64,
    pub email: String,
    /// PHC-format Argon2 hash; `None` when no credential is provisioned.
    pub password_hash: Option<String>,
    pub active: bool,
}

/// A device row joined with its key material.
#[derive(Clone)]
pub struct DeviceRecord {
    pub id: i64,
    /// 32-byte symmetric key; `None` when not provisioned.
    pub key: Option<Vec<u8>>,
    /// Coarse bearer secret checked before the puzzle.
    pub api_key: Option<String>,
    pub active: bool,
}

impl fmt::Debug for DeviceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRecord")
            .field("id", &self.id)
            .field("key", &self.key.as_ref().map(|_| "[redacted]"))
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .field("active", &self.active)
            .finish()
    }
}

/// Read-only lookups against the principal data store.
#[async_trait]
pub trait Directory: Send + Sync {
    /// Look up a human principal by normalized email. `kind` must be a
    /// human kind; implementations return `Ok(None)` for
    /// [`PrincipalKind::Device`].
    async fn find_human_by_email(
        &self,
        kind: PrincipalKind,
        email: &str,
    ) -> Result<Option<HumanRecord>>;

    /// Look up a human principal by id.
    async fn find_human(&self, kind: PrincipalKind, id: i64) -> Result<Option<HumanRecord>>;

    /// Look up a device by id.
    async fn find_device(&self, id: i64) -> Result<Option<DeviceRecord>>;
}

/// Directory over the platform's relational schema.
#[derive(Clone, Debug)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn table(kind: PrincipalKind) -> Option<&'static str> {
        match kind {
            PrincipalKind::User => Some("users"),
            PrincipalKind::Admin => Some("admins"),
            PrincipalKind::Manager => Some("managers"),
            PrincipalKind::Device => None,
        }
    }

    async fn fetch_human(
        &self,
        table: &str,
        column: &str,
        query: String,
        bind: HumanLookup<'_>,
    ) -> Result<Option<HumanRecord>> {
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = %query
        );
        let mut prepared = sqlx::query(&query);
        prepared = match bind {
            HumanLookup::Email(email) => prepared.bind(email),
            HumanLookup::Id(id) => prepared.bind(id),
        };
        let row = prepared
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .with_context(|| format!("failed to lookup {table} by {column}"))?;

        Ok(row.map(|row| HumanRecord {
            id: row.get("id"),
            email: row.get("email"),
            password_hash: row.get("password_hash"),
            active: row.get("active"),
        }))
    }
}

enum HumanLookup<'a> {
    Email(&'a str),
    Id(i64),
}

#[async_trait]
impl Directory for PgDirectory {
    async fn find_human_by_email(
        &self,
        kind: PrincipalKind,
        email: &str,
    ) -> Result<Option<HumanRecord>> {
        let Some(table) = Self::table(kind) else {
            return Ok(None);
        };
        let query =
            format!("SELECT id, email, password_hash, active FROM {table} WHERE email = $1");
        self.fetch_human(table, "email", query, HumanLookup::Email(email))
            .await
    }

    async fn find_human(&self, kind: PrincipalKind, id: i64) -> Result<Option<HumanRecord>> {
        let Some(table) = Self::table(kind) else {
            return Ok(None);
        };
        let query = format!("SELECT id, email, password_hash, active FROM {table} WHERE id = $1");
        self.fetch_human(table, "id", query, HumanLookup::Id(id)).await
    }

    async fn find_device(&self, id: i64) -> Result<Option<DeviceRecord>> {
        let query = "SELECT id, encryption_key, api_key, active FROM devices WHERE id = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(id)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup device")?;

        Ok(row.map(|row| DeviceRecord {
            id: row.get("id"),
            key: row.get("encryption_key"),
            api_key: row.get("api_key"),
            active: row.get("active"),
        }))
    }
}
