use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, QueryBuilder};
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::RegistryConfig;
use crate::database::models::tenant::{DatabaseStatus, DatabaseType, Tenant, TenantRow};
use crate::database::params::ConnectionParams;

const REGISTRY_SCHEMA: &str = include_str!("../../migrations/registry/0001_tenants.sql");

const TENANT_COLUMNS: &str = "id, slug, database_type, database_status, \
    db_host, db_port, db_name, db_user, db_password, db_ssl, db_schema, db_url, \
    migration_version, last_error, last_health_checked_at, created_at, updated_at";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Tenant not found: {0}")]
    NotFound(String),

    #[error("Tenant already exists: {0}")]
    Conflict(String),

    #[error("Invalid tenant slug: {0}")]
    InvalidSlug(String),

    #[error("Registry store unavailable: {0}")]
    Unavailable(String),

    #[error("Registry query failed: {0}")]
    Query(String),

    #[error("Corrupt tenant record: {0}")]
    Corrupt(String),
}

/// Fields a provisioning step may write alongside a status change.
/// `None` leaves the column untouched; `last_error: Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct TenantDatabaseUpdate {
    pub database_type: Option<DatabaseType>,
    pub connection_params: Option<ConnectionParams>,
    pub migration_version: Option<i64>,
    pub last_error: Option<Option<String>>,
}

impl TenantDatabaseUpdate {
    pub fn clear_error() -> Self {
        Self {
            last_error: Some(None),
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            last_error: Some(Some(message.into())),
            ..Default::default()
        }
    }
}

/// Authoritative source of tenant existence, status and connection
/// parameters. Implementations never cache: every read is fresh.
#[async_trait]
pub trait RegistryStore: Send + Sync {
    async fn get_tenant_by_id(&self, id: Uuid) -> Result<Tenant, RegistryError>;

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant, RegistryError>;

    async fn list_tenants(&self) -> Result<Vec<Tenant>, RegistryError>;

    async fn create_tenant(&self, slug: &str) -> Result<Tenant, RegistryError>;

    /// Atomic partial update; writes only the fields present in `fields`
    async fn update_tenant_database_status(
        &self,
        id: Uuid,
        status: DatabaseStatus,
        fields: TenantDatabaseUpdate,
    ) -> Result<Tenant, RegistryError>;

    async fn record_health_check(&self, id: Uuid, checked_at: DateTime<Utc>) -> Result<(), RegistryError>;

    /// Reset the tenant's database columns after its database was dropped
    async fn mark_deprovisioned(&self, id: Uuid) -> Result<Tenant, RegistryError>;

    async fn ping(&self) -> Result<(), RegistryError>;

    async fn close(&self);
}

/// Registry backed by the shared PostgreSQL metadata database
pub struct PgRegistryStore {
    pool: PgPool,
}

impl PgRegistryStore {
    /// Connect with a bounded number of attempts and exponential backoff.
    /// Exhausting the attempts is fatal for the whole platform.
    pub async fn connect(config: &RegistryConfig) -> Result<Self, RegistryError> {
        let attempts = config.reconnect_attempts.max(1);
        let mut delay = Duration::from_millis(250);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            let connected = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
                .connect(&config.url)
                .await;

            match connected {
                Ok(pool) => {
                    info!(attempt, "Connected to registry database");
                    return Ok(Self { pool });
                }
                Err(e) => {
                    last_error = classify(e).to_string();
                    warn!(attempt, attempts, error = %last_error, "Registry connection attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    }
                }
            }
        }

        Err(RegistryError::Unavailable(last_error))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the `tenants` table when missing
    pub async fn ensure_schema(&self) -> Result<(), RegistryError> {
        sqlx::Executor::execute(&self.pool, REGISTRY_SCHEMA)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn fetch_one_by(&self, column: &str, value: Uuid) -> Result<Tenant, RegistryError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE {column} = $1"
        ))
        .bind(value)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        into_tenant(row.ok_or_else(|| RegistryError::NotFound(value.to_string()))?)
    }
}

#[async_trait]
impl RegistryStore for PgRegistryStore {
    async fn get_tenant_by_id(&self, id: Uuid) -> Result<Tenant, RegistryError> {
        self.fetch_one_by("id", id).await
    }

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant, RegistryError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants WHERE slug = $1"
        ))
        .bind(slug)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        into_tenant(row.ok_or_else(|| RegistryError::NotFound(slug.to_string()))?)
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, RegistryError> {
        let rows = sqlx::query_as::<_, TenantRow>(&format!(
            "SELECT {TENANT_COLUMNS} FROM tenants ORDER BY created_at"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(classify)?;

        rows.into_iter().map(into_tenant).collect()
    }

    async fn create_tenant(&self, slug: &str) -> Result<Tenant, RegistryError> {
        Tenant::validate_slug(slug).map_err(RegistryError::InvalidSlug)?;

        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "INSERT INTO tenants (id, slug) VALUES ($1, $2) RETURNING {TENANT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(slug)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match classify(e) {
            RegistryError::Conflict(_) => RegistryError::Conflict(slug.to_string()),
            other => other,
        })?;

        into_tenant(row)
    }

    async fn update_tenant_database_status(
        &self,
        id: Uuid,
        status: DatabaseStatus,
        fields: TenantDatabaseUpdate,
    ) -> Result<Tenant, RegistryError> {
        let mut query = QueryBuilder::<Postgres>::new("UPDATE tenants SET database_status = ");
        query.push_bind(status.as_str());

        if let Some(database_type) = fields.database_type {
            query.push(", database_type = ").push_bind(database_type.as_str());
        }
        if let Some(params) = fields.connection_params {
            query
                .push(", db_host = ")
                .push_bind(params.host)
                .push(", db_port = ")
                .push_bind(i32::from(params.port))
                .push(", db_name = ")
                .push_bind(params.database)
                .push(", db_user = ")
                .push_bind(params.user)
                .push(", db_password = ")
                .push_bind(params.password)
                .push(", db_ssl = ")
                .push_bind(params.ssl)
                .push(", db_schema = ")
                .push_bind(params.schema)
                .push(", db_url = ")
                .push_bind(params.url);
        }
        if let Some(version) = fields.migration_version {
            query.push(", migration_version = ").push_bind(version);
        }
        if let Some(last_error) = fields.last_error {
            query.push(", last_error = ").push_bind(last_error);
        }

        query
            .push(", updated_at = now() WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(TENANT_COLUMNS);

        let row = query
            .build_query_as::<TenantRow>()
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        into_tenant(row.ok_or_else(|| RegistryError::NotFound(id.to_string()))?)
    }

    async fn record_health_check(&self, id: Uuid, checked_at: DateTime<Utc>) -> Result<(), RegistryError> {
        let result = sqlx::query("UPDATE tenants SET last_health_checked_at = $2 WHERE id = $1")
            .bind(id)
            .bind(checked_at)
            .execute(&self.pool)
            .await
            .map_err(classify)?;

        if result.rows_affected() == 0 {
            return Err(RegistryError::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn mark_deprovisioned(&self, id: Uuid) -> Result<Tenant, RegistryError> {
        let row = sqlx::query_as::<_, TenantRow>(&format!(
            "UPDATE tenants SET database_type = 'none', database_status = 'none', \
             db_host = NULL, db_port = NULL, db_name = NULL, db_user = NULL, db_password = NULL, \
             db_ssl = false, db_schema = NULL, db_url = NULL, migration_version = NULL, \
             last_error = NULL, last_health_checked_at = NULL, updated_at = now() \
             WHERE id = $1 RETURNING {TENANT_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(classify)?;

        into_tenant(row.ok_or_else(|| RegistryError::NotFound(id.to_string()))?)
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await.map_err(classify)?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
        info!("Closed registry database pool");
    }
}

fn into_tenant(row: TenantRow) -> Result<Tenant, RegistryError> {
    Tenant::try_from(row).map_err(RegistryError::Corrupt)
}

/// Map driver errors onto the registry taxonomy
fn classify(err: sqlx::Error) -> RegistryError {
    match err {
        sqlx::Error::RowNotFound => RegistryError::NotFound("row".to_string()),
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            RegistryError::Unavailable("connection pool exhausted or closed".to_string())
        }
        sqlx::Error::Io(e) => RegistryError::Unavailable(format!("i/o error: {}", e.kind())),
        sqlx::Error::Tls(_) => RegistryError::Unavailable("tls negotiation failed".to_string()),
        sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
            RegistryError::Conflict(db.message().to_string())
        }
        other => RegistryError::Query(other.to_string()),
    }
}
