use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use sqlx::Executor;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::TenantDatabaseConfig;
use crate::database::connection::{
    AdminHandle, ConnectionError, ConnectionErrorKind, ConnectionFactory, TenantHandle,
};
use crate::database::migrations::{Migration, LEDGER_TABLE};
use crate::database::params::{quote_identifier, ConnectionParams};

/// Opens sqlx pools for tenant databases and single-connection pools for
/// administrative work on the server
#[derive(Debug, Clone)]
pub struct PgConnectionFactory {
    max_connections: u32,
    connect_timeout: Duration,
    idle_timeout: Option<Duration>,
}

impl PgConnectionFactory {
    pub fn new(config: &TenantDatabaseConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            idle_timeout: Some(Duration::from_secs(config.idle_timeout_secs)),
        }
    }

    async fn open_pool(&self, params: &ConnectionParams, max_connections: u32) -> Result<PgPool, ConnectionError> {
        let options = connect_options(params)?;
        let connecting = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(self.connect_timeout)
            .idle_timeout(self.idle_timeout)
            .connect_with(options);

        match tokio::time::timeout(self.connect_timeout, connecting).await {
            Ok(Ok(pool)) => Ok(pool),
            Ok(Err(e)) => Err(classify(e)),
            Err(_) => Err(ConnectionError::timeout("connect")),
        }
    }
}

#[async_trait]
impl ConnectionFactory for PgConnectionFactory {
    type Handle = PgPool;
    type Admin = PgAdmin;

    async fn open_tenant_handle(&self, params: &ConnectionParams) -> Result<PgPool, ConnectionError> {
        let pool = self.open_pool(params, self.max_connections).await?;
        debug!(database = %params.redacted_url(), "Opened tenant pool");
        Ok(pool)
    }

    async fn open_admin_handle(&self, params: &ConnectionParams) -> Result<PgAdmin, ConnectionError> {
        let pool = self.open_pool(params, 1).await?;
        debug!(server = %params.redacted_url(), "Opened admin connection");
        Ok(PgAdmin { pool })
    }
}

/// Translate parameters into sqlx options; URL wins over structured fields
fn connect_options(params: &ConnectionParams) -> Result<PgConnectOptions, ConnectionError> {
    let params = params.resolved()?;

    let mut options = PgConnectOptions::new()
        .host(&params.host)
        .port(params.port)
        .database(&params.database)
        .username(&params.user)
        .ssl_mode(if params.ssl { PgSslMode::Require } else { PgSslMode::Prefer });

    if let Some(password) = &params.password {
        options = options.password(password);
    }
    if let Some(schema) = &params.schema {
        options = options.options([("search_path", schema.as_str())]);
    }

    Ok(options)
}

/// Map driver errors onto connection error kinds without echoing the
/// connection string
fn classify(err: sqlx::Error) -> ConnectionError {
    use ConnectionErrorKind::*;

    match err {
        sqlx::Error::Io(e) => {
            let kind = match e.kind() {
                std::io::ErrorKind::ConnectionRefused => Refused,
                std::io::ErrorKind::TimedOut => Timeout,
                _ if e.to_string().contains("lookup address") => Dns,
                _ => Other,
            };
            ConnectionError::new(kind, e.to_string())
        }
        sqlx::Error::Tls(e) => ConnectionError::new(Tls, e.to_string()),
        sqlx::Error::PoolTimedOut => ConnectionError::timeout("pool acquire"),
        sqlx::Error::Database(db) => {
            let kind = match db.code().as_deref() {
                Some("28P01") | Some("28000") => Auth,
                Some("3D000") => UnknownDatabase,
                _ => Other,
            };
            ConnectionError::new(kind, db.message().to_string())
        }
        sqlx::Error::Configuration(e) => ConnectionError::new(InvalidParams, e.to_string()),
        other => ConnectionError::new(Other, other.to_string()),
    }
}

#[async_trait]
impl TenantHandle for PgPool {
    async fn ping(&self) -> Result<(), ConnectionError> {
        sqlx::query("SELECT 1").execute(self).await.map_err(classify)?;
        Ok(())
    }

    async fn is_empty(&self) -> Result<bool, ConnectionError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = current_schema() AND table_name <> $1",
        )
        .bind(LEDGER_TABLE)
        .fetch_one(self)
        .await
        .map_err(classify)?;

        Ok(count == 0)
    }

    async fn ensure_namespace(&self, schema: &str) -> Result<(), ConnectionError> {
        let statement = format!("CREATE SCHEMA IF NOT EXISTS {}", quote_identifier(schema));
        self.execute(statement.as_str()).await.map_err(classify)?;
        Ok(())
    }

    async fn drop_namespace(&self, schema: &str) -> Result<(), ConnectionError> {
        let statement = format!("DROP SCHEMA IF EXISTS {} CASCADE", quote_identifier(schema));
        self.execute(statement.as_str()).await.map_err(classify)?;
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<BTreeSet<i64>, ConnectionError> {
        let ledger = format!(
            "CREATE TABLE IF NOT EXISTS {LEDGER_TABLE} (\
                version BIGINT PRIMARY KEY, \
                name TEXT NOT NULL, \
                applied_at TIMESTAMPTZ NOT NULL DEFAULT now())"
        );
        self.execute(ledger.as_str()).await.map_err(classify)?;

        let versions: Vec<(i64,)> = sqlx::query_as(&format!("SELECT version FROM {LEDGER_TABLE}"))
            .fetch_all(self)
            .await
            .map_err(classify)?;

        Ok(versions.into_iter().map(|(v,)| v).collect())
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), ConnectionError> {
        let mut tx = self.begin().await.map_err(classify)?;

        // Simple-query protocol so a file may hold several statements
        (&mut *tx).execute(migration.sql.as_str()).await.map_err(classify)?;

        sqlx::query(&format!(
            "INSERT INTO {LEDGER_TABLE} (version, name) VALUES ($1, $2) ON CONFLICT (version) DO NOTHING"
        ))
        .bind(migration.version)
        .bind(&migration.name)
        .execute(&mut *tx)
        .await
        .map_err(classify)?;

        tx.commit().await.map_err(classify)?;
        Ok(())
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}

/// Single-connection handle to the server's maintenance database
pub struct PgAdmin {
    pool: PgPool,
}

#[async_trait]
impl AdminHandle for PgAdmin {
    async fn database_exists(&self, name: &str) -> Result<bool, ConnectionError> {
        let (exists,): (bool,) = sqlx::query_as("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(name)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;
        Ok(exists)
    }

    async fn create_database(&self, name: &str) -> Result<(), ConnectionError> {
        let statement = format!("CREATE DATABASE {}", quote_identifier(name));
        self.pool.execute(statement.as_str()).await.map_err(classify)?;
        info!(database = name, "Created database");
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), ConnectionError> {
        let statement = format!("DROP DATABASE IF EXISTS {}", quote_identifier(name));
        self.pool.execute(statement.as_str()).await.map_err(classify)?;
        info!(database = name, "Dropped database");
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_errors_are_classified() {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify(sqlx::Error::Io(refused)).kind, ConnectionErrorKind::Refused);

        let dns = std::io::Error::new(
            std::io::ErrorKind::Other,
            "failed to lookup address information: Name or service not known",
        );
        assert_eq!(classify(sqlx::Error::Io(dns)).kind, ConnectionErrorKind::Dns);

        assert_eq!(classify(sqlx::Error::PoolTimedOut).kind, ConnectionErrorKind::Timeout);
    }

    #[test]
    fn invalid_url_is_rejected_before_connecting() {
        let params = ConnectionParams {
            host: "ignored".to_string(),
            port: 5432,
            database: "ignored".to_string(),
            user: "ignored".to_string(),
            password: None,
            ssl: false,
            schema: None,
            url: Some("mysql://nope".to_string()),
        };
        let err = connect_options(&params).unwrap_err();
        assert_eq!(err.kind, ConnectionErrorKind::InvalidParams);
    }

    #[tokio::test]
    async fn unreachable_host_fails_with_connection_error() {
        let factory = PgConnectionFactory {
            max_connections: 1,
            connect_timeout: Duration::from_millis(500),
            idle_timeout: None,
        };
        let params = ConnectionParams::from_url("postgres://u:p@127.0.0.1:1/nowhere").unwrap();
        let err = factory.open_tenant_handle(&params).await.unwrap_err();
        assert!(!err.to_string().contains(":p@"));
    }
}
