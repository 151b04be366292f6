use async_trait::async_trait;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

use crate::database::migrations::Migration;
use crate::database::params::{ConnectionParams, ParamsError};

/// Broad classification of a failed connection attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionErrorKind {
    Dns,
    Auth,
    Timeout,
    Refused,
    Tls,
    UnknownDatabase,
    InvalidParams,
    /// The cache discarded a creation that was still in flight
    Aborted,
    Other,
}

impl fmt::Display for ConnectionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Dns => "dns lookup failed",
            Self::Auth => "authentication failed",
            Self::Timeout => "timed out",
            Self::Refused => "connection refused",
            Self::Tls => "tls negotiation failed",
            Self::UnknownDatabase => "database does not exist",
            Self::InvalidParams => "invalid connection parameters",
            Self::Aborted => "connection discarded",
            Self::Other => "connection error",
        };
        f.write_str(label)
    }
}

/// Failure reaching a database. Cloneable so that every waiter on a shared
/// creation observes the same error. Messages never carry credentials.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ConnectionError {
    pub kind: ConnectionErrorKind,
    pub message: String,
}

impl ConnectionError {
    pub fn new(kind: ConnectionErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn timeout(what: &str) -> Self {
        Self::new(ConnectionErrorKind::Timeout, format!("{what} did not complete in time"))
    }

    pub fn aborted() -> Self {
        Self::new(
            ConnectionErrorKind::Aborted,
            "tenant connection was invalidated while it was being created",
        )
    }
}

impl From<ParamsError> for ConnectionError {
    fn from(err: ParamsError) -> Self {
        Self::new(ConnectionErrorKind::InvalidParams, err.to_string())
    }
}

/// An open, reusable handle to one tenant database.
///
/// Clones share the underlying resource; the connection cache owns it and
/// decides when `close` is called.
#[async_trait]
pub trait TenantHandle: Clone + Send + Sync + 'static {
    /// Trivial round trip
    async fn ping(&self) -> Result<(), ConnectionError>;

    /// True when the database (or namespace) holds no user tables
    async fn is_empty(&self) -> Result<bool, ConnectionError>;

    /// Create the namespace used by shared-database tenants
    async fn ensure_namespace(&self, schema: &str) -> Result<(), ConnectionError>;

    /// Remove a shared-database tenant's namespace and everything in it
    async fn drop_namespace(&self, schema: &str) -> Result<(), ConnectionError>;

    /// Versions recorded in the migration ledger
    async fn applied_migrations(&self) -> Result<BTreeSet<i64>, ConnectionError>;

    /// Run one migration and record it in the ledger atomically
    async fn apply_migration(&self, migration: &Migration) -> Result<(), ConnectionError>;

    async fn close(&self);
}

/// Server-level handle used only for database create/drop
#[async_trait]
pub trait AdminHandle: Send + Sync {
    async fn database_exists(&self, name: &str) -> Result<bool, ConnectionError>;

    async fn create_database(&self, name: &str) -> Result<(), ConnectionError>;

    async fn drop_database(&self, name: &str) -> Result<(), ConnectionError>;

    async fn close(&self);
}

/// Opens handles from connection parameters. Stateless apart from pool
/// tuning; every open is bounded by a timeout.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Handle: TenantHandle;
    type Admin: AdminHandle;

    async fn open_tenant_handle(&self, params: &ConnectionParams) -> Result<Self::Handle, ConnectionError>;

    async fn open_admin_handle(&self, params: &ConnectionParams) -> Result<Self::Admin, ConnectionError>;
}
