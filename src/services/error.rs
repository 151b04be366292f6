use thiserror::Error;

use crate::database::connection::ConnectionError;
use crate::database::migrations::MigrationFailure;
use crate::database::models::DatabaseStatus;
use crate::database::params::ParamsError;
use crate::database::registry::RegistryError;

#[derive(Debug, Error)]
pub enum TenantError {
    #[error("Tenant not found: {0}")]
    TenantNotFound(String),

    #[error("Tenant database is not ready (status: {0})")]
    TenantNotReady(DatabaseStatus),

    #[error("Tenant has no provisioned database")]
    NotProvisioned,

    #[error("Cannot {operation} while tenant database is {status}")]
    InvalidTransition {
        operation: &'static str,
        status: DatabaseStatus,
    },

    #[error("Tenant already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Provisioning conflict: {0}")]
    ProvisioningConflict(String),

    #[error(transparent)]
    Migration(#[from] MigrationFailure),

    #[error("Step '{step}' timed out after {seconds}s")]
    Timeout { step: &'static str, seconds: u64 },

    #[error("Provisioning hook '{hook}' failed: {message}")]
    Hook { hook: String, message: String },

    #[error("Registry store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Registry error: {0}")]
    Registry(String),
}

impl From<RegistryError> for TenantError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::NotFound(id) => TenantError::TenantNotFound(id),
            RegistryError::Conflict(slug) => TenantError::AlreadyExists(slug),
            RegistryError::InvalidSlug(msg) => TenantError::InvalidRequest(msg),
            RegistryError::Unavailable(msg) => TenantError::StoreUnavailable(msg),
            other @ (RegistryError::Query(_) | RegistryError::Corrupt(_)) => TenantError::Registry(other.to_string()),
        }
    }
}

impl From<ParamsError> for TenantError {
    fn from(err: ParamsError) -> Self {
        TenantError::Connection(ConnectionError::from(err))
    }
}
