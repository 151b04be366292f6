use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::database::params::ConnectionParams;

/// How a tenant's data is physically placed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseType {
    /// Not yet provisioned
    None,
    /// Namespace inside a shared physical database
    Shared,
    /// Platform-owned isolated database
    DedicatedManaged,
    /// Customer-owned database the platform only connects to
    DedicatedExternal,
}

/// Provisioning state; only `Ready` tenants are served
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatabaseStatus {
    None,
    Provisioning,
    Ready,
    Error,
    Migrating,
    Suspended,
}

impl DatabaseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Shared => "shared",
            Self::DedicatedManaged => "dedicated_managed",
            Self::DedicatedExternal => "dedicated_external",
        }
    }
}

impl DatabaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Provisioning => "provisioning",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Migrating => "migrating",
            Self::Suspended => "suspended",
        }
    }
}

impl FromStr for DatabaseType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "shared" => Ok(Self::Shared),
            "dedicated_managed" | "managed" => Ok(Self::DedicatedManaged),
            "dedicated_external" | "external" => Ok(Self::DedicatedExternal),
            other => Err(format!("unknown database type '{other}'")),
        }
    }
}

impl FromStr for DatabaseStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "provisioning" => Ok(Self::Provisioning),
            "ready" => Ok(Self::Ready),
            "error" => Ok(Self::Error),
            "migrating" => Ok(Self::Migrating),
            "suspended" => Ok(Self::Suspended),
            other => Err(format!("unknown database status '{other}'")),
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Registry record for one tenant
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub database_type: DatabaseType,
    pub database_status: DatabaseStatus,
    pub connection_params: Option<ConnectionParams>,
    pub migration_version: Option<i64>,
    pub last_error: Option<String>,
    pub last_health_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    /// Fresh, unprovisioned tenant
    pub fn new(slug: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            database_type: DatabaseType::None,
            database_status: DatabaseStatus::None,
            connection_params: None,
            migration_version: None,
            last_error: None,
            last_health_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.database_status == DatabaseStatus::Ready
    }

    /// Validate a tenant slug: 2-100 characters of letters, digits, `-`, `_`
    pub fn validate_slug(slug: &str) -> Result<(), String> {
        if slug.len() < 2 {
            return Err("Tenant slug must be at least 2 characters".to_string());
        }
        if slug.len() > 100 {
            return Err("Tenant slug must be less than 100 characters".to_string());
        }
        if !slug.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_') {
            return Err("Tenant slug can only contain letters, numbers, hyphens, and underscores".to_string());
        }
        Ok(())
    }
}

/// Flat `tenants` row as stored in the registry database
#[derive(Debug, Clone, FromRow)]
pub struct TenantRow {
    pub id: Uuid,
    pub slug: String,
    pub database_type: String,
    pub database_status: String,
    pub db_host: Option<String>,
    pub db_port: Option<i32>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,
    pub db_ssl: bool,
    pub db_schema: Option<String>,
    pub db_url: Option<String>,
    pub migration_version: Option<i64>,
    pub last_error: Option<String>,
    pub last_health_checked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<TenantRow> for Tenant {
    type Error = String;

    fn try_from(row: TenantRow) -> Result<Self, Self::Error> {
        let connection_params = match (row.db_host, row.db_name, row.db_user, row.db_url) {
            (Some(host), Some(database), Some(user), url) => Some(ConnectionParams {
                host,
                port: row
                    .db_port
                    .and_then(|p| u16::try_from(p).ok())
                    .unwrap_or(crate::database::params::DEFAULT_PORT),
                database,
                user,
                password: row.db_password,
                ssl: row.db_ssl,
                schema: row.db_schema,
                url,
            }),
            (_, _, _, Some(url)) => Some(
                ConnectionParams::from_url(&url)
                    .map(|mut params| {
                        params.url = Some(url);
                        params
                    })
                    .map_err(|e| format!("tenant {} has an unusable connection url: {e}", row.id))?,
            ),
            _ => None,
        };

        Ok(Self {
            id: row.id,
            slug: row.slug,
            database_type: row.database_type.parse()?,
            database_status: row.database_status.parse()?,
            connection_params,
            migration_version: row.migration_version,
            last_error: row.last_error,
            last_health_checked_at: row.last_health_checked_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row() -> TenantRow {
        let now = Utc::now();
        TenantRow {
            id: Uuid::new_v4(),
            slug: "acme".to_string(),
            database_type: "dedicated_managed".to_string(),
            database_status: "ready".to_string(),
            db_host: Some("db".to_string()),
            db_port: Some(5432),
            db_name: Some("tenant_acme".to_string()),
            db_user: Some("platform".to_string()),
            db_password: Some("pw".to_string()),
            db_ssl: false,
            db_schema: None,
            db_url: None,
            migration_version: Some(3),
            last_error: None,
            last_health_checked_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn enum_round_trip_through_text() {
        for status in [
            DatabaseStatus::None,
            DatabaseStatus::Provisioning,
            DatabaseStatus::Ready,
            DatabaseStatus::Error,
            DatabaseStatus::Migrating,
            DatabaseStatus::Suspended,
        ] {
            assert_eq!(status.as_str().parse::<DatabaseStatus>(), Ok(status));
        }
        assert_eq!("external".parse::<DatabaseType>(), Ok(DatabaseType::DedicatedExternal));
        assert_eq!("dedicated-managed".parse::<DatabaseType>(), Ok(DatabaseType::DedicatedManaged));
        assert!("bogus".parse::<DatabaseType>().is_err());
    }

    #[test]
    fn row_maps_to_tenant() {
        let tenant = Tenant::try_from(row()).unwrap();
        assert!(tenant.is_ready());
        let params = tenant.connection_params.unwrap();
        assert_eq!(params.database, "tenant_acme");
        assert_eq!(params.password.as_deref(), Some("pw"));
    }

    #[test]
    fn row_without_params_has_none() {
        let mut r = row();
        r.db_host = None;
        r.database_status = "none".to_string();
        let tenant = Tenant::try_from(r).unwrap();
        assert!(tenant.connection_params.is_none());
    }

    #[test]
    fn url_only_row_keeps_url() {
        let mut r = row();
        r.db_host = None;
        r.db_url = Some("postgres://ext:pw@customer.example.com/prod".to_string());
        let params = Tenant::try_from(r).unwrap().connection_params.unwrap();
        assert_eq!(params.host, "customer.example.com");
        assert!(params.url.is_some());
    }

    #[test]
    fn validates_slugs() {
        assert!(Tenant::validate_slug("acme").is_ok());
        assert!(Tenant::validate_slug("acme-co_2").is_ok());
        assert!(Tenant::validate_slug("a").is_err());
        assert!(Tenant::validate_slug("acme co").is_err());
        assert!(Tenant::validate_slug("acme;drop").is_err());
    }

    #[test]
    fn serialized_tenant_hides_password() {
        let tenant = Tenant::try_from(row()).unwrap();
        let json = serde_json::to_value(&tenant).unwrap();
        assert_eq!(json["database_status"], "ready");
        assert!(json["connection_params"].get("password").is_none());
    }
}
