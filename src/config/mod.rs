use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use thiserror::Error;

use crate::database::params::{ConnectionParams, ParamsError};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    Missing(&'static str),

    #[error("Invalid {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: ParamsError,
    },

    #[error("Invalid {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub registry: RegistryConfig,
    pub tenant_database: TenantDatabaseConfig,
    pub provisioning: ProvisioningConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

/// Location and pool tuning of the shared registry database
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub reconnect_attempts: u32,
}

/// Defaults for tenant databases and their pools
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantDatabaseConfig {
    /// Admin host/credentials template for new managed databases
    pub default_params: ConnectionParams,
    pub database_prefix: String,
    pub admin_database: String,
    pub shared_database: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
    pub eviction_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningConfig {
    pub operation_timeout_secs: u64,
    pub health_check_concurrency: usize,
    pub migrations_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub port: u16,
    pub enable_request_logging: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup. Required keys missing is fatal; malformed
    /// optional overrides fall back to the preset value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let environment = match lookup("APP_ENV").as_deref() {
            Some("production") | Some("prod") => Environment::Production,
            Some("staging") | Some("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        let registry_url = lookup("REGISTRY_DATABASE_URL")
            .or_else(|| lookup("DATABASE_URL"))
            .ok_or(ConfigError::Missing("REGISTRY_DATABASE_URL"))?;
        ConnectionParams::from_url(&registry_url).map_err(|source| ConfigError::InvalidUrl {
            key: "REGISTRY_DATABASE_URL",
            source,
        })?;

        let tenant_url = lookup("TENANT_DATABASE_URL").ok_or(ConfigError::Missing("TENANT_DATABASE_URL"))?;
        let default_params = ConnectionParams::from_url(&tenant_url).map_err(|source| ConfigError::InvalidUrl {
            key: "TENANT_DATABASE_URL",
            source,
        })?;

        let config = Self::preset(environment, registry_url, default_params).with_overrides(&lookup);
        config.validate()?;
        Ok(config)
    }

    fn preset(environment: Environment, registry_url: String, default_params: ConnectionParams) -> Self {
        match environment {
            Environment::Production => Self::production(registry_url, default_params),
            Environment::Staging => Self::staging(registry_url, default_params),
            Environment::Development => Self::development(registry_url, default_params),
        }
    }

    fn with_overrides<F>(mut self, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        // Tenant database naming
        if let Some(admin_database) = lookup("TENANT_ADMIN_DATABASE") {
            self.tenant_database.admin_database = admin_database;
        } else {
            self.tenant_database.admin_database = self.tenant_database.default_params.database.clone();
        }
        if let Some(v) = lookup("TENANT_DATABASE_PREFIX") {
            self.tenant_database.database_prefix = v;
        }
        if let Some(v) = lookup("TENANT_SHARED_DATABASE") {
            self.tenant_database.shared_database = v;
        }

        // Registry overrides
        if let Some(v) = lookup("REGISTRY_MAX_CONNECTIONS") {
            self.registry.max_connections = v.parse().unwrap_or(self.registry.max_connections);
        }
        if let Some(v) = lookup("REGISTRY_CONNECT_TIMEOUT_SECS") {
            self.registry.connect_timeout_secs = v.parse().unwrap_or(self.registry.connect_timeout_secs);
        }
        if let Some(v) = lookup("REGISTRY_RECONNECT_ATTEMPTS") {
            self.registry.reconnect_attempts = v.parse().unwrap_or(self.registry.reconnect_attempts);
        }

        // Tenant pool overrides
        if let Some(v) = lookup("TENANT_MAX_CONNECTIONS") {
            self.tenant_database.max_connections = v.parse().unwrap_or(self.tenant_database.max_connections);
        }
        if let Some(v) = lookup("TENANT_CONNECT_TIMEOUT_SECS") {
            self.tenant_database.connect_timeout_secs =
                v.parse().unwrap_or(self.tenant_database.connect_timeout_secs);
        }
        if let Some(v) = lookup("TENANT_IDLE_TIMEOUT_SECS") {
            self.tenant_database.idle_timeout_secs = v.parse().unwrap_or(self.tenant_database.idle_timeout_secs);
        }
        if let Some(v) = lookup("TENANT_EVICTION_INTERVAL_SECS") {
            self.tenant_database.eviction_interval_secs =
                v.parse().unwrap_or(self.tenant_database.eviction_interval_secs);
        }

        // Provisioning overrides
        if let Some(v) = lookup("PROVISION_OPERATION_TIMEOUT_SECS") {
            self.provisioning.operation_timeout_secs = v.parse().unwrap_or(self.provisioning.operation_timeout_secs);
        }
        if let Some(v) = lookup("PROVISION_HEALTH_CONCURRENCY") {
            self.provisioning.health_check_concurrency =
                v.parse().unwrap_or(self.provisioning.health_check_concurrency);
        }
        if let Some(v) = lookup("TENANT_MIGRATIONS_DIR") {
            self.provisioning.migrations_dir = Some(PathBuf::from(v));
        }

        // API overrides
        if let Some(v) = lookup("TENANT_ROUTER_PORT").or_else(|| lookup("PORT")) {
            self.api.port = v.parse().unwrap_or(self.api.port);
        }
        if let Some(v) = lookup("API_ENABLE_REQUEST_LOGGING") {
            self.api.enable_request_logging = v.parse().unwrap_or(self.api.enable_request_logging);
        }

        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let prefix = &self.tenant_database.database_prefix;
        if prefix.is_empty() || !prefix.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(ConfigError::Invalid {
                key: "TENANT_DATABASE_PREFIX",
                message: "must be non-empty lowercase letters, digits or underscores".to_string(),
            });
        }
        if self.provisioning.health_check_concurrency == 0 {
            return Err(ConfigError::Invalid {
                key: "PROVISION_HEALTH_CONCURRENCY",
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    fn development(registry_url: String, default_params: ConnectionParams) -> Self {
        Self {
            environment: Environment::Development,
            registry: RegistryConfig {
                url: registry_url,
                max_connections: 5,
                connect_timeout_secs: 30,
                reconnect_attempts: 3,
            },
            tenant_database: TenantDatabaseConfig {
                default_params,
                database_prefix: "tenant_".to_string(),
                admin_database: "postgres".to_string(),
                shared_database: "tenants_shared".to_string(),
                max_connections: 5,
                connect_timeout_secs: 30,
                idle_timeout_secs: 30 * 60,
                eviction_interval_secs: 60,
            },
            provisioning: ProvisioningConfig {
                operation_timeout_secs: 120,
                health_check_concurrency: 5,
                migrations_dir: None,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn staging(registry_url: String, default_params: ConnectionParams) -> Self {
        Self {
            environment: Environment::Staging,
            registry: RegistryConfig {
                url: registry_url,
                max_connections: 10,
                connect_timeout_secs: 10,
                reconnect_attempts: 5,
            },
            tenant_database: TenantDatabaseConfig {
                default_params,
                database_prefix: "tenant_".to_string(),
                admin_database: "postgres".to_string(),
                shared_database: "tenants_shared".to_string(),
                max_connections: 10,
                connect_timeout_secs: 10,
                idle_timeout_secs: 15 * 60,
                eviction_interval_secs: 60,
            },
            provisioning: ProvisioningConfig {
                operation_timeout_secs: 60,
                health_check_concurrency: 5,
                migrations_dir: None,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: true,
            },
        }
    }

    fn production(registry_url: String, default_params: ConnectionParams) -> Self {
        Self {
            environment: Environment::Production,
            registry: RegistryConfig {
                url: registry_url,
                max_connections: 20,
                connect_timeout_secs: 5,
                reconnect_attempts: 5,
            },
            tenant_database: TenantDatabaseConfig {
                default_params,
                database_prefix: "tenant_".to_string(),
                admin_database: "postgres".to_string(),
                shared_database: "tenants_shared".to_string(),
                max_connections: 10,
                connect_timeout_secs: 5,
                idle_timeout_secs: 10 * 60,
                eviction_interval_secs: 30,
            },
            provisioning: ProvisioningConfig {
                operation_timeout_secs: 60,
                health_check_concurrency: 10,
                migrations_dir: None,
            },
            api: ApiConfig {
                port: 3000,
                enable_request_logging: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    const REQUIRED: [(&str, &str); 2] = [
        ("REGISTRY_DATABASE_URL", "postgres://app:pw@registry:5432/platform"),
        ("TENANT_DATABASE_URL", "postgres://admin:pw@tenants:5432/postgres"),
    ];

    #[test]
    fn test_default_development_config() {
        let config = AppConfig::from_lookup(lookup_from(&REQUIRED)).unwrap();
        assert_eq!(config.environment, Environment::Development);
        assert_eq!(config.tenant_database.database_prefix, "tenant_");
        assert_eq!(config.tenant_database.admin_database, "postgres");
        assert_eq!(config.tenant_database.default_params.host, "tenants");
        assert_eq!(config.provisioning.health_check_concurrency, 5);
    }

    #[test]
    fn test_production_preset_with_overrides() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("APP_ENV", "production"));
        pairs.push(("TENANT_IDLE_TIMEOUT_SECS", "90"));
        pairs.push(("PROVISION_HEALTH_CONCURRENCY", "not-a-number"));
        let config = AppConfig::from_lookup(lookup_from(&pairs)).unwrap();
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.tenant_database.idle_timeout_secs, 90);
        assert_eq!(config.provisioning.health_check_concurrency, 10);
    }

    #[test]
    fn missing_registry_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&REQUIRED[1..])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("REGISTRY_DATABASE_URL")));
    }

    #[test]
    fn database_url_is_accepted_as_registry_fallback() {
        let config = AppConfig::from_lookup(lookup_from(&[
            ("DATABASE_URL", "postgres://app@registry/platform"),
            REQUIRED[1],
        ]))
        .unwrap();
        assert!(config.registry.url.contains("registry"));
    }

    #[test]
    fn missing_tenant_template_is_fatal() {
        let err = AppConfig::from_lookup(lookup_from(&REQUIRED[..1])).unwrap_err();
        assert!(matches!(err, ConfigError::Missing("TENANT_DATABASE_URL")));
    }

    #[test]
    fn rejects_unsafe_prefix() {
        let mut pairs = REQUIRED.to_vec();
        pairs.push(("TENANT_DATABASE_PREFIX", "Tenant-"));
        assert!(AppConfig::from_lookup(lookup_from(&pairs)).is_err());
    }
}
