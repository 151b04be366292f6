use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::AppConfig;
use crate::database::cache::TenantConnectionCache;
use crate::database::connection::ConnectionFactory;
use crate::database::migrations::Migrator;
use crate::database::postgres::PgConnectionFactory;
use crate::database::registry::{PgRegistryStore, RegistryStore};
use crate::handlers::AppState;
use crate::services::{DatabaseProvisioner, ProvisionerSettings, TenantResolver};

/// Every long-lived object of a running process, constructed once at
/// startup and torn down explicitly at shutdown.
pub struct Platform<F: ConnectionFactory> {
    pub registry: Arc<dyn RegistryStore>,
    pub cache: TenantConnectionCache<F>,
    pub provisioner: DatabaseProvisioner<F>,
    pub resolver: TenantResolver<F>,
    eviction: Option<JoinHandle<()>>,
}

impl Platform<PgConnectionFactory> {
    /// Connect the registry, bootstrap its schema and load migrations
    pub async fn connect(config: &AppConfig) -> anyhow::Result<Self> {
        let registry = PgRegistryStore::connect(&config.registry)
            .await
            .context("registry database is unreachable")?;
        registry
            .ensure_schema()
            .await
            .context("failed to bootstrap registry schema")?;

        let migrator = match &config.provisioning.migrations_dir {
            Some(dir) => Migrator::from_dir(dir)
                .with_context(|| format!("failed to load migrations from {}", dir.display()))?,
            None => Migrator::builtin(),
        };

        let factory = PgConnectionFactory::new(&config.tenant_database);
        Ok(Self::assemble(Arc::new(registry), Arc::new(factory), migrator, config))
    }
}

impl<F: ConnectionFactory> Platform<F> {
    pub fn assemble(registry: Arc<dyn RegistryStore>, factory: Arc<F>, migrator: Migrator, config: &AppConfig) -> Self {
        info!(
            migrations = migrator.migrations().len(),
            latest = migrator.latest_version(),
            "Assembling tenant platform"
        );

        let cache = TenantConnectionCache::new(Arc::clone(&factory));
        let provisioner = DatabaseProvisioner::new(
            Arc::clone(&registry),
            factory,
            cache.clone(),
            Arc::new(migrator),
            ProvisionerSettings::from_config(config),
        );
        let resolver = TenantResolver::new(Arc::clone(&registry), cache.clone());

        Self {
            registry,
            cache,
            provisioner,
            resolver,
            eviction: None,
        }
    }

    /// Start the idle-eviction loop; a zero interval or idle timeout disables it
    pub fn start_eviction(&mut self, config: &AppConfig) {
        let tenant = &config.tenant_database;
        if tenant.eviction_interval_secs == 0 || tenant.idle_timeout_secs == 0 {
            return;
        }
        self.eviction = Some(self.cache.spawn_eviction(
            Duration::from_secs(tenant.eviction_interval_secs),
            Duration::from_secs(tenant.idle_timeout_secs),
        ));
    }

    pub fn app_state(&self) -> AppState<F> {
        AppState {
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
            provisioner: self.provisioner.clone(),
            resolver: self.resolver.clone(),
        }
    }

    /// Stop eviction, close every tenant connection, then the registry
    pub async fn shutdown(mut self) {
        if let Some(eviction) = self.eviction.take() {
            eviction.abort();
        }
        let closed = self.cache.invalidate_all().await;
        self.registry.close().await;
        info!(closed, "Tenant platform shut down");
    }
}
