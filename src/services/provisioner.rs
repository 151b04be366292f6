use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::database::cache::TenantConnectionCache;
use crate::database::connection::{AdminHandle, ConnectionFactory, TenantHandle};
use crate::database::migrations::Migrator;
use crate::database::models::{DatabaseStatus, DatabaseType, Tenant};
use crate::database::params::{database_name_for, ConnectionParams};
use crate::database::registry::{RegistryStore, TenantDatabaseUpdate};
use crate::services::error::TenantError;
use crate::services::hooks::ProvisioningHook;

/// Body of a provisioning request
#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionRequest {
    #[serde(default = "default_database_type")]
    pub database_type: DatabaseType,
    /// Customer-supplied parameters, required for external databases
    #[serde(default)]
    pub connection: Option<ConnectionParams>,
}

fn default_database_type() -> DatabaseType {
    DatabaseType::DedicatedManaged
}

impl Default for ProvisionRequest {
    fn default() -> Self {
        Self {
            database_type: default_database_type(),
            connection: None,
        }
    }
}

/// Result of a reachability probe
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub reachable: bool,
    pub latency_ms: Option<u64>,
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl Health {
    fn unreachable(error: impl Into<String>) -> Self {
        Self {
            reachable: false,
            latency_ms: None,
            error: Some(error.into()),
            checked_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionerSettings {
    pub default_params: ConnectionParams,
    pub database_prefix: String,
    pub admin_database: String,
    pub shared_database: String,
    pub operation_timeout: Duration,
    pub health_check_concurrency: usize,
}

impl ProvisionerSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let tenant = &config.tenant_database;
        Self {
            default_params: tenant.default_params.clone(),
            database_prefix: tenant.database_prefix.clone(),
            admin_database: tenant.admin_database.clone(),
            shared_database: tenant.shared_database.clone(),
            operation_timeout: Duration::from_secs(config.provisioning.operation_timeout_secs),
            health_check_concurrency: config.provisioning.health_check_concurrency.max(1),
        }
    }
}

/// Creates, migrates, checks and removes tenant databases, recording every
/// transition in the registry.
///
/// Handles opened here are short-lived and closed before returning; the
/// connection cache is only touched to invalidate a tenant's entry.
/// Lifecycle operations on the same tenant run one at a time.
pub struct DatabaseProvisioner<F: ConnectionFactory> {
    registry: Arc<dyn RegistryStore>,
    factory: Arc<F>,
    cache: TenantConnectionCache<F>,
    migrator: Arc<Migrator>,
    settings: ProvisionerSettings,
    hooks: Vec<Arc<dyn ProvisioningHook<F::Handle>>>,
    tenant_locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl<F: ConnectionFactory> Clone for DatabaseProvisioner<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            factory: Arc::clone(&self.factory),
            cache: self.cache.clone(),
            migrator: Arc::clone(&self.migrator),
            settings: self.settings.clone(),
            hooks: self.hooks.clone(),
            tenant_locks: Arc::clone(&self.tenant_locks),
        }
    }
}

impl<F: ConnectionFactory> DatabaseProvisioner<F> {
    pub fn new(
        registry: Arc<dyn RegistryStore>,
        factory: Arc<F>,
        cache: TenantConnectionCache<F>,
        migrator: Arc<Migrator>,
        settings: ProvisionerSettings,
    ) -> Self {
        Self {
            registry,
            factory,
            cache,
            migrator,
            settings,
            hooks: Vec::new(),
            tenant_locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn with_hook(mut self, hook: Arc<dyn ProvisioningHook<F::Handle>>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn migrator(&self) -> &Migrator {
        &self.migrator
    }

    /// Allocate the tenant's database. Leaves the tenant PROVISIONING on
    /// success; `apply_schema` completes it.
    pub async fn create_database(&self, tenant_id: Uuid, request: ProvisionRequest) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if !matches!(tenant.database_status, DatabaseStatus::None | DatabaseStatus::Error) {
            return Err(TenantError::InvalidTransition {
                operation: "create database",
                status: tenant.database_status,
            });
        }

        let params = self.target_params(&tenant, &request)?;
        info!(
            tenant_id = %tenant.id,
            database_type = %request.database_type,
            database = %params.redacted_url(),
            "Provisioning tenant database"
        );

        let tenant = self
            .registry
            .update_tenant_database_status(
                tenant_id,
                DatabaseStatus::Provisioning,
                TenantDatabaseUpdate {
                    database_type: Some(request.database_type),
                    connection_params: Some(params.clone()),
                    last_error: Some(None),
                    ..Default::default()
                },
            )
            .await?;

        if let Err(e) = self.allocate(&tenant, request.database_type, &params).await {
            self.record_failure(tenant_id, &e, None).await;
            return Err(e);
        }

        info!(tenant_id = %tenant.id, "Tenant database allocated");
        Ok(tenant)
    }

    /// Run pending migrations and hooks, then mark the tenant READY
    pub async fn apply_schema(&self, tenant_id: Uuid) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if !matches!(tenant.database_status, DatabaseStatus::Provisioning | DatabaseStatus::Error) {
            return Err(TenantError::InvalidTransition {
                operation: "apply schema",
                status: tenant.database_status,
            });
        }
        let params = tenant.connection_params.clone().ok_or(TenantError::NotProvisioned)?;

        if tenant.database_status == DatabaseStatus::Error {
            self.registry
                .update_tenant_database_status(tenant_id, DatabaseStatus::Provisioning, TenantDatabaseUpdate::default())
                .await?;
        }

        self.run_migrations(&tenant, &params, None, true).await
    }

    /// Bring a live tenant up to `target` (or the latest version)
    pub async fn migrate_existing(&self, tenant_id: Uuid, target: Option<i64>) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if !matches!(tenant.database_status, DatabaseStatus::Ready | DatabaseStatus::Error) {
            return Err(TenantError::InvalidTransition {
                operation: "migrate",
                status: tenant.database_status,
            });
        }
        let params = tenant.connection_params.clone().ok_or(TenantError::NotProvisioned)?;
        if let Some(version) = target {
            if !self.migrator.contains(version) {
                return Err(TenantError::InvalidRequest(format!("unknown migration version {version}")));
            }
        }

        self.registry
            .update_tenant_database_status(tenant_id, DatabaseStatus::Migrating, TenantDatabaseUpdate::default())
            .await?;
        self.cache.invalidate(tenant_id).await;

        self.run_migrations(&tenant, &params, target, false).await
    }

    /// Open, `SELECT 1`, close. Never touches the registry.
    pub async fn test_connection(&self, params: &ConnectionParams) -> Health {
        let limit = self.settings.operation_timeout;
        let timed_out = || Health::unreachable(format!("connection test timed out after {}s", limit.as_secs()));
        let started = Instant::now();

        let handle = match tokio::time::timeout(limit, self.factory.open_tenant_handle(params)).await {
            Ok(Ok(handle)) => handle,
            Ok(Err(e)) => return Health::unreachable(e.to_string()),
            Err(_) => return timed_out(),
        };
        let pinged = tokio::time::timeout(limit, handle.ping()).await;
        handle.close().await;

        match pinged {
            Ok(Ok(())) => Health {
                reachable: true,
                latency_ms: Some(started.elapsed().as_millis() as u64),
                error: None,
                checked_at: Utc::now(),
            },
            Ok(Err(e)) => Health::unreachable(e.to_string()),
            Err(_) => timed_out(),
        }
    }

    /// Probe the tenant's stored parameters. A failed probe is reported,
    /// never turned into a status change.
    pub async fn check_health(&self, tenant_id: Uuid) -> Result<Health, TenantError> {
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        let params = tenant.connection_params.as_ref().ok_or(TenantError::NotProvisioned)?;

        let health = self.test_connection(params).await;
        if health.reachable {
            self.registry.record_health_check(tenant_id, health.checked_at).await?;
            debug!(%tenant_id, latency_ms = health.latency_ms, "Tenant database healthy");
        } else {
            warn!(%tenant_id, error = health.error.as_deref().unwrap_or_default(), "Tenant database unreachable");
        }
        Ok(health)
    }

    /// Tear down the tenant's database and reset its registry row
    pub async fn drop_database(&self, tenant_id: Uuid) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if tenant.database_type == DatabaseType::None {
            return Err(TenantError::NotProvisioned);
        }
        let params = tenant.connection_params.clone().ok_or(TenantError::NotProvisioned)?;

        // Stop resolving the tenant before its connection is closed, so no
        // request can reopen it while the database is being removed
        let tenant = if tenant.database_status == DatabaseStatus::Ready {
            self.registry
                .update_tenant_database_status(tenant_id, DatabaseStatus::Suspended, TenantDatabaseUpdate::default())
                .await?
        } else {
            tenant
        };
        self.cache.invalidate(tenant_id).await;

        for hook in &self.hooks {
            hook.before_drop(&tenant).await.map_err(|e| TenantError::Hook {
                hook: hook.name().to_string(),
                message: e.to_string(),
            })?;
        }

        if let Err(e) = self.release(&tenant, &params).await {
            self.record_failure(tenant_id, &e, None).await;
            return Err(e);
        }

        let tenant = self.registry.mark_deprovisioned(tenant_id).await?;
        self.cache.invalidate(tenant_id).await;
        info!(%tenant_id, "Tenant database dropped");
        Ok(tenant)
    }

    /// Template new managed databases are created from
    pub fn get_default_config(&self) -> ConnectionParams {
        self.settings.default_params.clone()
    }

    /// Health for many tenants with bounded fan-out. Lookup or connection
    /// failures become unreachable entries.
    pub async fn statuses_for_all(&self, tenant_ids: Vec<Uuid>) -> BTreeMap<Uuid, Health> {
        stream::iter(tenant_ids)
            .map(|tenant_id| async move {
                let health = match self.check_health(tenant_id).await {
                    Ok(health) => health,
                    Err(e) => Health::unreachable(e.to_string()),
                };
                (tenant_id, health)
            })
            .buffer_unordered(self.settings.health_check_concurrency)
            .collect()
            .await
    }

    /// READY → SUSPENDED; live connections are closed
    pub async fn suspend(&self, tenant_id: Uuid) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if tenant.database_status != DatabaseStatus::Ready {
            return Err(TenantError::InvalidTransition {
                operation: "suspend",
                status: tenant.database_status,
            });
        }

        let tenant = self
            .registry
            .update_tenant_database_status(tenant_id, DatabaseStatus::Suspended, TenantDatabaseUpdate::default())
            .await?;
        self.cache.invalidate(tenant_id).await;
        info!(%tenant_id, "Tenant suspended");
        Ok(tenant)
    }

    /// SUSPENDED → READY
    pub async fn resume(&self, tenant_id: Uuid) -> Result<Tenant, TenantError> {
        let _guard = self.lock_tenant(tenant_id).await;
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        if tenant.database_status != DatabaseStatus::Suspended {
            return Err(TenantError::InvalidTransition {
                operation: "resume",
                status: tenant.database_status,
            });
        }

        let tenant = self
            .registry
            .update_tenant_database_status(tenant_id, DatabaseStatus::Ready, TenantDatabaseUpdate::default())
            .await?;
        info!(%tenant_id, "Tenant resumed");
        Ok(tenant)
    }

    /// Close the tenant's cached connection so the next request reconnects
    /// with fresh parameters
    pub async fn disconnect(&self, tenant_id: Uuid) -> Result<bool, TenantError> {
        self.registry.get_tenant_by_id(tenant_id).await?;
        Ok(self.cache.invalidate(tenant_id).await)
    }

    fn target_params(&self, tenant: &Tenant, request: &ProvisionRequest) -> Result<ConnectionParams, TenantError> {
        // A retry after a failure resumes on the database already recorded
        if tenant.database_type != DatabaseType::None {
            if request.database_type != tenant.database_type {
                return Err(TenantError::ProvisioningConflict(format!(
                    "tenant already has a {} database; drop it before changing to {}",
                    tenant.database_type, request.database_type
                )));
            }
            if let Some(stored) = &tenant.connection_params {
                if request.connection.as_ref().is_some_and(|requested| requested != stored) {
                    return Err(TenantError::ProvisioningConflict(
                        "connection parameters differ from the recorded database; drop it first".to_string(),
                    ));
                }
                return Ok(stored.clone());
            }
        }

        let defaults = &self.settings.default_params;
        match request.database_type {
            DatabaseType::None => Err(TenantError::InvalidRequest(
                "database_type must be shared, dedicated_managed or dedicated_external".to_string(),
            )),
            DatabaseType::DedicatedManaged => {
                let name = database_name_for(&self.settings.database_prefix, &tenant.slug);
                Ok(defaults.with_database(&name)?)
            }
            DatabaseType::Shared => {
                let mut params = defaults.with_database(&self.settings.shared_database)?;
                params.schema = Some(database_name_for(&self.settings.database_prefix, &tenant.slug));
                Ok(params)
            }
            DatabaseType::DedicatedExternal => {
                let params = request.connection.clone().ok_or_else(|| {
                    TenantError::InvalidRequest("external databases require connection parameters".to_string())
                })?;
                params.resolved()?;
                Ok(params)
            }
        }
    }

    async fn allocate(
        &self,
        tenant: &Tenant,
        database_type: DatabaseType,
        params: &ConnectionParams,
    ) -> Result<(), TenantError> {
        const STEP: &str = "create database";

        match database_type {
            DatabaseType::DedicatedManaged => {
                let name = params.resolved()?.database;
                let name = name.as_str();
                let exists = self
                    .with_admin_handle(STEP, |admin| async move {
                        admin.database_exists(name).await.map_err(TenantError::from)
                    })
                    .await?;
                if exists {
                    self.ensure_empty(params, &format!("database {name}")).await?;
                    info!(tenant_id = %tenant.id, database = name, "Reusing existing empty database");
                    return Ok(());
                }
                self.with_admin_handle(STEP, |admin| async move {
                    admin.create_database(name).await.map_err(TenantError::from)
                })
                .await
            }
            DatabaseType::Shared => {
                let shared = self.settings.shared_database.as_str();
                self.with_admin_handle(STEP, |admin| async move {
                    match admin.database_exists(shared).await {
                        Ok(true) => Ok(()),
                        Ok(false) => admin.create_database(shared).await.map_err(TenantError::from),
                        Err(e) => Err(TenantError::from(e)),
                    }
                })
                .await?;

                let schema = params.schema.clone().unwrap_or_default();
                self.ensure_empty(params, &format!("namespace {schema}")).await?;

                let schema = schema.as_str();
                self.with_tenant_handle(STEP, params, |handle| async move {
                    handle.ensure_namespace(schema).await.map_err(TenantError::from)
                })
                .await
            }
            DatabaseType::DedicatedExternal => {
                self.with_tenant_handle(STEP, params, |handle| async move {
                    handle.ping().await.map_err(TenantError::from)
                })
                .await
            }
            DatabaseType::None => Err(TenantError::NotProvisioned),
        }
    }

    async fn release(&self, tenant: &Tenant, params: &ConnectionParams) -> Result<(), TenantError> {
        const STEP: &str = "drop database";

        match tenant.database_type {
            DatabaseType::DedicatedManaged => {
                let name = params.resolved()?.database;
                let name = name.as_str();
                self.with_admin_handle(STEP, |admin| async move {
                    admin.drop_database(name).await.map_err(TenantError::from)
                })
                .await
            }
            DatabaseType::Shared => {
                let schema = params.schema.clone().ok_or(TenantError::NotProvisioned)?;
                let schema = schema.as_str();
                self.with_tenant_handle(STEP, params, |handle| async move {
                    handle.drop_namespace(schema).await.map_err(TenantError::from)
                })
                .await
            }
            DatabaseType::DedicatedExternal => {
                info!(tenant_id = %tenant.id, "Detached external database");
                Ok(())
            }
            DatabaseType::None => Err(TenantError::NotProvisioned),
        }
    }

    /// Refuse to provision into a target that already holds tables
    async fn ensure_empty(&self, params: &ConnectionParams, what: &str) -> Result<(), TenantError> {
        let empty = self
            .with_tenant_handle("create database", params, |handle| async move {
                handle.is_empty().await.map_err(TenantError::from)
            })
            .await?;
        if !empty {
            return Err(TenantError::ProvisioningConflict(format!("{what} already contains tables")));
        }
        Ok(())
    }

    /// Run `work` on a short-lived tenant handle. Opening and the work are
    /// each bounded by the operation timeout; the handle is closed either way.
    async fn with_tenant_handle<T, W, Fut>(
        &self,
        step: &'static str,
        params: &ConnectionParams,
        work: W,
    ) -> Result<T, TenantError>
    where
        W: FnOnce(F::Handle) -> Fut,
        Fut: Future<Output = Result<T, TenantError>>,
    {
        let handle = self
            .bounded(step, async {
                self.factory.open_tenant_handle(params).await.map_err(TenantError::from)
            })
            .await?;
        let result = self.bounded(step, work(handle.clone())).await;
        handle.close().await;
        result
    }

    /// Same as `with_tenant_handle`, on the server's maintenance database
    async fn with_admin_handle<T, W, Fut>(&self, step: &'static str, work: W) -> Result<T, TenantError>
    where
        W: FnOnce(Arc<F::Admin>) -> Fut,
        Fut: Future<Output = Result<T, TenantError>>,
    {
        let params = self.settings.default_params.with_database(&self.settings.admin_database)?;
        let admin = self
            .bounded(step, async {
                self.factory.open_admin_handle(&params).await.map_err(TenantError::from)
            })
            .await?;
        let admin = Arc::new(admin);
        let result = self.bounded(step, work(Arc::clone(&admin))).await;
        admin.close().await;
        result
    }

    async fn run_migrations(
        &self,
        tenant: &Tenant,
        params: &ConnectionParams,
        target: Option<i64>,
        run_hooks: bool,
    ) -> Result<Tenant, TenantError> {
        let started = Instant::now();
        let outcome = self
            .with_tenant_handle("migrate", params, |handle| async move {
                self.migrate_and_verify(tenant, &handle, target, run_hooks).await
            })
            .await;

        match outcome {
            Ok(version) => {
                let tenant = self
                    .registry
                    .update_tenant_database_status(
                        tenant.id,
                        DatabaseStatus::Ready,
                        TenantDatabaseUpdate {
                            migration_version: version,
                            last_error: Some(None),
                            ..Default::default()
                        },
                    )
                    .await?;
                info!(
                    tenant_id = %tenant.id,
                    migration_version = version,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tenant database ready"
                );
                Ok(tenant)
            }
            Err(e) => {
                let applied_through = match &e {
                    TenantError::Migration(failure) => failure.applied_through,
                    _ => None,
                };
                self.record_failure(tenant.id, &e, applied_through).await;
                Err(e)
            }
        }
    }

    async fn migrate_and_verify(
        &self,
        tenant: &Tenant,
        handle: &F::Handle,
        target: Option<i64>,
        run_hooks: bool,
    ) -> Result<Option<i64>, TenantError> {
        let version = self.migrator.apply(handle, target).await?;

        if run_hooks {
            for hook in &self.hooks {
                hook.after_schema(tenant, handle).await.map_err(|e| TenantError::Hook {
                    hook: hook.name().to_string(),
                    message: e.to_string(),
                })?;
            }
        }

        handle.ping().await?;
        Ok(version)
    }

    /// Hold the tenant's lifecycle lock; unused locks are pruned on the way
    async fn lock_tenant(&self, tenant_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.tenant_locks.lock().await;
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(tenant_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Bound a network step by the operation timeout
    async fn bounded<T>(
        &self,
        step: &'static str,
        work: impl Future<Output = Result<T, TenantError>>,
    ) -> Result<T, TenantError> {
        match tokio::time::timeout(self.settings.operation_timeout, work).await {
            Ok(result) => result,
            Err(_) => Err(TenantError::Timeout {
                step,
                seconds: self.settings.operation_timeout.as_secs(),
            }),
        }
    }

    /// Move the tenant to ERROR, keeping the reason for operators
    async fn record_failure(&self, tenant_id: Uuid, err: &TenantError, applied_through: Option<i64>) {
        warn!(%tenant_id, error = %err, "Provisioning step failed");
        let update = TenantDatabaseUpdate {
            migration_version: applied_through,
            ..TenantDatabaseUpdate::error(err.to_string())
        };
        if let Err(e) = self
            .registry
            .update_tenant_database_status(tenant_id, DatabaseStatus::Error, update)
            .await
        {
            warn!(%tenant_id, error = %e, "Failed to record provisioning failure");
        }
    }
}
