//! In-memory registry and connection factory used by unit tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

use crate::database::connection::{
    AdminHandle, ConnectionError, ConnectionErrorKind, ConnectionFactory, TenantHandle,
};
use crate::database::migrations::Migration;
use crate::database::models::tenant::{DatabaseStatus, DatabaseType, Tenant};
use crate::database::params::ConnectionParams;
use crate::database::registry::{RegistryError, RegistryStore, TenantDatabaseUpdate};

pub const TEST_HOST: &str = "db.test";

/// Parameters pointing at a mock database on the default test host
pub fn params_for(database: &str) -> ConnectionParams {
    ConnectionParams {
        host: TEST_HOST.to_string(),
        port: 5432,
        database: database.to_string(),
        user: "platform".to_string(),
        password: Some("secret".to_string()),
        ssl: false,
        schema: None,
        url: None,
    }
}

#[derive(Debug, Default, Clone)]
struct MockDatabase {
    tables: usize,
    applied: BTreeSet<i64>,
    attempts: Vec<i64>,
}

#[derive(Debug, Default)]
struct MockState {
    databases: Mutex<HashMap<String, MockDatabase>>,
    events: Mutex<Vec<String>>,
    unreachable_hosts: Mutex<HashSet<String>>,
    open_delay: Mutex<Duration>,
    failing_migration: Mutex<Option<i64>>,
    hang_admin: AtomicBool,
    hang_migrations: AtomicBool,
    open_attempts: AtomicUsize,
    closed: AtomicUsize,
    next_handle: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockState {
    fn record(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }

    fn unreachable(&self, host: &str) -> bool {
        self.unreachable_hosts.lock().unwrap().contains(host)
    }
}

/// Connection factory over an in-memory "server" of named databases
#[derive(Debug, Clone, Default)]
pub struct MockFactory {
    state: Arc<MockState>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_database(&self, name: &str) {
        self.state
            .databases
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
    }

    /// Pretend a database already holds user tables
    pub fn seed_tables(&self, name: &str, tables: usize) {
        self.state
            .databases
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default()
            .tables = tables;
    }

    pub fn database_exists(&self, name: &str) -> bool {
        self.state.databases.lock().unwrap().contains_key(name)
    }

    pub fn applied(&self, key: &str) -> BTreeSet<i64> {
        self.state
            .databases
            .lock()
            .unwrap()
            .get(key)
            .map(|db| db.applied.clone())
            .unwrap_or_default()
    }

    pub fn migration_attempts(&self, key: &str) -> Vec<i64> {
        self.state
            .databases
            .lock()
            .unwrap()
            .get(key)
            .map(|db| db.attempts.clone())
            .unwrap_or_default()
    }

    /// Handle bypassing the factory, for direct migration tests
    pub fn handle_for(&self, database: &str) -> MockHandle {
        MockHandle::new(&self.state, TEST_HOST, database.to_string())
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.state.open_delay.lock().unwrap() = delay;
    }

    pub fn make_unreachable(&self, host: &str) {
        self.state.unreachable_hosts.lock().unwrap().insert(host.to_string());
    }

    pub fn make_reachable(&self, host: &str) {
        self.state.unreachable_hosts.lock().unwrap().remove(host);
    }

    pub fn fail_migration(&self, version: i64) {
        *self.state.failing_migration.lock().unwrap() = Some(version);
    }

    pub fn clear_migration_failure(&self) {
        *self.state.failing_migration.lock().unwrap() = None;
    }

    /// Make admin create/drop operations hang forever
    pub fn hang_admin(&self, hang: bool) {
        self.state.hang_admin.store(hang, Ordering::SeqCst);
    }

    /// Make tenant-handle migration steps hang forever
    pub fn hang_migrations(&self, hang: bool) {
        self.state.hang_migrations.store(hang, Ordering::SeqCst);
    }

    pub fn open_attempts(&self) -> usize {
        self.state.open_attempts.load(Ordering::SeqCst)
    }

    pub fn closed_handles(&self) -> usize {
        self.state.closed.load(Ordering::SeqCst)
    }

    pub fn max_concurrent_opens(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<String> {
        self.state.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    type Handle = MockHandle;
    type Admin = MockAdmin;

    async fn open_tenant_handle(&self, params: &ConnectionParams) -> Result<MockHandle, ConnectionError> {
        let params = params.resolved()?;
        let state = &self.state;
        state.open_attempts.fetch_add(1, Ordering::SeqCst);

        let current = state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        state.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *state.open_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        state.in_flight.fetch_sub(1, Ordering::SeqCst);

        if state.unreachable(&params.host) {
            return Err(ConnectionError::new(ConnectionErrorKind::Refused, "connection refused"));
        }
        if !state.databases.lock().unwrap().contains_key(&params.database) {
            return Err(ConnectionError::new(
                ConnectionErrorKind::UnknownDatabase,
                format!("database \"{}\" does not exist", params.database),
            ));
        }

        let key = match &params.schema {
            Some(schema) => format!("{}/{}", params.database, schema),
            None => params.database.clone(),
        };
        Ok(MockHandle::new(state, &params.host, key))
    }

    async fn open_admin_handle(&self, params: &ConnectionParams) -> Result<MockAdmin, ConnectionError> {
        let params = params.resolved()?;
        if self.state.unreachable(&params.host) {
            return Err(ConnectionError::new(ConnectionErrorKind::Refused, "connection refused"));
        }
        Ok(MockAdmin {
            state: Arc::clone(&self.state),
        })
    }
}

/// Handle onto one mock database (or `database/schema` namespace)
#[derive(Debug, Clone)]
pub struct MockHandle {
    id: usize,
    host: String,
    key: String,
    closed: Arc<AtomicBool>,
    state: Arc<MockState>,
}

impl MockHandle {
    fn new(state: &Arc<MockState>, host: &str, key: String) -> Self {
        Self {
            id: state.next_handle.fetch_add(1, Ordering::SeqCst),
            host: host.to_string(),
            key,
            closed: Arc::new(AtomicBool::new(false)),
            state: Arc::clone(state),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), ConnectionError> {
        if self.is_closed() {
            return Err(ConnectionError::new(ConnectionErrorKind::Other, "handle is closed"));
        }
        if self.state.unreachable(&self.host) {
            return Err(ConnectionError::new(ConnectionErrorKind::Refused, "connection refused"));
        }
        Ok(())
    }
}

#[async_trait]
impl TenantHandle for MockHandle {
    async fn ping(&self) -> Result<(), ConnectionError> {
        self.check()
    }

    async fn is_empty(&self) -> Result<bool, ConnectionError> {
        self.check()?;
        let databases = self.state.databases.lock().unwrap();
        Ok(databases.get(&self.key).map_or(true, |db| db.tables == 0))
    }

    async fn ensure_namespace(&self, _schema: &str) -> Result<(), ConnectionError> {
        self.check()?;
        self.state
            .databases
            .lock()
            .unwrap()
            .entry(self.key.clone())
            .or_default();
        Ok(())
    }

    async fn drop_namespace(&self, _schema: &str) -> Result<(), ConnectionError> {
        self.check()?;
        self.state.record(format!("drop_namespace:{}", self.key));
        self.state.databases.lock().unwrap().remove(&self.key);
        Ok(())
    }

    async fn applied_migrations(&self) -> Result<BTreeSet<i64>, ConnectionError> {
        self.check()?;
        let mut databases = self.state.databases.lock().unwrap();
        Ok(databases.entry(self.key.clone()).or_default().applied.clone())
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), ConnectionError> {
        self.check()?;
        if self.state.hang_migrations.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failing = *self.state.failing_migration.lock().unwrap();
        let mut databases = self.state.databases.lock().unwrap();
        let db = databases.entry(self.key.clone()).or_default();
        db.attempts.push(migration.version);
        if failing == Some(migration.version) {
            return Err(ConnectionError::new(ConnectionErrorKind::Other, "syntax error at or near \"oops\""));
        }
        db.applied.insert(migration.version);
        db.tables += 1;
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.closed.fetch_add(1, Ordering::SeqCst);
            self.state.record(format!("close:{}", self.key));
        }
    }
}

pub struct MockAdmin {
    state: Arc<MockState>,
}

impl MockAdmin {
    async fn maybe_hang(&self) {
        if self.state.hang_admin.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }
}

#[async_trait]
impl AdminHandle for MockAdmin {
    async fn database_exists(&self, name: &str) -> Result<bool, ConnectionError> {
        Ok(self.state.databases.lock().unwrap().contains_key(name))
    }

    async fn create_database(&self, name: &str) -> Result<(), ConnectionError> {
        self.maybe_hang().await;
        self.state.record(format!("create:{name}"));
        self.state
            .databases
            .lock()
            .unwrap()
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    async fn drop_database(&self, name: &str) -> Result<(), ConnectionError> {
        self.maybe_hang().await;
        self.state.record(format!("drop:{name}"));
        self.state.databases.lock().unwrap().remove(name);
        Ok(())
    }

    async fn close(&self) {}
}

/// Registry held in memory, with a switch to simulate an outage
#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    tenants: Mutex<HashMap<Uuid, Tenant>>,
    unavailable: AtomicBool,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, tenant: Tenant) -> Tenant {
        self.tenants.lock().unwrap().insert(tenant.id, tenant.clone());
        tenant
    }

    /// Tenant already provisioned and READY on the given mock database
    pub fn insert_ready(&self, slug: &str, database: &str) -> Tenant {
        let mut tenant = Tenant::new(slug);
        tenant.database_type = DatabaseType::DedicatedManaged;
        tenant.database_status = DatabaseStatus::Ready;
        tenant.connection_params = Some(params_for(database));
        tenant.migration_version = Some(1);
        self.insert(tenant)
    }

    pub fn snapshot(&self, id: Uuid) -> Tenant {
        self.tenants.lock().unwrap()[&id].clone()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn guard(&self) -> Result<(), RegistryError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unavailable("registry offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryStore for InMemoryRegistry {
    async fn get_tenant_by_id(&self, id: Uuid) -> Result<Tenant, RegistryError> {
        self.guard()?;
        self.tenants
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    async fn get_tenant_by_slug(&self, slug: &str) -> Result<Tenant, RegistryError> {
        self.guard()?;
        self.tenants
            .lock()
            .unwrap()
            .values()
            .find(|t| t.slug == slug)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(slug.to_string()))
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>, RegistryError> {
        self.guard()?;
        let mut tenants: Vec<Tenant> = self.tenants.lock().unwrap().values().cloned().collect();
        tenants.sort_by(|a, b| a.slug.cmp(&b.slug));
        Ok(tenants)
    }

    async fn create_tenant(&self, slug: &str) -> Result<Tenant, RegistryError> {
        self.guard()?;
        Tenant::validate_slug(slug).map_err(RegistryError::InvalidSlug)?;
        let mut tenants = self.tenants.lock().unwrap();
        if tenants.values().any(|t| t.slug == slug) {
            return Err(RegistryError::Conflict(slug.to_string()));
        }
        let tenant = Tenant::new(slug);
        tenants.insert(tenant.id, tenant.clone());
        Ok(tenant)
    }

    async fn update_tenant_database_status(
        &self,
        id: Uuid,
        status: DatabaseStatus,
        fields: TenantDatabaseUpdate,
    ) -> Result<Tenant, RegistryError> {
        self.guard()?;
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;

        tenant.database_status = status;
        if let Some(database_type) = fields.database_type {
            tenant.database_type = database_type;
        }
        if let Some(params) = fields.connection_params {
            tenant.connection_params = Some(params);
        }
        if let Some(version) = fields.migration_version {
            tenant.migration_version = Some(version);
        }
        if let Some(last_error) = fields.last_error {
            tenant.last_error = last_error;
        }
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn record_health_check(&self, id: Uuid, checked_at: DateTime<Utc>) -> Result<(), RegistryError> {
        self.guard()?;
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        tenant.last_health_checked_at = Some(checked_at);
        Ok(())
    }

    async fn mark_deprovisioned(&self, id: Uuid) -> Result<Tenant, RegistryError> {
        self.guard()?;
        let mut tenants = self.tenants.lock().unwrap();
        let tenant = tenants
            .get_mut(&id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        tenant.database_type = DatabaseType::None;
        tenant.database_status = DatabaseStatus::None;
        tenant.connection_params = None;
        tenant.migration_version = None;
        tenant.last_error = None;
        tenant.last_health_checked_at = None;
        tenant.updated_at = Utc::now();
        Ok(tenant.clone())
    }

    async fn ping(&self) -> Result<(), RegistryError> {
        self.guard()
    }

    async fn close(&self) {}
}
