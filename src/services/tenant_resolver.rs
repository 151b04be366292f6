use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::database::cache::TenantConnectionCache;
use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::database::registry::RegistryStore;
use crate::services::error::TenantError;

/// Request-path entry point: registry lookup, readiness gate, cached handle.
/// Status is re-read on every call so a tenant leaving READY is refused
/// immediately.
pub struct TenantResolver<F: ConnectionFactory> {
    registry: Arc<dyn RegistryStore>,
    cache: TenantConnectionCache<F>,
}

impl<F: ConnectionFactory> Clone for TenantResolver<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
        }
    }
}

impl<F: ConnectionFactory> TenantResolver<F> {
    pub fn new(registry: Arc<dyn RegistryStore>, cache: TenantConnectionCache<F>) -> Self {
        Self { registry, cache }
    }

    pub async fn resolve_tenant_handle(&self, tenant_id: Uuid) -> Result<F::Handle, TenantError> {
        let (_, handle) = self.resolve(tenant_id).await?;
        Ok(handle)
    }

    /// Tenant record together with its handle
    pub async fn resolve(&self, tenant_id: Uuid) -> Result<(Tenant, F::Handle), TenantError> {
        let tenant = self.registry.get_tenant_by_id(tenant_id).await?;
        self.connect(tenant).await
    }

    pub async fn resolve_by_slug(&self, slug: &str) -> Result<(Tenant, F::Handle), TenantError> {
        let tenant = self.registry.get_tenant_by_slug(slug).await?;
        self.connect(tenant).await
    }

    async fn connect(&self, tenant: Tenant) -> Result<(Tenant, F::Handle), TenantError> {
        if !tenant.is_ready() {
            debug!(tenant_id = %tenant.id, status = %tenant.database_status, "Refusing tenant that is not ready");
            return Err(TenantError::TenantNotReady(tenant.database_status));
        }
        let params = tenant.connection_params.as_ref().ok_or(TenantError::NotProvisioned)?;
        let handle = self.cache.get_or_create(tenant.id, params).await?;
        Ok((tenant, handle))
    }
}
