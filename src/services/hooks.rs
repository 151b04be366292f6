use async_trait::async_trait;

use crate::database::connection::TenantHandle;
use crate::database::models::Tenant;

/// Extension point run by the provisioner around schema application and
/// teardown. Both callbacks default to no-ops.
#[async_trait]
pub trait ProvisioningHook<H: TenantHandle>: Send + Sync {
    fn name(&self) -> &str;

    /// Runs after migrations succeeded, before the tenant becomes READY
    async fn after_schema(&self, _tenant: &Tenant, _handle: &H) -> anyhow::Result<()> {
        Ok(())
    }

    /// Runs after the tenant's cached connection is closed, before the
    /// database is removed
    async fn before_drop(&self, _tenant: &Tenant) -> anyhow::Result<()> {
        Ok(())
    }
}
