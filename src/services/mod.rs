pub mod error;
pub mod hooks;
pub mod provisioner;
pub mod tenant_resolver;

pub use error::TenantError;
pub use hooks::ProvisioningHook;
pub use provisioner::{DatabaseProvisioner, Health, ProvisionRequest, ProvisionerSettings};
pub use tenant_resolver::TenantResolver;
