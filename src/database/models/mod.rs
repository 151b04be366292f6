pub mod tenant;

pub use tenant::{DatabaseStatus, DatabaseType, Tenant, TenantRow};
