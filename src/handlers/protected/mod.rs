// handlers/protected/mod.rs - Tenant-scoped handlers
//
// Every route here runs behind `resolve_tenant_middleware`, which injects
// `ResolvedTenant` and `TenantConnection` extensions for a READY tenant.

pub mod tenant;

pub use tenant::*;
