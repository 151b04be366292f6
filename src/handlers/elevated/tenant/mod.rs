// handlers/elevated/tenant/mod.rs - Tenant administration handlers
//
// Registry records and the database lifecycle behind them. Every handler
// goes through the registry or the provisioner; none opens connections
// itself.

pub mod connections; // GET /tenants/connections
pub mod create; // POST /tenants
pub mod default_config; // GET /tenants/default-config
pub mod delete; // DELETE /tenants/:id/database
pub mod disconnect; // POST /tenants/:id/disconnect
pub mod health; // GET /tenants/:id/health, GET /tenants/health
pub mod list; // GET /tenants
pub mod migrate; // POST /tenants/:id/migrate
pub mod provision; // POST /tenants/:id/provision
pub mod resume; // POST /tenants/:id/resume
pub mod schema; // POST /tenants/:id/schema
pub mod show; // GET /tenants/:id
pub mod suspend; // POST /tenants/:id/suspend

pub use connections::tenant_connections;
pub use create::tenant_create;
pub use default_config::tenant_default_config;
pub use delete::tenant_drop_database;
pub use disconnect::tenant_disconnect;
pub use health::{tenant_health, tenant_health_all};
pub use list::tenant_list;
pub use migrate::tenant_migrate;
pub use provision::tenant_provision;
pub use resume::tenant_resume;
pub use schema::tenant_apply_schema;
pub use show::tenant_show;
pub use suspend::tenant_suspend;
