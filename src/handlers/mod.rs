// handlers/mod.rs - Route tiers
//
// Public (no tenant) → Protected (tenant resolved by middleware) →
// Elevated (cross-tenant administration)

pub mod elevated;
pub mod protected;
pub mod public;

use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::database::cache::TenantConnectionCache;
use crate::database::connection::ConnectionFactory;
use crate::database::registry::RegistryStore;
use crate::middleware::resolve_tenant_middleware;
use crate::services::{DatabaseProvisioner, TenantResolver};

/// Shared handler state; every field is a cheap clone of a shared service
pub struct AppState<F: ConnectionFactory> {
    pub registry: Arc<dyn RegistryStore>,
    pub cache: TenantConnectionCache<F>,
    pub provisioner: DatabaseProvisioner<F>,
    pub resolver: TenantResolver<F>,
}

impl<F: ConnectionFactory> Clone for AppState<F> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cache: self.cache.clone(),
            provisioner: self.provisioner.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

pub fn app<F: ConnectionFactory>(state: AppState<F>, request_logging: bool) -> Router {
    let router = Router::new()
        .merge(public_routes())
        .merge(tenant_admin_routes())
        .merge(tenant_routes(&state))
        .with_state(state);

    if request_logging {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

fn public_routes<F: ConnectionFactory>() -> Router<AppState<F>> {
    Router::new()
        .route("/", get(public::root))
        .route("/health", get(public::health::<F>))
}

fn tenant_admin_routes<F: ConnectionFactory>() -> Router<AppState<F>> {
    use elevated::tenant;

    Router::new()
        .route("/tenants", get(tenant::tenant_list::<F>).post(tenant::tenant_create::<F>))
        .route("/tenants/health", get(tenant::tenant_health_all::<F>))
        .route("/tenants/connections", get(tenant::tenant_connections::<F>))
        .route("/tenants/default-config", get(tenant::tenant_default_config::<F>))
        .route("/tenants/:id", get(tenant::tenant_show::<F>))
        .route("/tenants/:id/provision", post(tenant::tenant_provision::<F>))
        .route("/tenants/:id/schema", post(tenant::tenant_apply_schema::<F>))
        .route("/tenants/:id/migrate", post(tenant::tenant_migrate::<F>))
        .route("/tenants/:id/health", get(tenant::tenant_health::<F>))
        .route("/tenants/:id/database", delete(tenant::tenant_drop_database::<F>))
        .route("/tenants/:id/suspend", post(tenant::tenant_suspend::<F>))
        .route("/tenants/:id/resume", post(tenant::tenant_resume::<F>))
        .route("/tenants/:id/disconnect", post(tenant::tenant_disconnect::<F>))
}

fn tenant_routes<F: ConnectionFactory>(state: &AppState<F>) -> Router<AppState<F>> {
    Router::new()
        .route("/api/tenant/ping", get(protected::tenant_ping::<F>))
        .route_layer(middleware::from_fn_with_state(
            state.resolver.clone(),
            resolve_tenant_middleware::<F>,
        ))
}
