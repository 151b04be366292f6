// handlers/elevated/tenant/create.rs - POST /tenants handler

use axum::{extract::State, Json};
use serde::Deserialize;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct CreateTenantRequest {
    pub slug: String,
}

/// Register a tenant. Its database is provisioned separately.
pub async fn tenant_create<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Json(body): Json<CreateTenantRequest>,
) -> ApiResult<Tenant> {
    let tenant = state.registry.create_tenant(body.slug.trim()).await?;
    tracing::info!(tenant_id = %tenant.id, slug = %tenant.slug, "Registered tenant");
    Ok(ApiResponse::created(tenant))
}
