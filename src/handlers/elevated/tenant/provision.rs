// handlers/elevated/tenant/provision.rs - POST /tenants/:id/provision handler

use axum::{
    extract::{Path, State},
    Json,
};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::ProvisionRequest;

/// Allocate the tenant's database. `{}` provisions a dedicated managed
/// database; external databases carry `connection`.
pub async fn tenant_provision<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
    Json(request): Json<ProvisionRequest>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(state.provisioner.create_database(tenant_id, request).await?))
}
