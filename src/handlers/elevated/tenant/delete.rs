// handlers/elevated/tenant/delete.rs - DELETE /tenants/:id/database handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// Drop the tenant's database (or namespace). The registry row stays,
/// reset to an unprovisioned state.
pub async fn tenant_drop_database<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(state.provisioner.drop_database(tenant_id).await?))
}
