// handlers/elevated/tenant/schema.rs - POST /tenants/:id/schema handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

pub async fn tenant_apply_schema<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(state.provisioner.apply_schema(tenant_id).await?))
}
