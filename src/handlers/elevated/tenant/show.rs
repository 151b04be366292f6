// handlers/elevated/tenant/show.rs - GET /tenants/:id handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

pub async fn tenant_show<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(state.registry.get_tenant_by_id(tenant_id).await?))
}
