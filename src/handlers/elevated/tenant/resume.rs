// handlers/elevated/tenant/resume.rs - POST /tenants/:id/resume handler

use axum::extract::{Path, State};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

pub async fn tenant_resume<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(state.provisioner.resume(tenant_id).await?))
}
