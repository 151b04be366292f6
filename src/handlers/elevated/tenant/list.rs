// handlers/elevated/tenant/list.rs - GET /tenants handler

use axum::extract::State;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

pub async fn tenant_list<F: ConnectionFactory>(State(state): State<AppState<F>>) -> ApiResult<Vec<Tenant>> {
    Ok(ApiResponse::success(state.registry.list_tenants().await?))
}
