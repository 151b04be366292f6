// handlers/elevated/tenant/health.rs - GET /tenants/:id/health and GET /tenants/health

use axum::extract::{Path, State};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::Health;

/// Probe one tenant's database. An unreachable database is a successful
/// response with `reachable: false`.
pub async fn tenant_health<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Health> {
    Ok(ApiResponse::success(state.provisioner.check_health(tenant_id).await?))
}

/// Probe every provisioned tenant with bounded concurrency
pub async fn tenant_health_all<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
) -> ApiResult<BTreeMap<Uuid, Health>> {
    let ids = state
        .registry
        .list_tenants()
        .await?
        .into_iter()
        .filter(|t| t.connection_params.is_some())
        .map(|t| t.id)
        .collect();

    Ok(ApiResponse::success(state.provisioner.statuses_for_all(ids).await))
}
