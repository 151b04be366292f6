// handlers/elevated/tenant/migrate.rs - POST /tenants/:id/migrate[?target=N] handler

use axum::extract::{Path, Query, State};
use serde::Deserialize;
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::Tenant;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct MigrateQuery {
    pub target: Option<i64>,
}

pub async fn tenant_migrate<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
    Query(query): Query<MigrateQuery>,
) -> ApiResult<Tenant> {
    Ok(ApiResponse::success(
        state.provisioner.migrate_existing(tenant_id, query.target).await?,
    ))
}
