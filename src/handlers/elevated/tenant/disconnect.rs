// handlers/elevated/tenant/disconnect.rs - POST /tenants/:id/disconnect handler

use axum::extract::{Path, State};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// Close the cached connection, e.g. after rotating credentials
pub async fn tenant_disconnect<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
    Path(tenant_id): Path<Uuid>,
) -> ApiResult<Value> {
    let closed = state.provisioner.disconnect(tenant_id).await?;
    Ok(ApiResponse::success(json!({ "tenant_id": tenant_id, "closed": closed })))
}
