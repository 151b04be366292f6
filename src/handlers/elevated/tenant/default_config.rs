// handlers/elevated/tenant/default_config.rs - GET /tenants/default-config handler

use axum::extract::State;

use crate::database::connection::ConnectionFactory;
use crate::database::params::ConnectionParams;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// Template for new managed databases; the password is never serialized
pub async fn tenant_default_config<F: ConnectionFactory>(
    State(state): State<AppState<F>>,
) -> ApiResult<ConnectionParams> {
    Ok(ApiResponse::success(state.provisioner.get_default_config()))
}
