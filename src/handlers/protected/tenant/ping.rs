// handlers/protected/tenant/ping.rs - GET /api/tenant/ping handler

use axum::Extension;
use serde_json::{json, Value};
use std::time::Instant;

use crate::database::connection::{ConnectionFactory, TenantHandle};
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult, ResolvedTenant, TenantConnection};
use crate::services::TenantError;

/// Round trip through the request's tenant connection
pub async fn tenant_ping<F: ConnectionFactory>(
    Extension(tenant): Extension<ResolvedTenant>,
    Extension(TenantConnection(handle)): Extension<TenantConnection<F::Handle>>,
) -> ApiResult<Value> {
    let started = Instant::now();
    handle
        .ping()
        .await
        .map_err(|e| ApiError::from(TenantError::Connection(e)))?;

    Ok(ApiResponse::success(json!({
        "tenant": tenant,
        "latency_ms": started.elapsed().as_millis() as u64,
    })))
}
