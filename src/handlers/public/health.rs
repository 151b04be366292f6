// handlers/public/health.rs - GET /health handler

use axum::extract::State;
use chrono::Utc;
use serde_json::{json, Value};

use crate::database::connection::ConnectionFactory;
use crate::error::ApiError;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

/// Liveness of the registry plus the number of live tenant connections
pub async fn health<F: ConnectionFactory>(State(state): State<AppState<F>>) -> ApiResult<Value> {
    if let Err(e) = state.registry.ping().await {
        tracing::error!(error = %e, "Registry health check failed");
        return Err(ApiError::service_unavailable("Tenant registry unavailable"));
    }

    Ok(ApiResponse::success(json!({
        "status": "ok",
        "timestamp": Utc::now(),
        "registry": "ok",
        "tenant_connections": state.cache.count().await,
    })))
}
