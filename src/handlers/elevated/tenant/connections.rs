// handlers/elevated/tenant/connections.rs - GET /tenants/connections handler

use axum::extract::State;
use serde::Serialize;

use crate::database::cache::CacheEntryInfo;
use crate::database::connection::ConnectionFactory;
use crate::handlers::AppState;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Serialize)]
pub struct ConnectionsView {
    pub count: usize,
    pub entries: Vec<CacheEntryInfo>,
}

pub async fn tenant_connections<F: ConnectionFactory>(State(state): State<AppState<F>>) -> ApiResult<ConnectionsView> {
    let entries = state.cache.entries().await;
    Ok(ApiResponse::success(ConnectionsView {
        count: entries.len(),
        entries,
    }))
}
