// handlers/public/root.rs - GET / handler

use serde_json::{json, Value};

use crate::middleware::{ApiResponse, ApiResult};

pub async fn root() -> ApiResult<Value> {
    Ok(ApiResponse::success(json!({
        "name": "Tenant Router",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": "/health (public)",
            "tenants": "/tenants[/:id] (administrative)",
            "lifecycle": "/tenants/:id/{provision,schema,migrate,health,suspend,resume,disconnect,database}",
            "tenant": "/api/tenant/* (requires x-tenant-id)",
        }
    })))
}
