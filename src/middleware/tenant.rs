use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use uuid::Uuid;

use crate::database::connection::ConnectionFactory;
use crate::database::models::DatabaseType;
use crate::error::ApiError;
use crate::services::tenant_resolver::TenantResolver;

/// Header consulted when no upstream layer identified the tenant
pub const TENANT_HEADER: &str = "x-tenant-id";

/// Tenant identity established by an upstream authentication layer
#[derive(Debug, Clone, Copy)]
pub struct AuthenticatedTenant(pub Uuid);

/// Request-scoped tenant database handle, injected by middleware
#[derive(Clone)]
pub struct TenantConnection<H>(pub H);

/// The tenant the current request runs for
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedTenant {
    pub id: Uuid,
    pub slug: String,
    pub database_type: DatabaseType,
}

/// Resolve the request's tenant to a ready database handle. Unknown and
/// non-ready tenants are refused before any handler runs.
pub async fn resolve_tenant_middleware<F: ConnectionFactory>(
    State(resolver): State<TenantResolver<F>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let tenant_id = tenant_id_from(&request)?;

    let (tenant, handle) = resolver.resolve(tenant_id).await.map_err(|e| {
        tracing::debug!(%tenant_id, error = %e, "Tenant resolution failed");
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(ResolvedTenant {
        id: tenant.id,
        slug: tenant.slug,
        database_type: tenant.database_type,
    });
    request.extensions_mut().insert(TenantConnection(handle));

    Ok(next.run(request).await)
}

fn tenant_id_from(request: &Request) -> Result<Uuid, ApiError> {
    if let Some(AuthenticatedTenant(id)) = request.extensions().get::<AuthenticatedTenant>() {
        return Ok(*id);
    }

    let header = request
        .headers()
        .get(TENANT_HEADER)
        .ok_or_else(|| ApiError::unauthorized("Tenant context required"))?;

    header
        .to_str()
        .ok()
        .and_then(|v| Uuid::parse_str(v.trim()).ok())
        .ok_or_else(|| ApiError::bad_request(format!("Invalid {TENANT_HEADER} header")))
}
