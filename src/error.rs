// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};

use crate::database::registry::RegistryError;
use crate::services::error::TenantError;

/// HTTP API error with status code and client-safe message. Details that
/// could leak infrastructure go to the log, never into the body.
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),
    TenantNotReady(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) | ApiError::TenantNotReady(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg)
            | ApiError::Unauthorized(msg)
            | ApiError::NotFound(msg)
            | ApiError::Conflict(msg)
            | ApiError::TenantNotReady(msg)
            | ApiError::InternalServerError(msg)
            | ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::TenantNotReady(_) => "TENANT_NOT_READY",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }

    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message(),
            "code": self.error_code()
        })
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<TenantError> for ApiError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::TenantNotFound(_) => ApiError::not_found("Tenant not found"),
            TenantError::TenantNotReady(_) => ApiError::TenantNotReady(err.to_string()),
            TenantError::NotProvisioned
            | TenantError::InvalidTransition { .. }
            | TenantError::AlreadyExists(_)
            | TenantError::ProvisioningConflict(_) => ApiError::conflict(err.to_string()),
            TenantError::InvalidRequest(msg) => ApiError::bad_request(msg),
            TenantError::Connection(e) => {
                tracing::warn!(kind = %e.kind, error = %e, "Tenant database connection failed");
                ApiError::service_unavailable("Tenant database unavailable")
            }
            TenantError::Timeout { .. } => {
                tracing::warn!(error = %err, "Tenant operation timed out");
                ApiError::service_unavailable("Tenant operation timed out")
            }
            TenantError::StoreUnavailable(msg) => {
                tracing::error!(error = %msg, "Registry store unavailable");
                ApiError::service_unavailable("Tenant registry unavailable")
            }
            TenantError::Migration(failure) => {
                tracing::error!(step = %failure.step, error = %failure.message, "Tenant migration failed");
                ApiError::internal_server_error(format!("Schema migration failed at step '{}'", failure.step))
            }
            TenantError::Hook { hook, message } => {
                tracing::error!(hook = %hook, error = %message, "Provisioning hook failed");
                ApiError::internal_server_error(format!("Provisioning hook '{hook}' failed"))
            }
            TenantError::Registry(msg) => {
                tracing::error!(error = %msg, "Registry error");
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        TenantError::from(err).into()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}
