use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::error::DbErr;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Error body returned by every failing endpoint.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    /// HTTP status category (e.g. "Conflict", "Bad Request")
    pub error: String,
    /// Human-readable error description
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// ISO 8601 timestamp when the error occurred
    pub timestamp: String,
}

/// Error taxonomy of the reservation subsystem. Everything is a local,
/// synchronous return; nothing in this crate is fire-and-forget.
#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed or out-of-range input, recoverable at the boundary.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Operation invalid for the current lifecycle state; the caller should
    /// re-fetch and retry from fresh state. Also returned by the loser of a
    /// guarded-update race.
    #[error("Invalid state: {0}")]
    StateError(String),

    /// Actor lacks ownership or the required permission. Never retried.
    #[error("Not authorized: {0}")]
    AuthorizationError(String),

    /// Resource contention, surfaced with the conflicting record so a human
    /// can resolve it. The system never auto-resolves conflicts.
    #[error("Conflict: {0}")]
    ConflictError(String),

    #[error("Insufficient stock: {0}")]
    InsufficientStock(String),

    /// Per-user ceiling on concurrently live holds and requests.
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Programming-level lifecycle guard. User input should never reach this;
    /// observing it in production is a defect.
    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(
        #[from]
        #[serde(skip)]
        anyhow::Error,
    ),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

pub trait IntoDbErr {
    fn into_db_err(self) -> DbErr;
}

impl IntoDbErr for DbErr {
    fn into_db_err(self) -> DbErr {
        self
    }
}

impl IntoDbErr for String {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self)
    }
}

impl IntoDbErr for &str {
    fn into_db_err(self) -> DbErr {
        DbErr::Custom(self.to_string())
    }
}

impl ServiceError {
    /// Generic constructor that normalizes any supported database error input.
    pub fn db_error<E: IntoDbErr>(error: E) -> Self {
        ServiceError::DatabaseError(error.into_db_err())
    }

    /// Single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::DatabaseError(_)
            | Self::EventError(_)
            | Self::InternalError(_)
            | Self::InvalidTransition(_)
            | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ValidationError(_) => StatusCode::BAD_REQUEST,
            Self::AuthorizationError(_) => StatusCode::FORBIDDEN,
            Self::StateError(_) | Self::ConflictError(_) => StatusCode::CONFLICT,
            Self::InsufficientStock(_) | Self::QuotaExceeded(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
        }
    }

    /// Message suitable for HTTP responses. Internal errors return generic
    /// text to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::EventError(_) | Self::InternalError(_) | Self::Other(_) => {
                "Internal server error".to_string()
            }
            Self::InvalidTransition(_) => "Internal server error".to_string(),
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ServiceError::ValidationError("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::StateError("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::AuthorizationError("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ServiceError::ConflictError("x".into()).status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ServiceError::InsufficientStock("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::QuotaExceeded("x".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ServiceError::NotFound("x".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ServiceError::InvalidTransition("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn response_message_hides_internal_details() {
        assert_eq!(
            ServiceError::InternalError("connection string".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::InvalidTransition("approved -> pending".into()).response_message(),
            "Internal server error"
        );
        assert_eq!(
            ServiceError::StateError("marking already converted".into()).response_message(),
            "Invalid state: marking already converted"
        );
    }

    #[tokio::test]
    async fn error_response_body_shape() {
        let response = ServiceError::QuotaExceeded("3 live requests".into()).into_response();
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let payload: ErrorResponse = serde_json::from_slice(&body).unwrap();
        assert!(payload.message.contains("3 live requests"));
    }
}
