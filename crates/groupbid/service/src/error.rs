//! Service error type and its HTTP mapping

use crate::payment::PaymentError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use groupbid_types::GroupError;
use serde_json::json;

/// Errors surfaced by the service layer
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    Domain(#[from] GroupError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = match &self {
            // Validation errors: the request itself is bad.
            // State conflicts: the request raced the aggregate lifecycle;
            // the caller should refresh from the query surface.
            ServiceError::Domain(e) => {
                if e.is_not_found() {
                    StatusCode::NOT_FOUND
                } else if e.is_state_conflict() {
                    StatusCode::CONFLICT
                } else {
                    StatusCode::BAD_REQUEST
                }
            }
            ServiceError::Store(StoreError::AlreadyExists(_)) => StatusCode::CONFLICT,
            ServiceError::Store(StoreError::Unavailable(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Payment(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = Json(json!({ "error": self.to_string() }));
        (status, body).into_response()
    }
}
