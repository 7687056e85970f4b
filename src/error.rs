//! Domain error types for the insights report service.
//!
//! Uses thiserror for ergonomic error handling with automatic Display implementations.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;
use uuid::Uuid;

/// Application-level errors.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Missing or malformed request field, resource outside the organization
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Access control denied the caller
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown widget, report or dashboard
    #[error("{0} not found")]
    NotFound(String),

    /// Search backend or peer service unreachable after retries
    #[error("Backend transport error: {0}")]
    BackendTransport(String),

    /// Search backend answered with a body this service cannot decode
    #[error("Backend decode error: {0}")]
    BackendDecode(String),

    /// The caller went away or the request deadline elapsed
    #[error("Request cancelled")]
    Cancelled,

    /// Layout store operation failed
    #[error("Database error: {0}")]
    Database(String),

    /// Any other unrecoverable condition
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// `missing_request_attributes` failure raised while materializing a query.
    pub fn missing_attributes(names: &[String]) -> Self {
        AppError::InvalidArgument(format!("missing_request_attributes: {}", names.join(", ")))
    }

    /// Whether the error is worth another attempt against the same backend.
    pub fn is_transport(&self) -> bool {
        matches!(self, AppError::BackendTransport(_))
    }

    /// Whether the error describes the caller's input rather than the service.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            AppError::InvalidArgument(_)
                | AppError::Unauthorized(_)
                | AppError::NotFound(_)
                | AppError::Cancelled
        )
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::REQUEST_TIMEOUT)
            }
            AppError::BackendTransport(_)
            | AppError::BackendDecode(_)
            | AppError::Database(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.body())
    }
}

impl AppError {
    /// Client-facing body; internal details only reach the log.
    pub fn body(&self) -> ErrorResponse {
        match self {
            AppError::InvalidArgument(msg) => ErrorResponse::new("INVALID_ARGUMENT", msg.clone()),
            AppError::Unauthorized(msg) => ErrorResponse::new("UNAUTHORIZED", msg.clone()),
            AppError::NotFound(_) => ErrorResponse::new("NOT_FOUND", self.to_string()),
            AppError::Cancelled => ErrorResponse::new("CANCELLED", self.to_string()),
            AppError::BackendTransport(_)
            | AppError::BackendDecode(_)
            | AppError::Database(_)
            | AppError::Internal(_) => {
                let correlation_id = Uuid::now_v7().to_string();
                tracing::error!(correlation_id = %correlation_id, error = %self, "Request failed");
                ErrorResponse {
                    error: "INTERNAL".to_string(),
                    message: "An internal error occurred".to_string(),
                    correlation_id: Some(correlation_id),
                }
            }
        }
    }
}

/// Error response body matching OpenAPI schema.
#[derive(Debug, serde::Serialize, serde::Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    /// Present on internal errors; matches the server-side log entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl ErrorResponse {
    fn new(error: &str, message: String) -> Self {
        Self {
            error: error.to_string(),
            message,
            correlation_id: None,
        }
    }
}

impl fmt::Display for ErrorResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error, self.message)
    }
}

/// Convenience type alias for Results with AppError.
pub type AppResult<T> = Result<T, AppError>;

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            AppError::BackendDecode(err.to_string())
        } else {
            AppError::BackendTransport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::InvalidArgument("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::Unauthorized("x".into()).status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            AppError::NotFound("Widget w1".into()).status_code(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::BackendDecode("x".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(AppError::Cancelled.status_code().as_u16(), 499);
    }

    #[test]
    fn test_missing_attributes_message() {
        let err = AppError::missing_attributes(&["runId".to_string(), "branch".to_string()]);
        assert_eq!(
            err.to_string(),
            "Invalid argument: missing_request_attributes: runId, branch"
        );
        assert!(err.is_client_error());
    }

    #[test]
    fn test_internal_errors_hide_details() {
        let response = AppError::BackendDecode("aggregations missing".into()).error_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
