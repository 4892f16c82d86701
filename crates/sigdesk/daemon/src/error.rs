//! Error types for sigdeskd

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use sigdesk_service::SigdeskError;
use thiserror::Error;

/// Daemon-level errors
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// API-level errors, mapped onto status codes at the boundary.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<SigdeskError> for ApiError {
    fn from(err: SigdeskError) -> Self {
        match err {
            SigdeskError::Unauthorized => ApiError::Unauthorized,
            SigdeskError::Forbidden(d) => ApiError::Forbidden(d),
            SigdeskError::NotFound(d) => ApiError::NotFound(d),
            SigdeskError::Conflict(d) => ApiError::Conflict(d),
            SigdeskError::Validation(d) => ApiError::Validation(d),
            SigdeskError::Internal(d) => ApiError::Internal(d),
        }
    }
}

impl From<sigdesk_identity::IdentityError> for ApiError {
    fn from(err: sigdesk_identity::IdentityError) -> Self {
        SigdeskError::from(err).into()
    }
}

impl From<sigdesk_workflow::WorkflowError> for ApiError {
    fn from(err: sigdesk_workflow::WorkflowError) -> Self {
        SigdeskError::from(err).into()
    }
}

impl From<sigdesk_chat::ChatError> for ApiError {
    fn from(err: sigdesk_chat::ChatError) -> Self {
        SigdeskError::from(err).into()
    }
}

impl From<sigdesk_notify::NotifyError> for ApiError {
    fn from(err: sigdesk_notify::NotifyError) -> Self {
        SigdeskError::from(err).into()
    }
}

impl From<sigdesk_export::ExportError> for ApiError {
    fn from(err: sigdesk_export::ExportError) -> Self {
        SigdeskError::from(err).into()
    }
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "internal error");
        }

        let body = ErrorResponse {
            success: false,
            error: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

pub type DaemonResult<T> = Result<T, DaemonError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_code_mapping() {
        assert_eq!(
            ApiError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ApiError::Forbidden("x".to_string()).into_response().status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ApiError::NotFound("x".to_string()).into_response().status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::Conflict("x".to_string()).into_response().status(),
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::Validation("x".to_string()).into_response().status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }
}
