//! Error types for the back office API.
//!
//! Every failure leaves the server as `{"code", "kind", "message"}`: `code`
//! is the coarse category a client switches on, `kind` the precise reason.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use boxoffice_settlement::{GatewayError, PublishError, SettlementError};

pub type ApiResult<T> = Result<T, ApiError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Unauthenticated,
    Forbidden,
    NotFound,
    InvalidTransition,
    Conflict,
    Gateway,
    Database,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Validation => "VALIDATION_ERROR",
            ErrorCode::Unauthenticated => "UNAUTHENTICATED",
            ErrorCode::Forbidden => "FORBIDDEN",
            ErrorCode::NotFound => "NOT_FOUND",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::Conflict => "CONFLICT",
            ErrorCode::Gateway => "GATEWAY_ERROR",
            ErrorCode::Database => "DATABASE_ERROR",
            ErrorCode::Internal => "INTERNAL",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Validation => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthenticated => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::InvalidTransition | ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::Gateway => StatusCode::BAD_GATEWAY,
            ErrorCode::Database | ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// API error returned by handlers and extractors.
#[derive(Debug, thiserror::Error)]
#[error("{} ({kind}): {message}", .code.as_str())]
pub struct ApiError {
    pub code: ErrorCode,
    pub kind: String,
    pub message: String,
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    kind: &'a str,
    message: &'a str,
}

impl ApiError {
    pub fn new(code: ErrorCode, kind: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError {
            code,
            kind: kind.into(),
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Unauthenticated, "INVALID_TOKEN", message)
    }

    pub fn forbidden(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Forbidden, kind, message)
    }

    pub fn bad_request(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Validation, kind, message)
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(code = self.code.as_str(), kind = %self.kind, message = %self.message, "Request failed");
        }

        let body = ErrorBody {
            code: self.code.as_str(),
            kind: &self.kind,
            message: &self.message,
        };
        (status, Json(body)).into_response()
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Validation(e) => {
                ApiError::new(ErrorCode::Validation, e.code(), e.to_string())
            }
            SettlementError::NotFound { ref entity, .. } => ApiError::new(
                ErrorCode::NotFound,
                format!("{}_NOT_FOUND", entity.to_uppercase()),
                err.to_string(),
            ),
            SettlementError::Forbidden(message) => ApiError::forbidden("NOT_ALLOWED", message),
            SettlementError::InvalidTransition { .. } => {
                ApiError::new(ErrorCode::InvalidTransition, "STATUS_CONFLICT", err.to_string())
            }
            SettlementError::NotReconcilable { .. } => {
                ApiError::new(ErrorCode::InvalidTransition, "NOT_RECONCILABLE", err.to_string())
            }
            SettlementError::Gateway(e) => {
                ApiError::new(ErrorCode::Gateway, gateway_kind(&e), e.to_string())
            }
            SettlementError::Publish(PublishError::LimitReached { .. }) => {
                ApiError::new(ErrorCode::Conflict, "LIMIT_REACHED", "limit reached")
            }
            SettlementError::Database(e) => {
                error!(error = %e, "Database failure");
                ApiError::new(ErrorCode::Database, "DATABASE", "database operation failed")
            }
            SettlementError::Internal(message) => {
                error!(%message, "Internal failure");
                ApiError::new(ErrorCode::Internal, "INTERNAL", "internal error")
            }
        }
    }
}

fn gateway_kind(err: &GatewayError) -> &'static str {
    match err {
        GatewayError::NotFound(_) => "CHARGE_NOT_FOUND",
        GatewayError::RateLimited => "RATE_LIMITED",
        GatewayError::Transport(_) => "UNREACHABLE",
        GatewayError::Upstream { .. } => "UPSTREAM",
        GatewayError::Rejected(_) => "REJECTED",
        GatewayError::Decode(_) => "BAD_RESPONSE",
    }
}
