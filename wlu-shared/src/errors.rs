use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::types::ApiErrorResponse;

/// Application error codes following the pattern E{area}{sequence}
///
/// Ranges:
/// - E0xxx: Shared/infrastructure errors
/// - E1xxx: Auth errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    // Shared (E0xxx)
    InternalError,
    ValidationError,
    Unauthorized,
    RateLimited,
    ServiceUnavailable,

    // Auth (E1xxx)
    AccountNotFound,
    InvalidPassword,
    EmailNotVerified,
    UsernameAlreadyExists,
    EmailAlreadyExists,
    PasswordTooWeak,
    TokenInvalid,
    RefreshTokenRejected,
    VerificationTokenInvalid,
    VerificationTokenExpired,
    AlreadyVerified,
    ResetTokenInvalid,
    ResetTokenExpired,
    EmailDeliveryFailed,
}

impl ErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            // Shared
            Self::InternalError => "E0001",
            Self::ValidationError => "E0002",
            Self::Unauthorized => "E0004",
            Self::RateLimited => "E0006",
            Self::ServiceUnavailable => "E0007",

            // Auth
            Self::AccountNotFound => "E1001",
            Self::InvalidPassword => "E1002",
            Self::EmailNotVerified => "E1003",
            Self::UsernameAlreadyExists => "E1004",
            Self::EmailAlreadyExists => "E1005",
            Self::PasswordTooWeak => "E1006",
            Self::TokenInvalid => "E1007",
            Self::RefreshTokenRejected => "E1008",
            Self::VerificationTokenInvalid => "E1009",
            Self::VerificationTokenExpired => "E1010",
            Self::AlreadyVerified => "E1011",
            Self::ResetTokenInvalid => "E1012",
            Self::ResetTokenExpired => "E1013",
            Self::EmailDeliveryFailed => "E1014",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InternalError | Self::ServiceUnavailable | Self::EmailDeliveryFailed => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ValidationError | Self::PasswordTooWeak | Self::UsernameAlreadyExists
            | Self::EmailAlreadyExists | Self::VerificationTokenInvalid
            | Self::VerificationTokenExpired | Self::AlreadyVerified
            | Self::ResetTokenInvalid | Self::ResetTokenExpired => StatusCode::BAD_REQUEST,
            Self::Unauthorized | Self::AccountNotFound | Self::InvalidPassword
            | Self::TokenInvalid => StatusCode::UNAUTHORIZED,
            Self::EmailNotVerified | Self::RefreshTokenRejected => StatusCode::FORBIDDEN,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{message}")]
    Known {
        code: ErrorCode,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("internal server error")]
    Internal(#[from] anyhow::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(code: ErrorCode, message: impl Into<String>, details: serde_json::Value) -> Self {
        Self::Known {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// The code this error will be reported with on the wire.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            AppError::Known { code, .. } => *code,
            AppError::Internal(_) => ErrorCode::InternalError,
            AppError::Database(_) | AppError::Pool(_) => ErrorCode::ServiceUnavailable,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .values()
            .flat_map(|errs| errs.iter())
            .find_map(|e| e.message.as_ref().map(|m| m.to_string()))
            .unwrap_or_else(|| "invalid request".to_string());
        Self::validation(message)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_response) = match &self {
            AppError::Known { code, message, details } => {
                let status = code.status_code();
                if status.is_server_error() {
                    tracing::error!(code = code.code(), "{message}");
                } else {
                    tracing::debug!(code = code.code(), status = status.as_u16(), "{message}");
                }
                let mut resp = ApiErrorResponse::new(code.code(), message);
                if let Some(d) = details {
                    resp = resp.with_details(d.clone());
                }
                (status, resp)
            }
            AppError::Internal(err) => {
                tracing::error!(error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0001", "internal server error"),
                )
            }
            // Storage failures never leak detail to the caller.
            AppError::Database(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0007", "service unavailable"),
                )
            }
            AppError::Pool(err) => {
                tracing::error!(error = %err, "database pool error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorResponse::new("E0007", "service unavailable"),
                )
            }
        };

        (status, Json(error_response)).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
