use axum::http::{header::RETRY_AFTER, HeaderValue, StatusCode};
use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;
use vetshield_core::security_monitor::{DenyReason, SecurityDecision};

use crate::services::accounts::AccountError;

/// Body of every error response.
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error: String,
    /// Minutes until another attempt is accepted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<i64>,
}

#[derive(Clone, Error, Debug)]
pub enum AppError {
    #[error("Too many attempts. Please try again later.")]
    TooManyAttempts { retry_after_minutes: i64 },

    #[error("Access denied")]
    AccessDenied,

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("This password is too common, please choose another one")]
    PasswordTooCommon,

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    #[error("Internal server error: {0}")]
    InternalServerError(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::TooManyAttempts { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::AccessDenied => StatusCode::FORBIDDEN,
            AppError::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::PasswordTooCommon => StatusCode::BAD_REQUEST,
            AppError::InvalidResetToken => StatusCode::BAD_REQUEST,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<SecurityDecision> for AppError {
    fn from(decision: SecurityDecision) -> Self {
        match decision.reason {
            Some(DenyReason::RateLimitExceeded) => AppError::TooManyAttempts {
                retry_after_minutes: decision.retry_after.unwrap_or_default(),
            },
            _ => AppError::AccessDenied,
        }
    }
}

impl From<AccountError> for AppError {
    fn from(e: AccountError) -> Self {
        AppError::InternalServerError(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            AppError::TooManyAttempts {
                retry_after_minutes,
            } => {
                let body = ErrorResponse {
                    error: self.to_string(),
                    retry_after: Some(retry_after_minutes),
                };
                let seconds = retry_after_minutes.saturating_mul(60).max(0);
                let mut response = (status, Json(body)).into_response();
                response
                    .headers_mut()
                    .insert(RETRY_AFTER, HeaderValue::from(seconds));
                response
            }
            AppError::InternalServerError(ref message) => {
                error!("Internal server error: {}", message);
                let body = ErrorResponse {
                    error: "Internal server error".to_string(),
                    retry_after: None,
                };
                (status, Json(body)).into_response()
            }
            _ => {
                let body = ErrorResponse {
                    error: self.to_string(),
                    retry_after: None,
                };
                (status, Json(body)).into_response()
            }
        }
    }
}
