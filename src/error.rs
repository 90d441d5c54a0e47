//! Error types for the lending desk

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable error codes carried in every error response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCode {
    Failure = 1,
    DbFailure = 3,
    NoSuchData = 4,
    BadValue = 5,
    Conflict = 6,
    NotAvailable = 7,
    MemberNotEligible = 8,
    AlreadyReturned = 9,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Failure => "Failure",
            ErrorCode::DbFailure => "DbFailure",
            ErrorCode::NoSuchData => "NoSuchData",
            ErrorCode::BadValue => "BadValue",
            ErrorCode::Conflict => "Conflict",
            ErrorCode::NotAvailable => "NotAvailable",
            ErrorCode::MemberNotEligible => "MemberNotEligible",
            ErrorCode::AlreadyReturned => "AlreadyReturned",
        }
    }

    pub fn from_u32(code: u32) -> Option<Self> {
        match code {
            1 => Some(ErrorCode::Failure),
            3 => Some(ErrorCode::DbFailure),
            4 => Some(ErrorCode::NoSuchData),
            5 => Some(ErrorCode::BadValue),
            6 => Some(ErrorCode::Conflict),
            7 => Some(ErrorCode::NotAvailable),
            8 => Some(ErrorCode::MemberNotEligible),
            9 => Some(ErrorCode::AlreadyReturned),
            _ => None,
        }
    }
}

/// Main application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Ineligible: {0}")]
    Ineligible(String),

    #[error("Already returned: {0}")]
    AlreadyReturned(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Validation(_) => ErrorCode::BadValue,
            AppError::NotFound(_) => ErrorCode::NoSuchData,
            AppError::Conflict(_) => ErrorCode::Conflict,
            AppError::Unavailable(_) => ErrorCode::NotAvailable,
            AppError::Ineligible(_) => ErrorCode::MemberNotEligible,
            AppError::AlreadyReturned(_) => ErrorCode::AlreadyReturned,
            AppError::Database(_) => ErrorCode::DbFailure,
            AppError::Http(_) | AppError::Internal(_) => ErrorCode::Failure,
        }
    }

    /// Rebuild an error from a response body sent by the server
    pub fn from_response(body: ErrorResponse) -> Self {
        let message = body.message;
        match ErrorCode::from_u32(body.code) {
            Some(ErrorCode::BadValue) => AppError::Validation(message),
            Some(ErrorCode::NoSuchData) => AppError::NotFound(message),
            Some(ErrorCode::Conflict) => AppError::Conflict(message),
            Some(ErrorCode::NotAvailable) => AppError::Unavailable(message),
            Some(ErrorCode::MemberNotEligible) => AppError::Ineligible(message),
            Some(ErrorCode::AlreadyReturned) => AppError::AlreadyReturned(message),
            _ => AppError::Internal(message),
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        AppError::Validation(errors.to_string())
    }
}

/// Error response body
#[derive(Debug, Serialize, Deserialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    pub code: u32,
    pub error: String,
    pub message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg)
            | AppError::Unavailable(msg)
            | AppError::AlreadyReturned(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Ineligible(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::Http(e) => {
                tracing::error!("Upstream HTTP error: {:?}", e);
                (StatusCode::BAD_GATEWAY, "Upstream request failed".to_string())
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(ErrorResponse {
            code: code as u32,
            error: code.as_str().to_string(),
            message,
        });

        (status, body).into_response()
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
