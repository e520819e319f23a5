//! Shared error handling utilities.

use axum::{http::StatusCode, Json};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    pub error: String,
    pub code: String,
    /// Input field the error refers to, for form-style callers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
            field: None,
        }
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn unprocessable(
        error: impl Into<String>,
        code: impl Into<String>,
        field: Option<String>,
    ) -> (StatusCode, Json<Self>) {
        let mut body = Self::new(error, code);
        body.field = field;
        (StatusCode::UNPROCESSABLE_ENTITY, Json(body))
    }

    pub fn unavailable(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::SERVICE_UNAVAILABLE, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Failures raised by the tenancy, property, image and finance services.
///
/// Services stay free of HTTP types; handlers convert with `?` through the
/// `From` impl below.
#[derive(Debug, thiserror::Error)]
pub enum DomainError {
    #[error("User must be authenticated to access company information.")]
    Unauthenticated,

    #[error("User is not associated with any company.")]
    NoCompany,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{message}")]
    Validation {
        field: Option<&'static str>,
        message: String,
    },

    #[error("Maximum of {limit} images per property reached")]
    CapacityExceeded { limit: i64 },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Invalid or already used token")]
    InvalidToken,

    #[error("Storage is temporarily unavailable. Please try again later.")]
    StorageUnavailable,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            field: Some(field),
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            DomainError::Unauthenticated => "UNAUTHENTICATED",
            DomainError::NoCompany => "NO_COMPANY",
            DomainError::Forbidden(_) => "FORBIDDEN",
            DomainError::NotFound(_) => "NOT_FOUND",
            DomainError::Validation { .. } => "VALIDATION_ERROR",
            DomainError::CapacityExceeded { .. } => "CAPACITY_EXCEEDED",
            DomainError::Conflict(_) => "CONFLICT",
            DomainError::BadRequest(_) => "BAD_REQUEST",
            DomainError::InvalidToken => "INVALID_TOKEN",
            DomainError::StorageUnavailable => "STORAGE_UNAVAILABLE",
            DomainError::Storage(_) => "STORAGE_ERROR",
            DomainError::Database(_) => "DB_ERROR",
        }
    }
}

impl From<DomainError> for (StatusCode, Json<ApiError>) {
    fn from(err: DomainError) -> Self {
        let code = err.code();
        match &err {
            DomainError::Unauthenticated => ApiError::unauthorized(err.to_string(), code),
            DomainError::NoCompany | DomainError::Forbidden(_) => {
                ApiError::forbidden(err.to_string(), code)
            }
            DomainError::NotFound(_) => ApiError::not_found(err.to_string(), code),
            DomainError::Validation { field, message } => {
                ApiError::unprocessable(message.clone(), code, field.map(str::to_string))
            }
            DomainError::CapacityExceeded { .. } => {
                ApiError::unprocessable(err.to_string(), code, Some("file".to_string()))
            }
            DomainError::Conflict(_) => ApiError::conflict(err.to_string(), code),
            DomainError::BadRequest(_) | DomainError::InvalidToken => {
                ApiError::bad_request(err.to_string(), code)
            }
            DomainError::StorageUnavailable => ApiError::unavailable(err.to_string(), code),
            DomainError::Storage(e) => {
                error!(error = %e, "Object storage failure");
                ApiError::internal("Storage operation failed", code)
            }
            DomainError::Database(e) => {
                error!(error = %e, "Database error");
                ApiError::db_error()
            }
        }
    }
}

pub fn get_db_conn(
    pool: &DbPool,
) -> Result<
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>,
    (StatusCode, Json<ApiError>),
> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}
