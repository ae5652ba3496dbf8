//! Error handling module
//!
//! Provides unified error types and handling for the entire application.
//! Every variant is recovered into an HTTP response; none of them is fatal.

use crate::forms::BoundForm;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("There is no such table: {0}")]
    UnknownTable(String),

    #[error("Object with this id does not exist: {0}")]
    ObjectNotFound(String),

    #[error("Incorrect object id format: {0}")]
    InvalidKeyFormat(String),

    #[error("Form is invalid")]
    FormValidationFailed(Box<BoundForm>),

    #[error("execution failed: {0}")]
    RoutineExecutionFailed(String),

    #[error("Malformed parameter spec: {0}")]
    MalformedParameterSpec(String),

    #[error("Import failed: {0}")]
    ImportFailed(String),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Error response structure
#[derive(Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub form: Option<BoundForm>,
}

/// Detail of a recovered error, attached to the response so the request log
/// can record it next to method, path and remote address.
#[derive(Debug, Clone)]
pub struct ErrorDetail(pub String);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let detail = ErrorDetail(self.to_string());

        let (status, error_code, message, details, form) = match self {
            AppError::UnknownTable(table) => (
                StatusCode::NOT_FOUND,
                "UNKNOWN_TABLE",
                format!("There is no such table: {}", table),
                None,
                None,
            ),
            AppError::ObjectNotFound(msg) => (
                StatusCode::NOT_FOUND,
                "OBJECT_NOT_FOUND",
                "Object with this id does not exist".to_string(),
                Some(msg),
                None,
            ),
            AppError::InvalidKeyFormat(msg) => (
                StatusCode::NOT_FOUND,
                "INVALID_KEY_FORMAT",
                "Incorrect object id format".to_string(),
                Some(msg),
                None,
            ),
            AppError::FormValidationFailed(form) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "FORM_INVALID",
                "Form is invalid".to_string(),
                None,
                Some(*form),
            ),
            AppError::RoutineExecutionFailed(msg) => (
                StatusCode::BAD_REQUEST,
                "EXECUTION_FAILED",
                format!("execution failed: {}", msg),
                Some(msg),
                None,
            ),
            AppError::MalformedParameterSpec(msg) => (
                StatusCode::BAD_REQUEST,
                "MALFORMED_PARAMETERS",
                msg.clone(),
                Some(msg),
                None,
            ),
            AppError::ImportFailed(msg) => {
                error!("Import failed: {}", msg);
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    "IMPORT_FAILED",
                    "Data import was aborted".to_string(),
                    Some(msg),
                    None,
                )
            }
            AppError::Database(e) => {
                error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "DATABASE_ERROR",
                    "A database error occurred".to_string(),
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Pool(e) => {
                error!("Pool error: {:?}", e);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "POOL_EXHAUSTED",
                    "Database connection pool exhausted".to_string(),
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Io(e) => {
                error!("I/O error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "IO_ERROR",
                    "A file could not be read or written".to_string(),
                    Some(e.to_string()),
                    None,
                )
            }
            AppError::Csv(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "CSV_ERROR",
                "CSV data could not be processed".to_string(),
                Some(e.to_string()),
                None,
            ),
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                "VALIDATION_ERROR",
                msg,
                None,
                None,
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None, None),
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                    Some(msg),
                    None,
                )
            }
            AppError::Config(msg) => {
                error!("Configuration error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "CONFIG_ERROR",
                    "A configuration error occurred".to_string(),
                    Some(msg),
                    None,
                )
            }
        };

        let body = Json(ErrorResponse {
            success: false,
            message,
            error: details,
            code: Some(error_code.to_string()),
            form,
        });

        let mut response = (status, body).into_response();
        response.extensions_mut().insert(detail);
        response
    }
}

/// Result type alias for API handlers
pub type ApiResult<T> = Result<T, AppError>;

/// Helper function to create a validation error
pub fn validation_error(msg: impl Into<String>) -> AppError {
    AppError::Validation(msg.into())
}
