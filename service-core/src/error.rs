use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Service-wide error taxonomy. Every variant maps to one HTTP status class;
/// the rendered body is the uniform `{success, status, message}` envelope.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    BadRequest(anyhow::Error),

    #[error("{0}")]
    NotFound(anyhow::Error),

    #[error("{0}")]
    Unauthorized(anyhow::Error),

    #[error("{0}")]
    Conflict(anyhow::Error),

    #[error("Internal server error: {0}")]
    InternalError(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    DatabaseError(anyhow::Error),

    #[error("Cache error: {0}")]
    CacheError(anyhow::Error),

    #[error("Email error: {0}")]
    EmailError(String),

    #[error("Configuration error: {0}")]
    ConfigError(anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(anyhow::Error::new(err))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::InternalError(anyhow::Error::new(err))
    }
}

/// Uniform failure envelope. Internal causes are logged, never serialized.
#[derive(Serialize)]
struct ErrorEnvelope {
    success: bool,
    status: u16,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::ValidationError(err) => {
                (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            AppError::BadRequest(err) => (StatusCode::BAD_REQUEST, err.to_string()),
            AppError::NotFound(err) => (StatusCode::NOT_FOUND, err.to_string()),
            AppError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err.to_string()),
            AppError::Conflict(err) => (StatusCode::CONFLICT, err.to_string()),
            AppError::InternalError(err) => {
                tracing::error!(error = %err, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            AppError::DatabaseError(err) => {
                tracing::error!(error = %err, "Database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            AppError::CacheError(err) => {
                tracing::error!(error = %err, "Cache error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Cache error".to_string())
            }
            AppError::EmailError(msg) => {
                tracing::error!(error = %msg, "Email error");
                (StatusCode::INTERNAL_SERVER_ERROR, "Email error".to_string())
            }
            AppError::ConfigError(err) => {
                tracing::error!(error = %err, "Configuration error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Configuration error".to_string(),
                )
            }
        };

        (
            status,
            Json(ErrorEnvelope {
                success: false,
                status: status.as_u16(),
                message,
            }),
        )
            .into_response()
    }
}
