use service_core::error::AppError;
use thiserror::Error;

/// Step-level failure kinds for the identity subsystem. Every step
/// short-circuits with the most specific kind; the HTTP status class is
/// fixed by the conversion into [`AppError`].
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[error("Cache error: {0}")]
    Cache(#[from] redis::RedisError),

    #[error("Identity authority error: {0}")]
    Authority(String),

    #[error("Email error: {0}")]
    Email(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Database(e) => AppError::DatabaseError(anyhow::Error::new(e)),
            ServiceError::Cache(e) => AppError::CacheError(anyhow::Error::new(e)),
            ServiceError::Authority(e) => {
                AppError::InternalError(anyhow::anyhow!("identity authority: {}", e))
            }
            ServiceError::Email(e) => AppError::EmailError(e),
            ServiceError::Validation(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Conflict(e) => AppError::Conflict(anyhow::anyhow!(e)),
            ServiceError::NotFound(e) => AppError::NotFound(anyhow::anyhow!(e)),
            ServiceError::Unauthorized(e) => AppError::Unauthorized(anyhow::anyhow!(e)),
            ServiceError::BadRequest(e) => AppError::BadRequest(anyhow::anyhow!(e)),
            ServiceError::Internal(e) => AppError::InternalError(e),
        }
    }
}
