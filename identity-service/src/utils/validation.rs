use axum::{
    extract::{FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::dtos::ApiResponse;

/// JSON extractor that runs the DTO's `validator` rules and rejects with the
/// uniform envelope.
pub struct ValidatedJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate + 'static,
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await.map_err(|e| {
            ApiResponse::<()>::failure(
                StatusCode::BAD_REQUEST,
                format!("Malformed request body: {}", e),
            )
            .into_response()
        })?;

        value.validate().map_err(|e| {
            ApiResponse::<()>::failure(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
                .into_response()
        })?;

        Ok(ValidatedJson(value))
    }
}
