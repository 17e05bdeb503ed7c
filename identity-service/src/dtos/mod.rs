pub mod auth;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Uniform response envelope. Success payloads ride in `data`; failures
/// carry only the stable message.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub status: u16,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(status: StatusCode, message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            status: status.as_u16(),
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: true,
            status: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            status: status.as_u16(),
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}
