use axum::{extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;

use crate::{dtos::ApiResponse, AppState};

#[derive(Serialize)]
pub struct HealthData {
    pub database: &'static str,
    pub cache: &'static str,
}

/// Liveness plus store connectivity.
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.directory.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            "down"
        }
    };
    let cache = match state.cache.health_check().await {
        Ok(()) => "up",
        Err(e) => {
            tracing::error!(error = %e, "Cache health check failed");
            "down"
        }
    };

    let healthy = database == "up" && cache == "up";
    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    if healthy {
        ApiResponse::ok(status, "healthy", HealthData { database, cache })
    } else {
        ApiResponse {
            success: false,
            status: status.as_u16(),
            message: "degraded".to_string(),
            data: Some(HealthData { database, cache }),
        }
    }
}
