use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::{dtos::ApiResponse, services::SessionClaims, AppState};

/// Access-token cookie name; also accepted as a bearer token.
pub const ACCESS_COOKIE: &str = "access_token";
pub const REFRESH_COOKIE: &str = "refresh_token";
pub const TEMP_COOKIE: &str = "temp_token";

fn bearer_token(parts_headers: &axum::http::HeaderMap) -> Option<String> {
    parts_headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Require a valid access token, from the Authorization header or the
/// access cookie. Claims land in request extensions for extractors.
pub async fn auth_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, Response> {
    let jar = CookieJar::from_headers(req.headers());
    let token = bearer_token(req.headers())
        .or_else(|| jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()));

    let token = match token {
        Some(token) => token,
        None => {
            return Err(ApiResponse::<()>::failure(
                StatusCode::UNAUTHORIZED,
                "Missing access token",
            )
            .into_response());
        }
    };

    let claims = match state.tokens.verify_access_token(&token) {
        Ok(claims) => claims,
        Err(_) => {
            return Err(ApiResponse::<()>::failure(
                StatusCode::UNAUTHORIZED,
                "Invalid or expired access token",
            )
            .into_response());
        }
    };

    let mut req = req;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Extractor handing handlers the verified session claims.
pub struct AuthUser(pub SessionClaims);

#[axum::async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let claims = parts.extensions.get::<SessionClaims>().ok_or_else(|| {
            ApiResponse::<()>::failure(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Auth claims missing from request extensions",
            )
            .into_response()
        })?;

        Ok(AuthUser(claims.clone()))
    }
}
