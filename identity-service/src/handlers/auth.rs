//! Authentication endpoints. Tokens ride in the envelope and as secure,
//! http-only, same-site-strict cookies.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use service_core::error::AppError;

use crate::{
    dtos::{
        auth::{
            EmailLoginRequest, PasswordResetConfirm, PasswordResetRequest, PendingTwoFactorData,
            PhoneLoginRequest, RefreshData, RegisterRequest, SessionData, TwoFactorCodeRequest,
            VerifyRequest,
        },
        ApiResponse,
    },
    middleware::auth::{ACCESS_COOKIE, REFRESH_COOKIE, TEMP_COOKIE},
    middleware::AuthUser,
    services::LoginOutcome,
    utils::ValidatedJson,
    AppState,
};

const TEMP_COOKIE_MINUTES: i64 = 15;

fn secure_cookie(name: &'static str, value: String, max_age_seconds: i64) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, value);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::seconds(max_age_seconds));
    cookie
}

fn expired_cookie(name: &'static str) -> Cookie<'static> {
    let mut cookie = Cookie::new(name, "");
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}

/// Render a login outcome: a full session sets both token cookies; a
/// pending-2FA outcome sets only the short-lived temp cookie.
fn login_response(state: &AppState, jar: CookieJar, outcome: LoginOutcome) -> Response {
    match outcome {
        LoginOutcome::Session { tokens, user } => {
            let jar = jar
                .add(secure_cookie(
                    ACCESS_COOKIE,
                    tokens.access_token.clone(),
                    state.tokens.access_token_expiry_seconds(),
                ))
                .add(secure_cookie(
                    REFRESH_COOKIE,
                    tokens.refresh_token.clone(),
                    state.tokens.refresh_token_expiry_seconds(),
                ))
                .remove(expired_cookie(TEMP_COOKIE));

            let data =
                SessionData::new(user, tokens, state.tokens.access_token_expiry_seconds());
            (
                jar,
                ApiResponse::ok(StatusCode::OK, "Login successful", data),
            )
                .into_response()
        }
        LoginOutcome::PendingTwoFactor {
            temp_token,
            user_id,
        } => {
            let jar = jar.add(secure_cookie(
                TEMP_COOKIE,
                temp_token.clone(),
                TEMP_COOKIE_MINUTES * 60,
            ));
            let data = PendingTwoFactorData {
                user_id,
                two_factor_required: true,
                temp_token,
            };
            (
                jar,
                ApiResponse::ok(
                    StatusCode::OK,
                    "Two-factor verification required",
                    data,
                ),
            )
                .into_response()
        }
    }
}

fn bearer_token(headers: &axum::http::HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::to_string)
}

/// Stage a registration; the identity is not created until the email is
/// confirmed.
pub async fn register(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    let receipt = state.registration.register(req).await?;
    Ok(ApiResponse::<()>::message(StatusCode::OK, receipt.message))
}

/// Consume the confirmation link and commit the registration.
pub async fn verify_email(
    State(state): State<AppState>,
    Query(req): Query<VerifyRequest>,
) -> Result<impl IntoResponse, AppError> {
    let user = state.registration.verify_email(&req.token).await?;
    Ok(ApiResponse::ok(
        StatusCode::CREATED,
        "Email verified successfully",
        user,
    ))
}

pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<EmailLoginRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .login
        .login_with_email(&req.email, &req.password)
        .await?;
    Ok(login_response(&state, jar, outcome))
}

pub async fn login_with_phone(
    State(state): State<AppState>,
    jar: CookieJar,
    ValidatedJson(req): ValidatedJson<PhoneLoginRequest>,
) -> Result<Response, AppError> {
    let outcome = state
        .login
        .login_with_phone(&req.phone_number, &req.password)
        .await?;
    Ok(login_response(&state, jar, outcome))
}

/// Second step of a two-factor login; authorized only by the temp token
/// issued at the first step.
pub async fn verify_two_factor(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
    ValidatedJson(req): ValidatedJson<TwoFactorCodeRequest>,
) -> Result<Response, AppError> {
    let temp_token = bearer_token(&headers)
        .or_else(|| jar.get(TEMP_COOKIE).map(|c| c.value().to_string()))
        .ok_or_else(|| AppError::Unauthorized(anyhow::anyhow!("Missing verification token")))?;

    let claims = state.tokens.verify_temp_token(&temp_token)?;
    let outcome = state
        .login
        .verify_two_factor_authentication(&claims.sub, &req.code)
        .await?;
    Ok(login_response(&state, jar, outcome))
}

pub async fn logout(
    State(state): State<AppState>,
    jar: CookieJar,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.login.logout(&claims.sub).await?;

    let jar = jar
        .remove(expired_cookie(ACCESS_COOKIE))
        .remove(expired_cookie(REFRESH_COOKIE))
        .remove(expired_cookie(TEMP_COOKIE));
    Ok((
        jar,
        ApiResponse::<()>::message(StatusCode::OK, "Logged out successfully"),
    ))
}

/// Silent refresh gate: a still-valid access token passes through; an
/// expired one is re-signed from the refresh token's claims.
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, AppError> {
    let access = bearer_token(&headers)
        .or_else(|| jar.get(ACCESS_COOKIE).map(|c| c.value().to_string()));
    let refresh = jar.get(REFRESH_COOKIE).map(|c| c.value().to_string());

    let (access_token, _claims) = state
        .tokens
        .refresh_session(access.as_deref(), refresh.as_deref())?;

    let jar = jar.add(secure_cookie(
        ACCESS_COOKIE,
        access_token.clone(),
        state.tokens.access_token_expiry_seconds(),
    ));
    let data = RefreshData {
        access_token,
        token_type: "Bearer".to_string(),
        expires_in: state.tokens.access_token_expiry_seconds(),
    };
    Ok((
        jar,
        ApiResponse::ok(StatusCode::OK, "Session refreshed", data),
    ))
}

pub async fn request_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetRequest>,
) -> Result<impl IntoResponse, AppError> {
    state.security.request_password_reset(&req.email).await?;
    Ok(ApiResponse::<()>::message(
        StatusCode::OK,
        "If the email exists, a reset link has been sent",
    ))
}

pub async fn confirm_password_reset(
    State(state): State<AppState>,
    ValidatedJson(req): ValidatedJson<PasswordResetConfirm>,
) -> Result<impl IntoResponse, AppError> {
    state
        .security
        .confirm_password_reset(&req.token, &req.new_password)
        .await?;
    Ok(ApiResponse::<()>::message(
        StatusCode::OK,
        "Password updated successfully",
    ))
}

/// Provision a two-factor secret and return the scannable enrollment.
pub async fn enroll_two_factor(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let enrollment = state.two_factor.generate_two_factor_auth(&claims.sub).await?;
    Ok(ApiResponse::ok(
        StatusCode::OK,
        "Scan the code with your authenticator app",
        enrollment,
    ))
}

/// Disable two-factor authentication. Idempotent.
pub async fn disable_two_factor(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
) -> Result<impl IntoResponse, AppError> {
    state.two_factor.disable_two_factor_auth(&claims.sub).await?;
    Ok(ApiResponse::<()>::message(
        StatusCode::OK,
        "Two-factor authentication disabled",
    ))
}

/// Confirm enrollment with a code from the authenticator app.
pub async fn confirm_two_factor(
    State(state): State<AppState>,
    AuthUser(claims): AuthUser,
    ValidatedJson(req): ValidatedJson<TwoFactorCodeRequest>,
) -> Result<impl IntoResponse, AppError> {
    state
        .two_factor
        .verify_two_factor_auth(&claims.sub, &req.code)
        .await?;
    Ok(ApiResponse::<()>::message(
        StatusCode::OK,
        "Two-factor authentication enabled",
    ))
}
