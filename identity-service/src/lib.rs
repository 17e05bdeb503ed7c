pub mod config;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::config::IdentityConfig;
use crate::services::{
    DirectoryStore, IdentityAuthority, LoginService, Notifier, RegistrationSaga, SecurityService,
    SignupCache, TokenService, TwoFactorService,
};

/// Stateless service objects constructed once at startup and shared by
/// reference; no per-request state lives here.
#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub directory: Arc<dyn DirectoryStore>,
    pub cache: Arc<dyn SignupCache>,
    pub authority: Arc<dyn IdentityAuthority>,
    pub notifier: Arc<dyn Notifier>,
    pub tokens: TokenService,
    pub registration: RegistrationSaga,
    pub login: LoginService,
    pub two_factor: TwoFactorService,
    pub security: SecurityService,
}

impl AppState {
    /// Wire the service graph from its collaborators.
    pub fn new(
        config: IdentityConfig,
        directory: Arc<dyn DirectoryStore>,
        cache: Arc<dyn SignupCache>,
        authority: Arc<dyn IdentityAuthority>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt);
        let registration = RegistrationSaga::new(
            directory.clone(),
            cache.clone(),
            authority.clone(),
            notifier.clone(),
            config.security.signup_ttl_seconds,
        );
        let login = LoginService::new(
            directory.clone(),
            authority.clone(),
            tokens.clone(),
            config.totp.issuer.clone(),
            config.security.max_failed_logins,
            config.security.lockout_minutes,
        );
        let two_factor = TwoFactorService::new(directory.clone(), config.totp.issuer.clone());
        let security = SecurityService::new(
            directory.clone(),
            cache.clone(),
            authority.clone(),
            notifier.clone(),
            config.security.reset_ttl_seconds,
        );

        Self {
            config,
            directory,
            cache,
            authority,
            notifier,
            tokens,
            registration,
            login,
            two_factor,
            security,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/2fa/enroll", post(handlers::auth::enroll_two_factor))
        .route("/auth/2fa/confirm", post(handlers::auth::confirm_two_factor))
        .route("/auth/2fa/disable", post(handlers::auth::disable_two_factor))
        .layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/verify", get(handlers::auth::verify_email))
        .route("/auth/login", post(handlers::auth::login))
        .route("/auth/login/phone", post(handlers::auth::login_with_phone))
        .route("/auth/2fa/verify", post(handlers::auth::verify_two_factor))
        .route("/auth/refresh", post(handlers::auth::refresh))
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/password-reset/confirm",
            post(handlers::auth::confirm_password_reset),
        )
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
