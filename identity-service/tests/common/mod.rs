//! Test helpers: an app wired entirely to in-memory collaborators.

#![allow(dead_code)]

use identity_service::{
    config::{
        AuthorityConfig, Environment, IdentityConfig, JwtConfig, MongoConfig, RedisConfig,
        SecurityPolicyConfig, SmtpConfig, TotpConfig,
    },
    dtos::auth::RegisterRequest,
    models::{Role, SecurityRecord},
    services::{MockCache, MockDirectory, MockEmailService, MockIdentityAuthority},
    AppState,
};
use std::sync::Arc;

pub const TEST_ISSUER: &str = "JobPlatform";

pub struct TestHarness {
    pub state: AppState,
    pub directory: Arc<MockDirectory>,
    pub cache: Arc<MockCache>,
    pub authority: Arc<MockIdentityAuthority>,
    pub notifier: Arc<MockEmailService>,
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config { port: 8080 },
        environment: Environment::Dev,
        service_name: "identity-service".to_string(),
        service_version: "test".to_string(),
        log_level: "error".to_string(),
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
        },
        redis: RedisConfig {
            url: "redis://unused".to_string(),
        },
        jwt: JwtConfig {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            temp_secret: "temp-secret-for-tests".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
            temp_token_expiry_minutes: 5,
        },
        smtp: SmtpConfig {
            relay: "smtp.example.com".to_string(),
            user: "noreply@example.com".to_string(),
            password: "unused".to_string(),
            base_url: "http://localhost:8080".to_string(),
        },
        authority: AuthorityConfig {
            base_url: "http://authority.invalid".to_string(),
            api_key: "unused".to_string(),
        },
        security: SecurityPolicyConfig {
            max_failed_logins: 4,
            lockout_minutes: 10,
            signup_ttl_seconds: 1200,
            reset_ttl_seconds: 1200,
        },
        totp: TotpConfig {
            issuer: TEST_ISSUER.to_string(),
        },
    }
}

pub fn harness() -> TestHarness {
    let directory = Arc::new(MockDirectory::new());
    let cache = Arc::new(MockCache::new());
    let authority = Arc::new(MockIdentityAuthority::new());
    let notifier = Arc::new(MockEmailService::new());

    let state = AppState::new(
        test_config(),
        directory.clone(),
        cache.clone(),
        authority.clone(),
        notifier.clone(),
    );

    TestHarness {
        state,
        directory,
        cache,
        authority,
        notifier,
    }
}

pub fn register_request(email: &str, phone_number: Option<&str>) -> RegisterRequest {
    RegisterRequest {
        email: email.to_string(),
        phone_number: phone_number.map(str::to_string),
        password: "Ab1!aaaa1".to_string(),
        confirm_password: "Ab1!aaaa1".to_string(),
        display_name: Some("Test Worker".to_string()),
    }
}

/// Seed a confirmed account in both stores, ready to log in.
pub fn seed_account(harness: &TestHarness, user_id: &str, email: &str, password: &str) {
    harness
        .authority
        .insert_identity(user_id, email, password);
    harness.directory.insert_security(SecurityRecord::new(
        user_id.to_string(),
        email.to_string(),
        None,
        None,
        Role::User,
    ));
}
