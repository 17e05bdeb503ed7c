//! Login state machine: gate ordering, lockout, two-factor branch, logout.

mod common;

use chrono::{Duration, Utc};
use common::{harness, seed_account, TEST_ISSUER};
use identity_service::models::{AccountStatus, Role, SecurityRecord};
use identity_service::services::{LoginOutcome, ServiceError};
use identity_service::utils::{hash_password, Password};
use totp_rs::{Algorithm, Secret, TOTP};

fn totp_for(secret_base32: &str, account: &str) -> TOTP {
    TOTP::new(
        Algorithm::SHA1,
        6,
        1,
        30,
        Secret::Encoded(secret_base32.to_string()).to_bytes().unwrap(),
        Some(TEST_ISSUER.to_string()),
        account.to_string(),
    )
    .unwrap()
}

#[tokio::test]
async fn unknown_account_is_not_found() {
    let h = harness();
    let result = h
        .state
        .login
        .login_with_email("nobody@example.com", "whatever1")
        .await;
    assert!(matches!(result, Err(ServiceError::NotFound(_))));
}

#[tokio::test]
async fn wrong_password_is_unauthorized_and_counted() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    let result = h
        .state
        .login
        .login_with_email("worker@example.com", "wrong-password")
        .await;
    assert!(matches!(result, Err(ServiceError::Unauthorized(_))));

    let record = h.directory.get_security("user-1").unwrap();
    assert_eq!(record.failed_login_count, 1);
    assert!(record.last_failed_login_at.is_some());
}

#[tokio::test]
async fn deleted_account_message_wins_over_blocked() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    h.directory
        .insert_security({
            let mut r = h.directory.get_security("user-1").unwrap();
            r.is_account_deleted = true;
            r.is_account_blocked = true;
            r
        });

    let result = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await;
    match result {
        Err(ServiceError::BadRequest(msg)) => assert!(msg.contains("deleted")),
        other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn blocked_account_is_rejected() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    h.directory.insert_security({
        let mut r = h.directory.get_security("user-1").unwrap();
        r.is_account_blocked = true;
        r
    });

    let result = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await;
    match result {
        Err(ServiceError::BadRequest(msg)) => assert!(msg.contains("blocked")),
        other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn unverified_email_is_rejected() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    h.directory.insert_security({
        let mut r = h.directory.get_security("user-1").unwrap();
        r.is_email_verified = false;
        r
    });

    let result = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await;
    match result {
        Err(ServiceError::BadRequest(msg)) => assert!(msg.contains("not verified")),
        other => panic!("expected BadRequest, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn fifth_attempt_is_locked_out_even_with_correct_credentials() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    for _ in 0..4 {
        let _ = h
            .state
            .login
            .login_with_email("worker@example.com", "wrong-password")
            .await;
    }
    assert_eq!(
        h.directory.get_security("user-1").unwrap().failed_login_count,
        4
    );

    let result = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await;
    match result {
        Err(ServiceError::BadRequest(msg)) => {
            assert!(msg.contains("temporarily locked"));
            assert!(msg.contains("minute"));
        }
        other => panic!("expected lockout, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn elapsed_lockout_window_resets_and_login_succeeds() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    h.directory.insert_security({
        let mut r = h.directory.get_security("user-1").unwrap();
        r.failed_login_count = 4;
        r.last_failed_login_at = Some(Utc::now() - Duration::minutes(11));
        r
    });

    let outcome = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Session { .. }));

    let record = h.directory.get_security("user-1").unwrap();
    assert_eq!(record.failed_login_count, 0);
    assert_eq!(record.status, AccountStatus::Active);
}

#[tokio::test]
async fn two_factor_account_never_gets_tokens_from_the_password_step() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");
    let secret = Secret::generate_secret().to_encoded().to_string();
    h.directory.insert_security({
        let mut r = h.directory.get_security("user-1").unwrap();
        r.is_two_factor_auth = true;
        r.two_factor_secret = secret.clone();
        r
    });

    let outcome = h
        .state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await
        .unwrap();
    let temp_token = match outcome {
        LoginOutcome::PendingTwoFactor {
            temp_token,
            user_id,
        } => {
            assert_eq!(user_id, "user-1");
            temp_token
        }
        LoginOutcome::Session { .. } => panic!("tokens must be withheld when 2FA is enabled"),
    };

    // The temp token authorizes only the next verification call
    let claims = h.state.tokens.verify_temp_token(&temp_token).unwrap();
    assert_eq!(claims.sub, "worker@example.com");

    // Wrong code fails
    let bad = h
        .state
        .login
        .verify_two_factor_authentication("worker@example.com", "000000")
        .await;
    assert!(matches!(bad, Err(ServiceError::BadRequest(_))));

    // A valid code yields the full pair
    let code = totp_for(&secret, "worker@example.com")
        .generate_current()
        .unwrap();
    let outcome = h
        .state
        .login
        .verify_two_factor_authentication("worker@example.com", &code)
        .await
        .unwrap();
    match outcome {
        LoginOutcome::Session { tokens, user } => {
            assert_eq!(user.user_id, "user-1");
            let claims = h.state.tokens.verify_access_token(&tokens.access_token).unwrap();
            assert_eq!(claims.sub, "user-1");
        }
        LoginOutcome::PendingTwoFactor { .. } => panic!("expected a full session"),
    }
}

#[tokio::test]
async fn two_factor_check_on_disabled_account_reads_as_invalid_code() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    let result = h
        .state
        .login
        .verify_two_factor_authentication("worker@example.com", "123456")
        .await;
    assert!(matches!(result, Err(ServiceError::BadRequest(_))));
}

#[tokio::test]
async fn phone_login_verifies_the_local_hash() {
    let h = harness();
    let hash = hash_password(&Password::new("Ab1!aaaa1".to_string()))
        .unwrap()
        .into_string();
    h.authority.insert_identity_with_phone(
        "user-1",
        "worker@example.com",
        "Ab1!aaaa1",
        Some("+15550100"),
    );
    h.directory.insert_security(SecurityRecord {
        phone_number: Some("+15550100".to_string()),
        password_hash: Some(hash),
        ..SecurityRecord::new(
            "user-1".to_string(),
            "worker@example.com".to_string(),
            None,
            None,
            Role::User,
        )
    });

    let outcome = h
        .state
        .login
        .login_with_phone("+15550100", "Ab1!aaaa1")
        .await
        .unwrap();
    assert!(matches!(outcome, LoginOutcome::Session { .. }));

    let wrong = h
        .state
        .login
        .login_with_phone("+15550100", "wrong-password")
        .await;
    assert!(matches!(wrong, Err(ServiceError::Unauthorized(_))));
}

#[tokio::test]
async fn logout_revokes_sessions_and_deactivates() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    h.state
        .login
        .login_with_email("worker@example.com", "Ab1!aaaa1")
        .await
        .unwrap();
    assert_eq!(
        h.directory.get_security("user-1").unwrap().status,
        AccountStatus::Active
    );

    h.state.login.logout("user-1").await.unwrap();

    assert_eq!(
        h.directory.get_security("user-1").unwrap().status,
        AccountStatus::Inactive
    );
    assert!(h
        .authority
        .revoked_sessions()
        .contains(&"user-1".to_string()));
}
