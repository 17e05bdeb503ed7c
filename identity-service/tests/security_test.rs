//! Account security operations: password reset and block/delete flags.

mod common;

use common::{harness, seed_account};
use identity_service::services::ServiceError;

#[tokio::test]
async fn reset_request_for_unknown_email_succeeds_silently() {
    let h = harness();

    h.state
        .security
        .request_password_reset("nobody@example.com")
        .await
        .unwrap();

    assert!(h.notifier.last_token_for("nobody@example.com").is_none());
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn reset_token_is_single_use_and_revokes_sessions() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    h.state
        .security
        .request_password_reset("worker@example.com")
        .await
        .unwrap();
    let token = h.notifier.last_token_for("worker@example.com").unwrap();

    h.state
        .security
        .confirm_password_reset(&token, "NewPassw0rd!")
        .await
        .unwrap();

    let record = h.directory.get_security("user-1").unwrap();
    assert!(record.password_hash.is_some());
    assert!(h
        .authority
        .revoked_sessions()
        .contains(&"user-1".to_string()));

    // The token was consumed; replay fails
    let replay = h
        .state
        .security
        .confirm_password_reset(&token, "AnotherPass1!")
        .await;
    assert!(matches!(replay, Err(ServiceError::BadRequest(_))));
}

#[tokio::test]
async fn the_mailed_token_is_not_stored_verbatim() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    h.state
        .security
        .request_password_reset("worker@example.com")
        .await
        .unwrap();
    let token = h.notifier.last_token_for("worker@example.com").unwrap();

    let keys: Vec<String> = h
        .cache
        .entries
        .lock()
        .unwrap()
        .keys()
        .cloned()
        .collect();
    assert!(!keys.iter().any(|k| k.contains(&token)));
}

#[tokio::test]
async fn blocking_revokes_sessions_and_unblocking_does_not() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    h.state
        .security
        .set_account_blocked("user-1", true)
        .await
        .unwrap();
    assert!(h.directory.get_security("user-1").unwrap().is_account_blocked);
    assert_eq!(h.authority.revoked_sessions().len(), 1);

    h.state
        .security
        .set_account_blocked("user-1", false)
        .await
        .unwrap();
    assert!(!h.directory.get_security("user-1").unwrap().is_account_blocked);
    assert_eq!(h.authority.revoked_sessions().len(), 1);
}

#[tokio::test]
async fn deletion_is_logical_and_preserves_the_record() {
    let h = harness();
    seed_account(&h, "user-1", "worker@example.com", "Ab1!aaaa1");

    h.state.security.delete_account("user-1").await.unwrap();

    let record = h.directory.get_security("user-1").expect("record retained");
    assert!(record.is_account_deleted);
}
