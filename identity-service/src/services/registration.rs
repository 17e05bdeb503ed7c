//! Registration saga: provisional signup staging, email confirmation, and
//! the transactional creation of the user's identity across stores.
//!
//! This is the system's only multi-store write path. The external identity
//! is created before the local transaction begins; if the transaction fails,
//! the saga compensates by deleting the just-created identity so no orphaned
//! external identity survives a failed local commit.

use rand::Rng;
use std::sync::Arc;

use crate::dtos::auth::RegisterRequest;
use crate::models::{PendingSignup, Role, SanitizedSecurityRecord};
use crate::services::{
    DirectoryStore, IdentityAuthority, Notifier, RegistrationDocuments, ServiceError, SignupCache,
};
use crate::utils::{hash_password, Password};

/// Outcome of a registration request. The identity does not exist yet; the
/// caller is told to check their email either way, with the message
/// reflecting a failed dispatch so the client can retry.
#[derive(Debug, Clone)]
pub struct RegistrationReceipt {
    pub message: String,
    pub email_dispatched: bool,
}

#[derive(Clone)]
pub struct RegistrationSaga {
    directory: Arc<dyn DirectoryStore>,
    cache: Arc<dyn SignupCache>,
    authority: Arc<dyn IdentityAuthority>,
    notifier: Arc<dyn Notifier>,
    signup_ttl_seconds: u64,
}

fn signup_key(token: &str) -> String {
    format!("signup:{}", token)
}

/// The raw credential is reserved under its own key, never inside the
/// serialized payload. Both entries share the same TTL.
fn credential_key(token: &str) -> String {
    format!("signup:cred:{}", token)
}

fn email_key(email: &str) -> String {
    format!("signup:email:{}", email)
}

pub fn generate_confirmation_token() -> String {
    let mut rng = rand::thread_rng();
    let token_bytes: [u8; 32] = rng.gen();
    hex::encode(token_bytes)
}

impl RegistrationSaga {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        cache: Arc<dyn SignupCache>,
        authority: Arc<dyn IdentityAuthority>,
        notifier: Arc<dyn Notifier>,
        signup_ttl_seconds: u64,
    ) -> Self {
        Self {
            directory,
            cache,
            authority,
            notifier,
            signup_ttl_seconds,
        }
    }

    /// Stage a signup and dispatch the confirmation email. No identity is
    /// created until the confirmation link is followed.
    pub async fn register(
        &self,
        req: RegisterRequest,
    ) -> Result<RegistrationReceipt, ServiceError> {
        if req.password != req.confirm_password {
            return Err(ServiceError::Validation(
                "Passwords do not match".to_string(),
            ));
        }

        if self.authority.lookup_email(&req.email).await? {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }
        if let Some(phone) = req.phone_number.as_deref() {
            if self.authority.lookup_phone(phone).await? {
                return Err(ServiceError::Conflict(
                    "An account with this phone number already exists".to_string(),
                ));
            }
        }

        // Collision probability is cryptographically negligible; the loop is
        // a correctness guard, not an expected path.
        let token = loop {
            let candidate = generate_confirmation_token();
            if !self.cache.exists(&signup_key(&candidate)).await? {
                break candidate;
            }
        };

        if self.cache.get(&email_key(&req.email)).await?.is_some() {
            return Err(ServiceError::Conflict(
                "A confirmation email was already sent. Please check your email.".to_string(),
            ));
        }

        let pending = PendingSignup {
            email: req.email.clone(),
            phone_number: req.phone_number.clone(),
            display_name: req.display_name.clone(),
            role: Role::User,
        };
        let payload = pending
            .to_json()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("payload serialize: {}", e)))?;

        self.cache
            .set_with_ttl(&signup_key(&token), &payload, self.signup_ttl_seconds)
            .await?;
        self.cache
            .set_with_ttl(&credential_key(&token), &req.password, self.signup_ttl_seconds)
            .await?;
        self.cache
            .set_with_ttl(&email_key(&req.email), &token, self.signup_ttl_seconds)
            .await?;

        tracing::info!(email = %req.email, "Signup staged, awaiting confirmation");

        // A failed dispatch does not roll the staging back; the user can
        // re-request the email while the entry lives.
        match self.notifier.send_signup_confirmation(&req.email, &token).await {
            Ok(()) => Ok(RegistrationReceipt {
                message: "Registration started. Please check your email to confirm your account."
                    .to_string(),
                email_dispatched: true,
            }),
            Err(e) => {
                tracing::warn!(email = %req.email, error = %e, "Confirmation email dispatch failed");
                Ok(RegistrationReceipt {
                    message:
                        "Registration was received, but the confirmation email could not be sent. \
                         Please try again."
                            .to_string(),
                    email_dispatched: false,
                })
            }
        }
    }

    /// Consume the confirmation token and commit the registration.
    ///
    /// Idempotent by construction: the token is deleted in the same atomic
    /// step as its read, so a second call always fails.
    pub async fn verify_email(
        &self,
        token: &str,
    ) -> Result<SanitizedSecurityRecord, ServiceError> {
        let raw = self
            .cache
            .take(&signup_key(token))
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(
                    "This confirmation link has expired or was already used".to_string(),
                )
            })?;
        let pending = PendingSignup::from_json(&raw)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("payload deserialize: {}", e)))?;

        let credential = self
            .cache
            .take(&credential_key(token))
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(
                    "This confirmation link has expired or was already used".to_string(),
                )
            })?;

        // External identity first; the local transaction only starts once
        // this has completed.
        let identity_id = self
            .authority
            .create_identity(&pending.email, &credential, pending.phone_number.as_deref())
            .await?;

        // The phone login path verifies locally, so only phone signups get a
        // stored hash; the authority stays the sole verifier otherwise.
        let password_hash = if pending.phone_number.is_some() {
            Some(
                hash_password(&Password::new(credential))
                    .map_err(ServiceError::Internal)?
                    .into_string(),
            )
        } else {
            None
        };

        let documents =
            RegistrationDocuments::from_pending(identity_id.clone(), &pending, password_hash);
        let sanitized = documents.security.sanitized();

        if let Err(commit_err) = self.directory.commit_registration(documents).await {
            // Compensate: the external identity must not outlive a failed
            // local commit. Compensation failures are logged, never surfaced;
            // the caller sees the local failure reason.
            if let Err(delete_err) = self.authority.delete_identity(&identity_id).await {
                tracing::error!(
                    identity_id = %identity_id,
                    error = %delete_err,
                    "Compensating identity deletion failed"
                );
            }
            let _ = self.cache.delete(&email_key(&pending.email)).await;
            return Err(commit_err);
        }

        let _ = self.cache.delete(&email_key(&pending.email)).await;

        tracing::info!(user_id = %identity_id, email = %pending.email, "Registration confirmed");
        Ok(sanitized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirmation_tokens_are_hex_encoded_entropy() {
        let token = generate_confirmation_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_confirmation_token());
    }
}
