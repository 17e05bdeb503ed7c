//! Account security operations: password reset, blocking, and logical
//! deletion.

use sha2::{Digest, Sha256};
use std::sync::Arc;

use crate::services::registration::generate_confirmation_token;
use crate::services::{
    DirectoryStore, IdentityAuthority, Notifier, ServiceError, SignupCache,
};
use crate::utils::{hash_password, Password};

/// Reset entries are keyed by the digest of the mailed token, so a cache
/// dump never yields a usable link.
fn reset_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("pwreset:{}", hex::encode(hasher.finalize()))
}

#[derive(Clone)]
pub struct SecurityService {
    directory: Arc<dyn DirectoryStore>,
    cache: Arc<dyn SignupCache>,
    authority: Arc<dyn IdentityAuthority>,
    notifier: Arc<dyn Notifier>,
    reset_ttl_seconds: u64,
}

impl SecurityService {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        cache: Arc<dyn SignupCache>,
        authority: Arc<dyn IdentityAuthority>,
        notifier: Arc<dyn Notifier>,
        reset_ttl_seconds: u64,
    ) -> Self {
        Self {
            directory,
            cache,
            authority,
            notifier,
            reset_ttl_seconds,
        }
    }

    /// Stage a reset token and mail the link. Unknown emails succeed
    /// silently so the endpoint does not confirm account existence.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), ServiceError> {
        let record = match self.directory.find_security_by_email(email).await? {
            Some(record) => record,
            None => return Ok(()),
        };
        if record.is_account_deleted {
            return Ok(());
        }

        let token = generate_confirmation_token();
        self.cache
            .set_with_ttl(&reset_key(&token), &record.user_id, self.reset_ttl_seconds)
            .await?;

        self.notifier
            .send_password_reset(email, &token)
            .await
            .map_err(|e| ServiceError::Email(e.to_string()))?;

        tracing::info!(user_id = %record.user_id, "Password reset requested");
        Ok(())
    }

    /// Consume the reset token and install the new password. All existing
    /// sessions are revoked at the authority.
    pub async fn confirm_password_reset(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<(), ServiceError> {
        let user_id = self
            .cache
            .take(&reset_key(token))
            .await?
            .ok_or_else(|| {
                ServiceError::BadRequest(
                    "This reset link has expired or was already used".to_string(),
                )
            })?;

        let password_hash = hash_password(&Password::new(new_password.to_string()))
            .map_err(ServiceError::Internal)?;

        self.directory
            .update_password_hash(&user_id, password_hash.as_str())
            .await?;
        self.authority.revoke_sessions(&user_id).await?;

        tracing::info!(user_id = %user_id, "Password reset completed");
        Ok(())
    }

    pub async fn set_account_blocked(
        &self,
        user_id: &str,
        blocked: bool,
    ) -> Result<(), ServiceError> {
        self.directory.set_account_blocked(user_id, blocked).await?;
        if blocked {
            self.authority.revoke_sessions(user_id).await?;
        }
        tracing::info!(user_id = %user_id, blocked = blocked, "Account block flag updated");
        Ok(())
    }

    /// Logical delete only; the record is kept for referential history.
    pub async fn delete_account(&self, user_id: &str) -> Result<(), ServiceError> {
        self.directory.mark_account_deleted(user_id).await?;
        self.authority.revoke_sessions(user_id).await?;
        tracing::info!(user_id = %user_id, "Account marked deleted");
        Ok(())
    }
}
