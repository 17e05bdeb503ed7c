//! Login state machine: a sequence of short-circuit gates ending in token
//! issuance or a pending-2FA handoff.

use chrono::Utc;
use std::sync::Arc;

use crate::models::{AccountStatus, SanitizedSecurityRecord, SecurityRecord};
use crate::services::two_factor::verify_totp_code;
use crate::services::{
    DirectoryStore, IdentityAuthority, ServiceError, TokenPair, TokenService,
};
use crate::utils::{verify_password, Password, PasswordHashString};

/// Tagged login result: either a usable session, or a pending two-factor
/// step carrying only a temp token. Callers cannot read tokens that were
/// never issued.
#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Session {
        tokens: TokenPair,
        user: SanitizedSecurityRecord,
    },
    PendingTwoFactor {
        temp_token: String,
        user_id: String,
    },
}

#[derive(Clone)]
pub struct LoginService {
    directory: Arc<dyn DirectoryStore>,
    authority: Arc<dyn IdentityAuthority>,
    tokens: TokenService,
    totp_issuer: String,
    max_failed_logins: i64,
    lockout_minutes: i64,
}

impl LoginService {
    pub fn new(
        directory: Arc<dyn DirectoryStore>,
        authority: Arc<dyn IdentityAuthority>,
        tokens: TokenService,
        totp_issuer: String,
        max_failed_logins: i64,
        lockout_minutes: i64,
    ) -> Self {
        Self {
            directory,
            authority,
            tokens,
            totp_issuer,
            max_failed_logins,
            lockout_minutes,
        }
    }

    pub async fn login_with_email(
        &self,
        email: &str,
        password: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        if !self.authority.lookup_email(email).await? {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }

        let record = self
            .directory
            .find_security_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        self.check_account_status(&record)?;
        self.check_lockout(&record).await?;

        let verified = self.authority.verify_credential(email, password).await?;
        if !verified {
            self.record_failed_attempt(&record.user_id).await;
            return Err(ServiceError::Unauthorized(
                "Invalid email or password".to_string(),
            ));
        }
        self.directory.reset_failed_login(&record.user_id).await?;

        self.finish_login(record).await
    }

    /// Phone login verifies the locally stored hash; the authority's
    /// credential path is keyed by email.
    pub async fn login_with_phone(
        &self,
        phone_number: &str,
        password: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        if !self.authority.lookup_phone(phone_number).await? {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }

        let record = self
            .directory
            .find_security_by_phone(phone_number)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        self.check_account_status(&record)?;
        self.check_lockout(&record).await?;

        let matches = match record.password_hash.as_deref() {
            Some(hash) => verify_password(
                &Password::new(password.to_string()),
                &PasswordHashString::new(hash.to_string()),
            )
            .map_err(ServiceError::Internal)?,
            None => false,
        };
        if !matches {
            self.record_failed_attempt(&record.user_id).await;
            return Err(ServiceError::Unauthorized(
                "Invalid phone number or password".to_string(),
            ));
        }
        self.directory.reset_failed_login(&record.user_id).await?;

        self.finish_login(record).await
    }

    /// Second step of a two-factor login. The record is re-fetched filtered
    /// to enabled two-factor, so a disabled account reads as an invalid code.
    pub async fn verify_two_factor_authentication(
        &self,
        email: &str,
        code: &str,
    ) -> Result<LoginOutcome, ServiceError> {
        let record = self
            .directory
            .find_two_factor_enabled(email)
            .await?
            .ok_or_else(|| ServiceError::BadRequest("Invalid code".to_string()))?;

        if !verify_totp_code(&record.two_factor_secret, code, &self.totp_issuer, &record.email)? {
            return Err(ServiceError::BadRequest(
                "Invalid or expired code".to_string(),
            ));
        }

        self.issue_session(record).await
    }

    /// Terminal state for the session, not the account.
    pub async fn logout(&self, user_id: &str) -> Result<(), ServiceError> {
        self.authority.revoke_sessions(user_id).await?;
        self.directory
            .set_session_status(user_id, AccountStatus::Inactive)
            .await?;
        tracing::info!(user_id = %user_id, "User logged out");
        Ok(())
    }

    /// Status gates, first match wins: deleted, then blocked, then
    /// unverified.
    fn check_account_status(&self, record: &SecurityRecord) -> Result<(), ServiceError> {
        if record.is_account_deleted {
            return Err(ServiceError::BadRequest(
                "This account has been deleted".to_string(),
            ));
        }
        if record.is_account_blocked {
            return Err(ServiceError::BadRequest(
                "This account has been blocked. Please contact support.".to_string(),
            ));
        }
        if !record.is_email_verified {
            return Err(ServiceError::BadRequest(
                "Email is not verified. Please check your inbox.".to_string(),
            ));
        }
        Ok(())
    }

    async fn check_lockout(&self, record: &SecurityRecord) -> Result<(), ServiceError> {
        if record.failed_login_count < self.max_failed_logins {
            return Ok(());
        }

        match record.lockout_remaining_minutes(
            self.max_failed_logins,
            self.lockout_minutes,
            Utc::now(),
        ) {
            Some(remaining) => Err(ServiceError::BadRequest(format!(
                "Account temporarily locked. Try again in {} minute(s).",
                remaining
            ))),
            None => {
                // Cool-down elapsed: the counter resets and the attempt
                // proceeds.
                self.directory.reset_failed_login(&record.user_id).await?;
                Ok(())
            }
        }
    }

    /// The increment is an atomic store operation; its failure is logged and
    /// never alters the response the caller sees.
    async fn record_failed_attempt(&self, user_id: &str) {
        if let Err(e) = self.directory.increment_failed_login(user_id).await {
            tracing::warn!(user_id = %user_id, error = %e, "Failed to record login failure");
        }
    }

    async fn finish_login(&self, record: SecurityRecord) -> Result<LoginOutcome, ServiceError> {
        if record.is_two_factor_auth {
            let temp_token = self
                .tokens
                .generate_temp_token(&record.email, record.role.as_str())?;
            tracing::info!(user_id = %record.user_id, "Two-factor verification pending");
            return Ok(LoginOutcome::PendingTwoFactor {
                temp_token,
                user_id: record.user_id,
            });
        }

        self.issue_session(record).await
    }

    async fn issue_session(&self, record: SecurityRecord) -> Result<LoginOutcome, ServiceError> {
        let display_name = self
            .directory
            .find_profile(&record.user_id)
            .await?
            .and_then(|profile| profile.display_name);

        let tokens = self.tokens.generate_token_pair(&record, display_name)?;
        self.directory
            .set_session_status(&record.user_id, AccountStatus::Active)
            .await?;

        tracing::info!(user_id = %record.user_id, "Login succeeded");
        Ok(LoginOutcome::Session {
            tokens,
            user: record.sanitized(),
        })
    }
}
