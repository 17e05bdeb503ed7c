//! Two-factor enrollment and code verification.
//!
//! Enrollment is a two-step flow: provision a secret (guarded so an enabled
//! record is never overwritten), then confirm with a valid code. The login
//! check in the state machine uses the same code-verification primitive with
//! different record-state preconditions.

use std::sync::Arc;
use totp_rs::{Algorithm, Secret, TOTP};

use crate::services::{DirectoryStore, ServiceError};

/// RFC 6238 defaults: SHA1, 6 digits, 30-second step, ±1 step tolerance.
const TOTP_DIGITS: usize = 6;
const TOTP_SKEW: u8 = 1;
const TOTP_STEP: u64 = 30;

/// Enrollment payload returned to the client for scanning.
#[derive(Debug, Clone, serde::Serialize)]
pub struct TwoFactorEnrollment {
    pub otpauth_uri: String,
    /// PNG image, base64-encoded, ready for an `img src` data URI.
    pub qr_code_base64: String,
}

fn build_totp(
    secret_base32: &str,
    issuer: &str,
    account: &str,
) -> Result<TOTP, ServiceError> {
    let secret_bytes = Secret::Encoded(secret_base32.to_string())
        .to_bytes()
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP secret decode: {:?}", e)))?;

    TOTP::new(
        Algorithm::SHA1,
        TOTP_DIGITS,
        TOTP_SKEW,
        TOTP_STEP,
        secret_bytes,
        Some(issuer.to_string()),
        account.to_string(),
    )
    .map_err(|e| ServiceError::Internal(anyhow::anyhow!("TOTP init: {}", e)))
}

/// Verify a time-based code against a stored base32 secret.
///
/// Clock trouble reads as an invalid code rather than an error, so callers
/// cannot distinguish why verification failed.
pub fn verify_totp_code(
    secret_base32: &str,
    code: &str,
    issuer: &str,
    account: &str,
) -> Result<bool, ServiceError> {
    let totp = build_totp(secret_base32, issuer, account)?;
    let code = code.replace([' ', '-'], "");

    match totp.check_current(&code) {
        Ok(valid) => Ok(valid),
        Err(e) => {
            tracing::warn!(error = %e, "TOTP verification error");
            Ok(false)
        }
    }
}

#[derive(Clone)]
pub struct TwoFactorService {
    directory: Arc<dyn DirectoryStore>,
    issuer: String,
}

impl TwoFactorService {
    pub fn new(directory: Arc<dyn DirectoryStore>, issuer: String) -> Self {
        Self { directory, issuer }
    }

    pub fn issuer(&self) -> &str {
        &self.issuer
    }

    /// Provision a fresh secret and return the scannable enrollment payload.
    ///
    /// The secret is persisted through a guarded update that matches only
    /// records without two-factor enabled; a second call before confirmation
    /// simply rotates the pending secret.
    pub async fn generate_two_factor_auth(
        &self,
        user_id: &str,
    ) -> Result<TwoFactorEnrollment, ServiceError> {
        let record = self
            .directory
            .find_security_by_user_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        if record.is_two_factor_auth {
            return Err(ServiceError::BadRequest(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        let secret = Secret::generate_secret();
        let secret_base32 = secret.to_encoded().to_string();

        let stored = self
            .directory
            .set_two_factor_secret_if_disabled(user_id, &secret_base32)
            .await?;
        if !stored {
            return Err(ServiceError::BadRequest(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }

        let totp = build_totp(&secret_base32, &self.issuer, &record.email)?;
        let otpauth_uri = totp.get_url();
        let qr_code_base64 = totp
            .get_qr_base64()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("QR render: {}", e)))?;

        tracing::info!(user_id = %user_id, "Two-factor secret provisioned");

        Ok(TwoFactorEnrollment {
            otpauth_uri,
            qr_code_base64,
        })
    }

    /// Confirm enrollment: a valid code flips the record to enabled.
    pub async fn verify_two_factor_auth(
        &self,
        user_id: &str,
        code: &str,
    ) -> Result<(), ServiceError> {
        let record = self
            .directory
            .find_security_by_user_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        if record.is_two_factor_auth {
            return Err(ServiceError::BadRequest(
                "Two-factor authentication is already enabled".to_string(),
            ));
        }
        if record.two_factor_secret.is_empty() {
            return Err(ServiceError::BadRequest(
                "No pending two-factor enrollment".to_string(),
            ));
        }

        if !verify_totp_code(&record.two_factor_secret, code, &self.issuer, &record.email)? {
            return Err(ServiceError::BadRequest(
                "Invalid or expired code".to_string(),
            ));
        }

        self.directory.enable_two_factor(user_id).await?;
        tracing::info!(user_id = %user_id, "Two-factor authentication enabled");
        Ok(())
    }

    /// Disable two-factor authentication. Idempotent: disabling a record
    /// that never enrolled is a no-op.
    pub async fn disable_two_factor_auth(&self, user_id: &str) -> Result<(), ServiceError> {
        self.directory
            .find_security_by_user_id(user_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;

        self.directory.disable_two_factor(user_id).await?;
        tracing::info!(user_id = %user_id, "Two-factor authentication disabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Role, SecurityRecord};
    use crate::services::MockDirectory;

    fn seeded_directory() -> Arc<MockDirectory> {
        let directory = Arc::new(MockDirectory::new());
        directory.insert_security(SecurityRecord::new(
            "user-1".to_string(),
            "worker@example.com".to_string(),
            None,
            None,
            Role::User,
        ));
        directory
    }

    fn current_code(secret_base32: &str) -> String {
        build_totp(secret_base32, "JobPlatform", "worker@example.com")
            .unwrap()
            .generate_current()
            .unwrap()
    }

    #[tokio::test]
    async fn enrollment_provisions_a_secret_and_qr() {
        let directory = seeded_directory();
        let service = TwoFactorService::new(directory.clone(), "JobPlatform".to_string());

        let enrollment = service.generate_two_factor_auth("user-1").await.unwrap();
        assert!(enrollment.otpauth_uri.starts_with("otpauth://totp/"));
        assert!(!enrollment.qr_code_base64.is_empty());

        let record = directory.get_security("user-1").unwrap();
        assert!(!record.two_factor_secret.is_empty());
        assert!(!record.is_two_factor_auth);
    }

    #[tokio::test]
    async fn confirmation_with_valid_code_enables() {
        let directory = seeded_directory();
        let service = TwoFactorService::new(directory.clone(), "JobPlatform".to_string());

        service.generate_two_factor_auth("user-1").await.unwrap();
        let secret = directory.get_security("user-1").unwrap().two_factor_secret;

        service
            .verify_two_factor_auth("user-1", &current_code(&secret))
            .await
            .unwrap();

        assert!(directory.get_security("user-1").unwrap().is_two_factor_auth);
    }

    #[tokio::test]
    async fn confirmation_with_wrong_code_is_rejected() {
        let directory = seeded_directory();
        let service = TwoFactorService::new(directory.clone(), "JobPlatform".to_string());

        service.generate_two_factor_auth("user-1").await.unwrap();

        let result = service.verify_two_factor_auth("user-1", "000000").await;
        assert!(matches!(result, Err(ServiceError::BadRequest(_))));
        assert!(!directory.get_security("user-1").unwrap().is_two_factor_auth);
    }

    #[tokio::test]
    async fn enabling_twice_is_rejected() {
        let directory = seeded_directory();
        let service = TwoFactorService::new(directory.clone(), "JobPlatform".to_string());

        service.generate_two_factor_auth("user-1").await.unwrap();
        let secret = directory.get_security("user-1").unwrap().two_factor_secret;
        service
            .verify_two_factor_auth("user-1", &current_code(&secret))
            .await
            .unwrap();

        let again = service.generate_two_factor_auth("user-1").await;
        assert!(matches!(again, Err(ServiceError::BadRequest(_))));
    }

    #[tokio::test]
    async fn disable_is_idempotent() {
        let directory = seeded_directory();
        let service = TwoFactorService::new(directory.clone(), "JobPlatform".to_string());

        service.disable_two_factor_auth("user-1").await.unwrap();
        service.disable_two_factor_auth("user-1").await.unwrap();

        let record = directory.get_security("user-1").unwrap();
        assert!(!record.is_two_factor_auth);
        assert!(record.two_factor_secret.is_empty());
    }
}
