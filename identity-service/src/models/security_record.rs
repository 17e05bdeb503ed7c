//! Security record - the lockout/two-factor source of truth, one per identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform role carried in token claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
    Manager,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
            Role::Manager => "manager",
        }
    }
}

/// Session status. A terminal state for the session, not the account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    Active,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "active",
            AccountStatus::Inactive => "inactive",
        }
    }
}

/// Security record stored in MongoDB. Created only as the final step of a
/// successful registration commit; mutated through field-scoped updates only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityRecord {
    /// Stable identity key, matches the external authority's identity id.
    #[serde(rename = "_id")]
    pub user_id: String,

    pub email: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone_number: Option<String>,

    /// Populated only when the authority is not the sole credential verifier
    /// (the phone login path verifies this hash locally).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,

    pub role: Role,
    pub status: AccountStatus,

    pub is_email_verified: bool,
    #[serde(default)]
    pub is_account_blocked: bool,
    #[serde(default)]
    pub is_account_deleted: bool,
    #[serde(default)]
    pub is_two_factor_auth: bool,

    /// Base32 TOTP secret; empty while two-factor is disabled.
    #[serde(default)]
    pub two_factor_secret: String,

    #[serde(default)]
    pub failed_login_count: i64,
    pub last_failed_login_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
}

impl SecurityRecord {
    /// Create a record for a freshly confirmed registration.
    pub fn new(
        user_id: String,
        email: String,
        phone_number: Option<String>,
        password_hash: Option<String>,
        role: Role,
    ) -> Self {
        Self {
            user_id,
            email,
            phone_number,
            password_hash,
            role,
            status: AccountStatus::Inactive,
            is_email_verified: true,
            is_account_blocked: false,
            is_account_deleted: false,
            is_two_factor_auth: false,
            two_factor_secret: String::new(),
            failed_login_count: 0,
            last_failed_login_at: None,
            created_at: Utc::now(),
        }
    }

    /// Remaining lockout minutes, or `None` when the account is not locked.
    ///
    /// The window is derived, not stored: `threshold` consecutive failures
    /// lock the account for `cooldown_minutes` from the last failure.
    pub fn lockout_remaining_minutes(
        &self,
        threshold: i64,
        cooldown_minutes: i64,
        now: DateTime<Utc>,
    ) -> Option<i64> {
        if self.failed_login_count < threshold {
            return None;
        }
        let last = self.last_failed_login_at?;
        let elapsed = (now - last).num_minutes();
        if elapsed >= cooldown_minutes {
            None
        } else {
            Some(cooldown_minutes - elapsed)
        }
    }

    /// Outward view with credentials and secrets stripped.
    pub fn sanitized(&self) -> SanitizedSecurityRecord {
        SanitizedSecurityRecord {
            user_id: self.user_id.clone(),
            email: self.email.clone(),
            phone_number: self.phone_number.clone(),
            role: self.role,
            status: self.status,
            is_email_verified: self.is_email_verified,
            is_two_factor_auth: self.is_two_factor_auth,
            created_at: self.created_at,
        }
    }
}

/// Security record as returned to callers. Never carries the password hash
/// or the two-factor secret.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedSecurityRecord {
    pub user_id: String,
    pub email: String,
    pub phone_number: Option<String>,
    pub role: Role,
    pub status: AccountStatus,
    pub is_email_verified: bool,
    pub is_two_factor_auth: bool,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> SecurityRecord {
        SecurityRecord::new(
            "user-1".to_string(),
            "worker@example.com".to_string(),
            None,
            None,
            Role::User,
        )
    }

    #[test]
    fn below_threshold_is_not_locked() {
        let mut rec = record();
        rec.failed_login_count = 3;
        rec.last_failed_login_at = Some(Utc::now());
        assert_eq!(rec.lockout_remaining_minutes(4, 10, Utc::now()), None);
    }

    #[test]
    fn recent_failures_lock_with_remaining_minutes() {
        let mut rec = record();
        rec.failed_login_count = 4;
        let now = Utc::now();
        rec.last_failed_login_at = Some(now - Duration::minutes(3));
        assert_eq!(rec.lockout_remaining_minutes(4, 10, now), Some(7));
    }

    #[test]
    fn elapsed_window_unlocks() {
        let mut rec = record();
        rec.failed_login_count = 7;
        let now = Utc::now();
        rec.last_failed_login_at = Some(now - Duration::minutes(10));
        assert_eq!(rec.lockout_remaining_minutes(4, 10, now), None);
    }

    #[test]
    fn sanitized_strips_secrets() {
        let mut rec = record();
        rec.password_hash = Some("$argon2id$...".to_string());
        rec.two_factor_secret = "JBSWY3DPEHPK3PXP".to_string();

        let view = serde_json::to_value(rec.sanitized()).unwrap();
        assert!(view.get("password_hash").is_none());
        assert!(view.get("two_factor_secret").is_none());
        assert_eq!(view["email"], "worker@example.com");
    }
}
