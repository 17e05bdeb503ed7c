use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::SanitizedSecurityRecord;
use crate::services::TokenPair;

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 7, message = "Phone number is too short"))]
    pub phone_number: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub confirm_password: String,

    pub display_name: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct VerifyRequest {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct EmailLoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PhoneLoginRequest {
    #[validate(length(min = 7, message = "Phone number is too short"))]
    pub phone_number: String,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct TwoFactorCodeRequest {
    #[validate(length(min = 6, max = 8, message = "Code must be 6-8 digits"))]
    pub code: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct PasswordResetConfirm {
    #[validate(length(min = 1, message = "Token is required"))]
    pub token: String,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub new_password: String,
}

/// Successful login/refresh payload. Tokens are also set as cookies.
#[derive(Debug, Serialize)]
pub struct SessionData {
    pub user: SanitizedSecurityRecord,
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub token_type: String,
    pub expires_in: i64,
}

impl SessionData {
    pub fn new(user: SanitizedSecurityRecord, tokens: TokenPair, expires_in: i64) -> Self {
        Self {
            user,
            tokens,
            token_type: "Bearer".to_string(),
            expires_in,
        }
    }
}

/// Login succeeded but tokens are withheld pending two-factor verification.
#[derive(Debug, Serialize)]
pub struct PendingTwoFactorData {
    pub user_id: String,
    pub two_factor_required: bool,
    pub temp_token: String,
}

/// Silent-refresh payload: only the access token rotates.
#[derive(Debug, Serialize)]
pub struct RefreshData {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
}
