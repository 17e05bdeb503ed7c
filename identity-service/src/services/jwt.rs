use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::JwtConfig;
use crate::models::SecurityRecord;
use crate::services::ServiceError;

/// Token issuance and verification. Each token class (access, refresh, temp)
/// signs with its own secret.
#[derive(Clone)]
pub struct TokenService {
    access_encoding: EncodingKey,
    access_decoding: DecodingKey,
    refresh_encoding: EncodingKey,
    refresh_decoding: DecodingKey,
    temp_encoding: EncodingKey,
    temp_decoding: DecodingKey,
    access_token_expiry_minutes: i64,
    refresh_token_expiry_days: i64,
    temp_token_expiry_minutes: i64,
}

/// Claims carried by access and refresh tokens: a denormalized snapshot of
/// the identity so downstream services avoid extra reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    /// Subject (user ID)
    pub sub: String,
    pub role: String,
    pub email: String,
    pub phone: Option<String>,
    pub name: Option<String>,
    pub verified: bool,
    /// Join date (Unix timestamp)
    pub joined: i64,
    /// Set to issuance time
    pub last_seen: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// JWT ID
    pub jti: String,
}

/// Narrow claims for the pending-2FA token: it authorizes the next
/// two-factor verification call only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempClaims {
    /// Identifier the 2FA verification will be keyed by
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Transient token pair; never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenService {
    pub fn new(config: &JwtConfig) -> Self {
        Self {
            access_encoding: EncodingKey::from_secret(config.access_secret.as_bytes()),
            access_decoding: DecodingKey::from_secret(config.access_secret.as_bytes()),
            refresh_encoding: EncodingKey::from_secret(config.refresh_secret.as_bytes()),
            refresh_decoding: DecodingKey::from_secret(config.refresh_secret.as_bytes()),
            temp_encoding: EncodingKey::from_secret(config.temp_secret.as_bytes()),
            temp_decoding: DecodingKey::from_secret(config.temp_secret.as_bytes()),
            access_token_expiry_minutes: config.access_token_expiry_minutes,
            refresh_token_expiry_days: config.refresh_token_expiry_days,
            temp_token_expiry_minutes: config.temp_token_expiry_minutes,
        }
    }

    fn session_claims(
        &self,
        record: &SecurityRecord,
        display_name: Option<String>,
        lifetime: Duration,
    ) -> SessionClaims {
        let now = Utc::now();
        SessionClaims {
            sub: record.user_id.clone(),
            role: record.role.as_str().to_string(),
            email: record.email.clone(),
            phone: record.phone_number.clone(),
            name: display_name,
            verified: record.is_email_verified,
            joined: record.created_at.timestamp(),
            last_seen: now.timestamp(),
            iat: now.timestamp(),
            exp: (now + lifetime).timestamp(),
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Issue the full access + refresh pair for an authenticated identity.
    pub fn generate_token_pair(
        &self,
        record: &SecurityRecord,
        display_name: Option<String>,
    ) -> Result<TokenPair, ServiceError> {
        let access_claims = self.session_claims(
            record,
            display_name.clone(),
            Duration::minutes(self.access_token_expiry_minutes),
        );
        let refresh_claims = self.session_claims(
            record,
            display_name,
            Duration::days(self.refresh_token_expiry_days),
        );

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &access_claims,
            &self.access_encoding,
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("access token encode: {}", e)))?;

        let refresh_token = encode(
            &Header::new(Algorithm::HS256),
            &refresh_claims,
            &self.refresh_encoding,
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("refresh token encode: {}", e)))?;

        Ok(TokenPair {
            access_token,
            refresh_token,
        })
    }

    /// Issue the short-lived pending-2FA token.
    pub fn generate_temp_token(
        &self,
        identifier: &str,
        role: &str,
    ) -> Result<String, ServiceError> {
        let now = Utc::now();
        let claims = TempClaims {
            sub: identifier.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.temp_token_expiry_minutes)).timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.temp_encoding)
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("temp token encode: {}", e)))
    }

    pub fn verify_access_token(&self, token: &str) -> Result<SessionClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.access_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| ServiceError::Unauthorized("Invalid or expired access token".to_string()))
    }

    pub fn verify_refresh_token(&self, token: &str) -> Result<SessionClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<SessionClaims>(token, &self.refresh_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| {
                ServiceError::Unauthorized("Invalid or expired refresh token".to_string())
            })
    }

    pub fn verify_temp_token(&self, token: &str) -> Result<TempClaims, ServiceError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.leeway = 0;

        decode::<TempClaims>(token, &self.temp_decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| {
                ServiceError::Unauthorized("Invalid or expired verification token".to_string())
            })
    }

    /// Silent refresh: sequential, explicit verification.
    ///
    /// A still-valid access token passes through unchanged. Otherwise the
    /// refresh token must verify and a new access token is re-signed from
    /// its claims minus the timing claims. An invalid refresh token at that
    /// point is fatal.
    pub fn refresh_session(
        &self,
        access_token: Option<&str>,
        refresh_token: Option<&str>,
    ) -> Result<(String, SessionClaims), ServiceError> {
        if let Some(access) = access_token {
            if let Ok(claims) = self.verify_access_token(access) {
                return Ok((access.to_string(), claims));
            }
        }

        let refresh = refresh_token
            .ok_or_else(|| ServiceError::Unauthorized("Missing refresh token".to_string()))?;
        let refresh_claims = self.verify_refresh_token(refresh)?;

        let now = Utc::now();
        let access_claims = SessionClaims {
            iat: now.timestamp(),
            exp: (now + Duration::minutes(self.access_token_expiry_minutes)).timestamp(),
            last_seen: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            ..refresh_claims
        };

        let access_token = encode(
            &Header::new(Algorithm::HS256),
            &access_claims,
            &self.access_encoding,
        )
        .map_err(|e| ServiceError::Internal(anyhow::anyhow!("access token encode: {}", e)))?;

        Ok((access_token, access_claims))
    }

    pub fn access_token_expiry_seconds(&self) -> i64 {
        self.access_token_expiry_minutes * 60
    }

    pub fn refresh_token_expiry_seconds(&self) -> i64 {
        self.refresh_token_expiry_days * 24 * 60 * 60
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;

    fn test_config() -> JwtConfig {
        JwtConfig {
            access_secret: "access-secret-for-tests".to_string(),
            refresh_secret: "refresh-secret-for-tests".to_string(),
            temp_secret: "temp-secret-for-tests".to_string(),
            access_token_expiry_minutes: 30,
            refresh_token_expiry_days: 7,
            temp_token_expiry_minutes: 5,
        }
    }

    fn test_record() -> SecurityRecord {
        SecurityRecord::new(
            "user-1".to_string(),
            "worker@example.com".to_string(),
            Some("+15550100".to_string()),
            None,
            Role::User,
        )
    }

    #[test]
    fn pair_generation_and_validation() {
        let service = TokenService::new(&test_config());
        let pair = service
            .generate_token_pair(&test_record(), Some("Worker".to_string()))
            .unwrap();

        let access = service.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(access.sub, "user-1");
        assert_eq!(access.email, "worker@example.com");
        assert_eq!(access.role, "user");
        assert!(access.verified);

        let refresh = service.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, "user-1");
    }

    #[test]
    fn token_classes_are_not_interchangeable() {
        let service = TokenService::new(&test_config());
        let pair = service.generate_token_pair(&test_record(), None).unwrap();

        assert!(service.verify_access_token(&pair.refresh_token).is_err());
        assert!(service.verify_refresh_token(&pair.access_token).is_err());
    }

    #[test]
    fn temp_token_round_trip() {
        let service = TokenService::new(&test_config());
        let token = service
            .generate_temp_token("worker@example.com", "user")
            .unwrap();

        let claims = service.verify_temp_token(&token).unwrap();
        assert_eq!(claims.sub, "worker@example.com");
        assert_eq!(claims.role, "user");
    }

    #[test]
    fn valid_access_token_passes_through() {
        let service = TokenService::new(&test_config());
        let pair = service.generate_token_pair(&test_record(), None).unwrap();

        let (token, claims) = service
            .refresh_session(Some(&pair.access_token), Some(&pair.refresh_token))
            .unwrap();
        assert_eq!(token, pair.access_token);
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn expired_access_token_is_rotated_with_identity_claims_preserved() {
        let mut config = test_config();
        config.access_token_expiry_minutes = -5;
        let expiring = TokenService::new(&config);
        let pair = expiring
            .generate_token_pair(&test_record(), Some("Worker".to_string()))
            .unwrap();

        let service = TokenService::new(&test_config());
        assert!(service.verify_access_token(&pair.access_token).is_err());

        let (new_access, claims) = service
            .refresh_session(Some(&pair.access_token), Some(&pair.refresh_token))
            .unwrap();
        assert_ne!(new_access, pair.access_token);
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.email, "worker@example.com");
        assert_eq!(claims.name.as_deref(), Some("Worker"));
        assert_eq!(claims.phone.as_deref(), Some("+15550100"));

        // The rotated token verifies as a fresh access token
        let verified = service.verify_access_token(&new_access).unwrap();
        assert_eq!(verified.sub, "user-1");
    }

    #[test]
    fn missing_refresh_token_is_fatal_when_access_is_invalid() {
        let service = TokenService::new(&test_config());
        let result = service.refresh_session(Some("garbage"), None);
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }

    #[test]
    fn invalid_refresh_token_is_fatal() {
        let service = TokenService::new(&test_config());
        let pair = service.generate_token_pair(&test_record(), None).unwrap();
        // Access token presented as refresh token: wrong class, wrong secret
        let result = service.refresh_session(None, Some(&pair.access_token));
        assert!(matches!(result, Err(ServiceError::Unauthorized(_))));
    }
}
