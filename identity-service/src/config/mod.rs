use serde::Deserialize;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;

/// Complete service configuration, assembled once at startup and passed into
/// each component's constructor. No ambient lookups after this point.
#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    #[serde(flatten)]
    pub common: core_config::Config,
    pub environment: Environment,
    pub service_name: String,
    pub service_version: String,
    pub log_level: String,
    pub mongodb: MongoConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub smtp: SmtpConfig,
    pub authority: AuthorityConfig,
    pub security: SecurityPolicyConfig,
    pub totp: TotpConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Dev,
    Prod,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MongoConfig {
    pub uri: String,
    pub database: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: String,
}

/// Token signing material and lifetimes. Each token class signs with its own
/// secret.
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub access_secret: String,
    pub refresh_secret: String,
    pub temp_secret: String,
    pub access_token_expiry_minutes: i64,
    pub refresh_token_expiry_days: i64,
    pub temp_token_expiry_minutes: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmtpConfig {
    pub relay: String,
    pub user: String,
    pub password: String,
    pub base_url: String,
}

/// External identity authority endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SecurityPolicyConfig {
    /// Consecutive failures before the lockout window applies.
    pub max_failed_logins: i64,
    /// Lockout cool-down, minutes.
    pub lockout_minutes: i64,
    /// Pending-signup TTL, seconds.
    pub signup_ttl_seconds: u64,
    /// Password-reset token TTL, seconds.
    pub reset_ttl_seconds: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TotpConfig {
    pub issuer: String,
}

impl IdentityConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let common_config = core_config::Config::load()?;

        let env_str = env::var("ENVIRONMENT").unwrap_or_else(|_| "dev".to_string());
        let environment: Environment = env_str
            .parse()
            .map_err(|e: String| AppError::ConfigError(anyhow::anyhow!(e)))?;

        let is_prod = environment == Environment::Prod;

        let config = IdentityConfig {
            common: common_config,
            environment,
            service_name: get_env("SERVICE_NAME", Some("identity-service"), is_prod)?,
            service_version: get_env("SERVICE_VERSION", Some(env!("CARGO_PKG_VERSION")), is_prod)?,
            log_level: get_env("LOG_LEVEL", Some("info"), is_prod)?,
            mongodb: MongoConfig {
                uri: get_env("MONGODB_URI", None, is_prod)?,
                database: get_env("MONGODB_DATABASE", None, is_prod)?,
            },
            redis: RedisConfig {
                url: get_env("REDIS_URL", None, is_prod)?,
            },
            jwt: JwtConfig {
                access_secret: get_env("JWT_ACCESS_SECRET", None, is_prod)?,
                refresh_secret: get_env("JWT_REFRESH_SECRET", None, is_prod)?,
                temp_secret: get_env("JWT_TEMP_SECRET", None, is_prod)?,
                access_token_expiry_minutes: parse_env(
                    "JWT_ACCESS_TOKEN_EXPIRY_MINUTES",
                    "30",
                    is_prod,
                )?,
                refresh_token_expiry_days: parse_env("JWT_REFRESH_TOKEN_EXPIRY_DAYS", "7", is_prod)?,
                temp_token_expiry_minutes: parse_env("JWT_TEMP_TOKEN_EXPIRY_MINUTES", "5", is_prod)?,
            },
            smtp: SmtpConfig {
                relay: get_env("SMTP_RELAY", Some("smtp.gmail.com"), is_prod)?,
                user: get_env("SMTP_USER", None, is_prod)?,
                password: get_env("SMTP_PASSWORD", None, is_prod)?,
                base_url: get_env("PUBLIC_BASE_URL", Some("http://localhost:8080"), is_prod)?,
            },
            authority: AuthorityConfig {
                base_url: get_env("AUTHORITY_BASE_URL", None, is_prod)?,
                api_key: get_env("AUTHORITY_API_KEY", None, is_prod)?,
            },
            security: SecurityPolicyConfig {
                max_failed_logins: parse_env("SECURITY_MAX_FAILED_LOGINS", "4", is_prod)?,
                lockout_minutes: parse_env("SECURITY_LOCKOUT_MINUTES", "10", is_prod)?,
                signup_ttl_seconds: parse_env("SECURITY_SIGNUP_TTL_SECONDS", "1200", is_prod)?,
                reset_ttl_seconds: parse_env("SECURITY_RESET_TTL_SECONDS", "1200", is_prod)?,
            },
            totp: TotpConfig {
                issuer: get_env("TOTP_ISSUER", Some("JobPlatform"), is_prod)?,
            },
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.common.port == 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "PORT must be greater than 0"
            )));
        }

        if self.jwt.access_token_expiry_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_ACCESS_TOKEN_EXPIRY_MINUTES must be positive"
            )));
        }

        if self.jwt.refresh_token_expiry_days <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT_REFRESH_TOKEN_EXPIRY_DAYS must be positive"
            )));
        }

        if self.security.max_failed_logins <= 0 || self.security.lockout_minutes <= 0 {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "lockout policy values must be positive"
            )));
        }

        let distinct = self.jwt.access_secret != self.jwt.refresh_secret
            && self.jwt.access_secret != self.jwt.temp_secret
            && self.jwt.refresh_secret != self.jwt.temp_secret;
        if !distinct {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "JWT secrets must be distinct per token class"
            )));
        }

        Ok(())
    }
}

fn get_env(key: &str, default: Option<&str>, is_prod: bool) -> Result<String, AppError> {
    match env::var(key) {
        Ok(val) => Ok(val),
        Err(_) => {
            if is_prod {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required in production but not set",
                    key
                ))))
            } else if let Some(def) = default {
                Ok(def.to_string())
            } else {
                Err(AppError::ConfigError(anyhow::anyhow!(format!(
                    "{} is required but not set",
                    key
                ))))
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, default: &str, is_prod: bool) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    get_env(key, Some(default), is_prod)?
        .parse()
        .map_err(|e: T::Err| AppError::ConfigError(anyhow::anyhow!("{}: {}", key, e)))
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "dev" => Ok(Environment::Dev),
            "prod" => Ok(Environment::Prod),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}
