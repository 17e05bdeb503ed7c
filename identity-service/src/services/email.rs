//! Outbound notification dispatch.

use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials, Message,
    SmtpTransport, Transport,
};
use service_core::error::AppError;
use std::time::Duration;

use async_trait::async_trait;

/// Notifier contract: the three message kinds the identity subsystem sends.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_signup_confirmation(
        &self,
        to_email: &str,
        confirmation_token: &str,
    ) -> Result<(), AppError>;

    async fn send_password_reset(&self, to_email: &str, reset_token: &str)
        -> Result<(), AppError>;

    async fn send_generic_verify(&self, to_email: &str, message: &str) -> Result<(), AppError>;
}

#[derive(Clone)]
pub struct EmailService {
    mailer: SmtpTransport,
    from_email: String,
    base_url: String,
}

impl EmailService {
    pub fn new(config: &crate::config::SmtpConfig) -> Result<Self, AppError> {
        let creds = Credentials::new(config.user.clone(), config.password.clone());

        let mailer = SmtpTransport::relay(&config.relay)
            .map_err(|e| AppError::InternalError(anyhow::anyhow!(e.to_string())))?
            .credentials(creds)
            .port(587)
            .timeout(Some(Duration::from_secs(10)))
            .build();

        tracing::info!(relay = %config.relay, "Email service initialized");

        Ok(Self {
            mailer,
            from_email: config.user.clone(),
            base_url: config.base_url.clone(),
        })
    }

    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        body: &str,
    ) -> Result<(), AppError> {
        let email = Message::builder()
            .from(self.from_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .to(to_email.parse().map_err(
                |e: lettre::address::AddressError| AppError::InternalError(e.into()),
            )?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body.to_string())
            .map_err(|e| AppError::InternalError(e.into()))?;

        // SMTP send is blocking; keep it off the async runtime
        let mailer = self.mailer.clone();
        let result = tokio::task::spawn_blocking(move || mailer.send(&email))
            .await
            .map_err(|e| AppError::InternalError(e.into()))?;

        match result {
            Ok(_) => {
                tracing::info!(to = %to_email, subject = %subject, "Email sent");
                Ok(())
            }
            Err(e) => {
                tracing::error!(error = %e.to_string(), to = %to_email, "Failed to send email");
                Err(AppError::EmailError(e.to_string()))
            }
        }
    }
}

#[async_trait]
impl Notifier for EmailService {
    async fn send_signup_confirmation(
        &self,
        to_email: &str,
        confirmation_token: &str,
    ) -> Result<(), AppError> {
        let link = format!("{}/auth/verify?token={}", self.base_url, confirmation_token);
        let body = format!(
            "Welcome to the platform!\n\n\
             Please confirm your email address by visiting the link below within 20 minutes:\n\n\
             {}\n\n\
             If you did not sign up, you can ignore this email.",
            link
        );
        self.send_email(to_email, "Confirm your registration", &body)
            .await
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        reset_token: &str,
    ) -> Result<(), AppError> {
        let link = format!(
            "{}/auth/password-reset/confirm?token={}",
            self.base_url, reset_token
        );
        let body = format!(
            "We received a request to reset your password.\n\n\
             Visit the link below to set a new password:\n\n\
             {}\n\n\
             If you did not request this, you can ignore this email.",
            link
        );
        self.send_email(to_email, "Reset your password", &body).await
    }

    async fn send_generic_verify(&self, to_email: &str, message: &str) -> Result<(), AppError> {
        self.send_email(to_email, "Verification required", message)
            .await
    }
}

/// Records sent messages instead of dispatching them; `fail_sends` makes
/// every send fail so the saga's no-rollback-on-dispatch-failure path can be
/// tested.
pub struct MockEmailService {
    pub sent: std::sync::Mutex<Vec<(String, String)>>,
    pub fail_sends: std::sync::atomic::AtomicBool,
}

impl Default for MockEmailService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEmailService {
    pub fn new() -> Self {
        Self {
            sent: std::sync::Mutex::new(Vec::new()),
            fail_sends: std::sync::atomic::AtomicBool::new(false),
        }
    }

    fn record(&self, to_email: &str, token_or_message: &str) -> Result<(), AppError> {
        if self.fail_sends.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(AppError::EmailError("injected send failure".to_string()));
        }
        self.sent
            .lock()
            .map_err(|e| AppError::InternalError(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .push((to_email.to_string(), token_or_message.to_string()));
        Ok(())
    }

    /// Last token handed to the notifier for `to_email`, if any.
    pub fn last_token_for(&self, to_email: &str) -> Option<String> {
        self.sent
            .lock()
            .expect("mock mutex poisoned")
            .iter()
            .rev()
            .find(|(to, _)| to == to_email)
            .map(|(_, token)| token.clone())
    }
}

#[async_trait]
impl Notifier for MockEmailService {
    async fn send_signup_confirmation(
        &self,
        to_email: &str,
        confirmation_token: &str,
    ) -> Result<(), AppError> {
        self.record(to_email, confirmation_token)
    }

    async fn send_password_reset(
        &self,
        to_email: &str,
        reset_token: &str,
    ) -> Result<(), AppError> {
        self.record(to_email, reset_token)
    }

    async fn send_generic_verify(&self, to_email: &str, message: &str) -> Result<(), AppError> {
        self.record(to_email, message)
    }
}
