//! External identity authority client.
//!
//! The authority is the system of record for the primary (email) credential:
//! identities are created there at registration commit, verified there on
//! email login, and deleted there when the local commit fails.

use async_trait::async_trait;
use serde::Deserialize;

use crate::config::AuthorityConfig;
use crate::services::ServiceError;

#[async_trait]
pub trait IdentityAuthority: Send + Sync {
    /// Create the identity; returns the authority-assigned identity id,
    /// which becomes the local `user_id`.
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        phone_number: Option<&str>,
    ) -> Result<String, ServiceError>;

    async fn verify_credential(&self, email: &str, password: &str)
        -> Result<bool, ServiceError>;

    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError>;

    /// Revoke refresh capability for all of the identity's sessions.
    async fn revoke_sessions(&self, identity_id: &str) -> Result<(), ServiceError>;

    async fn lookup_email(&self, email: &str) -> Result<bool, ServiceError>;

    async fn lookup_phone(&self, phone_number: &str) -> Result<bool, ServiceError>;
}

#[derive(Clone)]
pub struct RestIdentityAuthority {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct IdentityCreated {
    identity_id: String,
}

#[derive(Deserialize)]
struct CredentialCheck {
    valid: bool,
}

#[derive(Deserialize)]
struct LookupResult {
    exists: bool,
}

impl RestIdentityAuthority {
    pub fn new(config: &AuthorityConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

#[async_trait]
impl IdentityAuthority for RestIdentityAuthority {
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        phone_number: Option<&str>,
    ) -> Result<String, ServiceError> {
        let res = self
            .client
            .post(self.url("/identities"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({
                "email": email,
                "password": password,
                "phone_number": phone_number,
            }))
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "identity creation failed with status {}",
                res.status()
            )));
        }

        let created: IdentityCreated = res
            .json()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;
        Ok(created.identity_id)
    }

    async fn verify_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let res = self
            .client
            .post(self.url("/identities/verify"))
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if res.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Ok(false);
        }
        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "credential verification failed with status {}",
                res.status()
            )));
        }

        let check: CredentialCheck = res
            .json()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;
        Ok(check.valid)
    }

    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError> {
        let res = self
            .client
            .delete(self.url(&format!("/identities/{}", identity_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "identity deletion failed with status {}",
                res.status()
            )));
        }
        Ok(())
    }

    async fn revoke_sessions(&self, identity_id: &str) -> Result<(), ServiceError> {
        let res = self
            .client
            .post(self.url(&format!("/identities/{}/revoke", identity_id)))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "session revocation failed with status {}",
                res.status()
            )));
        }
        Ok(())
    }

    async fn lookup_email(&self, email: &str) -> Result<bool, ServiceError> {
        let res = self
            .client
            .get(self.url("/identities/lookup"))
            .bearer_auth(&self.api_key)
            .query(&[("email", email)])
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "lookup failed with status {}",
                res.status()
            )));
        }

        let lookup: LookupResult = res
            .json()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;
        Ok(lookup.exists)
    }

    async fn lookup_phone(&self, phone_number: &str) -> Result<bool, ServiceError> {
        let res = self
            .client
            .get(self.url("/identities/lookup"))
            .bearer_auth(&self.api_key)
            .query(&[("phone_number", phone_number)])
            .send()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;

        if !res.status().is_success() {
            return Err(ServiceError::Authority(format!(
                "lookup failed with status {}",
                res.status()
            )));
        }

        let lookup: LookupResult = res
            .json()
            .await
            .map_err(|e| ServiceError::Authority(e.to_string()))?;
        Ok(lookup.exists)
    }
}

/// In-memory authority for tests.
pub struct MockIdentityAuthority {
    identities: std::sync::Mutex<std::collections::HashMap<String, MockIdentity>>,
    revoked: std::sync::Mutex<Vec<String>>,
    pub fail_create: std::sync::atomic::AtomicBool,
    pub fail_delete: std::sync::atomic::AtomicBool,
    next_id: std::sync::atomic::AtomicU64,
}

#[derive(Clone)]
struct MockIdentity {
    identity_id: String,
    password: String,
    phone_number: Option<String>,
}

impl Default for MockIdentityAuthority {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIdentityAuthority {
    pub fn new() -> Self {
        Self {
            identities: std::sync::Mutex::new(std::collections::HashMap::new()),
            revoked: std::sync::Mutex::new(Vec::new()),
            fail_create: std::sync::atomic::AtomicBool::new(false),
            fail_delete: std::sync::atomic::AtomicBool::new(false),
            next_id: std::sync::atomic::AtomicU64::new(1),
        }
    }

    /// Seed an identity directly, bypassing the registration saga.
    pub fn insert_identity(&self, identity_id: &str, email: &str, password: &str) {
        self.insert_identity_with_phone(identity_id, email, password, None);
    }

    pub fn insert_identity_with_phone(
        &self,
        identity_id: &str,
        email: &str,
        password: &str,
        phone_number: Option<&str>,
    ) {
        self.identities
            .lock()
            .expect("mock authority mutex poisoned")
            .insert(
                email.to_string(),
                MockIdentity {
                    identity_id: identity_id.to_string(),
                    password: password.to_string(),
                    phone_number: phone_number.map(str::to_string),
                },
            );
    }

    pub fn revoked_sessions(&self) -> Vec<String> {
        self.revoked
            .lock()
            .expect("mock authority mutex poisoned")
            .clone()
    }
}

#[async_trait]
impl IdentityAuthority for MockIdentityAuthority {
    async fn create_identity(
        &self,
        email: &str,
        password: &str,
        phone_number: Option<&str>,
    ) -> Result<String, ServiceError> {
        if self.fail_create.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Authority(
                "injected identity creation failure".to_string(),
            ));
        }

        let mut guard = self
            .identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        if guard.contains_key(email) {
            return Err(ServiceError::Conflict(
                "An account with this email already exists".to_string(),
            ));
        }

        let id = format!(
            "id-{}",
            self.next_id
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
        );
        guard.insert(
            email.to_string(),
            MockIdentity {
                identity_id: id.clone(),
                password: password.to_string(),
                phone_number: phone_number.map(str::to_string),
            },
        );
        Ok(id)
    }

    async fn verify_credential(
        &self,
        email: &str,
        password: &str,
    ) -> Result<bool, ServiceError> {
        let guard = self
            .identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard
            .get(email)
            .map(|identity| identity.password == password)
            .unwrap_or(false))
    }

    async fn delete_identity(&self, identity_id: &str) -> Result<(), ServiceError> {
        if self.fail_delete.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Authority(
                "injected identity deletion failure".to_string(),
            ));
        }

        let mut guard = self
            .identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        guard.retain(|_, identity| identity.identity_id != identity_id);
        Ok(())
    }

    async fn revoke_sessions(&self, identity_id: &str) -> Result<(), ServiceError> {
        self.revoked
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .push(identity_id.to_string());
        Ok(())
    }

    async fn lookup_email(&self, email: &str) -> Result<bool, ServiceError> {
        let guard = self
            .identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard.contains_key(email))
    }

    async fn lookup_phone(&self, phone_number: &str) -> Result<bool, ServiceError> {
        let guard = self
            .identities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard
            .values()
            .any(|identity| identity.phone_number.as_deref() == Some(phone_number)))
    }
}
