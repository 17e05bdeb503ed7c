//! Document-store access for the identity subsystem.
//!
//! `MongoDirectory` is the production implementation; `MockDirectory` backs
//! the tests. All mutations are field-scoped updates; the registration
//! commit is the only multi-document transaction in the system.

use async_trait::async_trait;
use mongodb::{
    bson::doc,
    error::{ErrorKind, WriteFailure},
    options::IndexOptions,
    Client as MongoClient, ClientSession, Collection, Database, IndexModel,
};

use crate::models::{
    AccountStatus, ActivityRecord, InterestRecord, PendingSignup, ProfileRecord, SecurityRecord,
    UserProfile,
};
use crate::services::ServiceError;

/// The document set created atomically when a registration is confirmed.
#[derive(Debug, Clone)]
pub struct RegistrationDocuments {
    pub user: UserProfile,
    pub security: SecurityRecord,
    pub profile: ProfileRecord,
    pub interest: InterestRecord,
    pub activity: ActivityRecord,
}

impl RegistrationDocuments {
    /// Assemble the full set from a confirmed pending signup.
    pub fn from_pending(
        user_id: String,
        pending: &PendingSignup,
        password_hash: Option<String>,
    ) -> Self {
        let user = UserProfile::new(
            user_id.clone(),
            pending.email.clone(),
            pending.phone_number.clone(),
            pending.display_name.clone(),
        );
        let security = SecurityRecord::new(
            user_id.clone(),
            pending.email.clone(),
            pending.phone_number.clone(),
            password_hash,
            pending.role,
        );
        Self {
            user,
            security,
            profile: ProfileRecord::default_for(&user_id),
            interest: InterestRecord::default_for(&user_id),
            activity: ActivityRecord::default_for(&user_id),
        }
    }
}

/// Store contract consumed by the sagas and the login state machine.
///
/// Reads feeding authorization decisions always go to the store; there is no
/// caching layer in this path.
#[async_trait]
pub trait DirectoryStore: Send + Sync {
    async fn health_check(&self) -> Result<(), ServiceError>;

    async fn find_security_by_email(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError>;

    async fn find_security_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError>;

    async fn find_security_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError>;

    /// Fetch filtered to records with two-factor enabled; used by the login
    /// 2FA step so a disabled record reads as absent.
    async fn find_two_factor_enabled(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError>;

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ServiceError>;

    /// Create the user, security, profile, interest, and activity documents
    /// in one atomic transaction. Duplicate identity keys surface `Conflict`.
    async fn commit_registration(
        &self,
        documents: RegistrationDocuments,
    ) -> Result<(), ServiceError>;

    /// Atomic `+1` and timestamp set in a single store operation; never
    /// read-modify-write.
    async fn increment_failed_login(&self, user_id: &str) -> Result<(), ServiceError>;

    async fn reset_failed_login(&self, user_id: &str) -> Result<(), ServiceError>;

    async fn set_session_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ServiceError>;

    /// Guarded secret provisioning: only matches records that do not already
    /// have two-factor enabled. Returns whether a record was matched.
    async fn set_two_factor_secret_if_disabled(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<bool, ServiceError>;

    async fn enable_two_factor(&self, user_id: &str) -> Result<(), ServiceError>;

    async fn disable_two_factor(&self, user_id: &str) -> Result<(), ServiceError>;

    async fn update_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), ServiceError>;

    async fn set_account_blocked(&self, user_id: &str, blocked: bool) -> Result<(), ServiceError>;

    async fn mark_account_deleted(&self, user_id: &str) -> Result<(), ServiceError>;
}

#[derive(Clone)]
pub struct MongoDirectory {
    client: MongoClient,
    db: Database,
}

impl MongoDirectory {
    pub async fn connect(uri: &str, database: &str) -> Result<Self, ServiceError> {
        tracing::info!(uri = %uri, "Connecting to MongoDB");
        let client = MongoClient::with_uri_str(uri).await?;
        let db = client.database(database);
        tracing::info!(database = %database, "Connected to MongoDB database");
        Ok(Self { client, db })
    }

    pub fn security_records(&self) -> Collection<SecurityRecord> {
        self.db.collection("security_records")
    }

    pub fn users(&self) -> Collection<UserProfile> {
        self.db.collection("users")
    }

    pub fn profiles(&self) -> Collection<ProfileRecord> {
        self.db.collection("profiles")
    }

    pub fn interests(&self) -> Collection<InterestRecord> {
        self.db.collection("interests")
    }

    pub fn activities(&self) -> Collection<ActivityRecord> {
        self.db.collection("activities")
    }

    /// Unique indexes back the duplicate-identity `Conflict` semantics.
    pub async fn initialize_indexes(&self) -> Result<(), ServiceError> {
        let security = self.security_records();

        let email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("email_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        security.create_index(email_index, None).await?;

        let phone_index = IndexModel::builder()
            .keys(doc! { "phone_number": 1 })
            .options(
                IndexOptions::builder()
                    .name("phone_unique_idx".to_string())
                    .unique(true)
                    .sparse(true)
                    .build(),
            )
            .build();
        security.create_index(phone_index, None).await?;

        let user_email_index = IndexModel::builder()
            .keys(doc! { "email": 1 })
            .options(
                IndexOptions::builder()
                    .name("user_email_unique_idx".to_string())
                    .unique(true)
                    .build(),
            )
            .build();
        self.users().create_index(user_email_index, None).await?;

        tracing::info!("MongoDB indexes created");
        Ok(())
    }

    async fn insert_all_in_session(
        &self,
        session: &mut ClientSession,
        documents: &RegistrationDocuments,
    ) -> Result<(), mongodb::error::Error> {
        self.users()
            .insert_one_with_session(&documents.user, None, session)
            .await?;
        self.security_records()
            .insert_one_with_session(&documents.security, None, session)
            .await?;
        self.profiles()
            .insert_one_with_session(&documents.profile, None, session)
            .await?;
        self.interests()
            .insert_one_with_session(&documents.interest, None, session)
            .await?;
        self.activities()
            .insert_one_with_session(&documents.activity, None, session)
            .await?;
        Ok(())
    }

    async fn update_security(
        &self,
        user_id: &str,
        update: mongodb::bson::Document,
    ) -> Result<(), ServiceError> {
        let result = self
            .security_records()
            .update_one(doc! { "_id": user_id }, update, None)
            .await?;
        if result.matched_count == 0 {
            return Err(ServiceError::NotFound("Account not found".to_string()));
        }
        Ok(())
    }
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        ErrorKind::Command(command_error) => command_error.code == 11000,
        _ => false,
    }
}

#[async_trait]
impl DirectoryStore for MongoDirectory {
    async fn health_check(&self) -> Result<(), ServiceError> {
        self.client
            .database("admin")
            .run_command(doc! { "ping": 1 }, None)
            .await?;
        Ok(())
    }

    async fn find_security_by_email(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        Ok(self
            .security_records()
            .find_one(doc! { "email": email }, None)
            .await?)
    }

    async fn find_security_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        Ok(self
            .security_records()
            .find_one(doc! { "phone_number": phone }, None)
            .await?)
    }

    async fn find_security_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        Ok(self
            .security_records()
            .find_one(doc! { "_id": user_id }, None)
            .await?)
    }

    async fn find_two_factor_enabled(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        Ok(self
            .security_records()
            .find_one(doc! { "email": email, "is_two_factor_auth": true }, None)
            .await?)
    }

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ServiceError> {
        Ok(self.users().find_one(doc! { "_id": user_id }, None).await?)
    }

    async fn commit_registration(
        &self,
        documents: RegistrationDocuments,
    ) -> Result<(), ServiceError> {
        let mut session = self.client.start_session(None).await?;
        session.start_transaction(None).await?;

        if let Err(e) = self.insert_all_in_session(&mut session, &documents).await {
            let _ = session.abort_transaction().await;
            if is_duplicate_key(&e) {
                return Err(ServiceError::Conflict(
                    "An account with this email or phone number already exists".to_string(),
                ));
            }
            return Err(ServiceError::Database(e));
        }

        session.commit_transaction().await?;
        tracing::info!(user_id = %documents.security.user_id, "Registration committed");
        Ok(())
    }

    async fn increment_failed_login(&self, user_id: &str) -> Result<(), ServiceError> {
        self.update_security(
            user_id,
            doc! {
                "$inc": { "failed_login_count": 1 },
                "$set": { "last_failed_login_at": chrono::Utc::now() },
            },
        )
        .await
    }

    async fn reset_failed_login(&self, user_id: &str) -> Result<(), ServiceError> {
        self.update_security(
            user_id,
            doc! {
                "$set": {
                    "failed_login_count": 0,
                    "last_failed_login_at": mongodb::bson::Bson::Null,
                },
            },
        )
        .await
    }

    async fn set_session_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ServiceError> {
        self.update_security(user_id, doc! { "$set": { "status": status.as_str() } })
            .await
    }

    async fn set_two_factor_secret_if_disabled(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<bool, ServiceError> {
        let result = self
            .security_records()
            .update_one(
                doc! { "_id": user_id, "is_two_factor_auth": { "$ne": true } },
                doc! { "$set": { "two_factor_secret": secret } },
                None,
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn enable_two_factor(&self, user_id: &str) -> Result<(), ServiceError> {
        self.update_security(user_id, doc! { "$set": { "is_two_factor_auth": true } })
            .await
    }

    async fn disable_two_factor(&self, user_id: &str) -> Result<(), ServiceError> {
        self.update_security(
            user_id,
            doc! { "$set": { "is_two_factor_auth": false, "two_factor_secret": "" } },
        )
        .await
    }

    async fn update_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        self.update_security(user_id, doc! { "$set": { "password_hash": password_hash } })
            .await
    }

    async fn set_account_blocked(&self, user_id: &str, blocked: bool) -> Result<(), ServiceError> {
        self.update_security(user_id, doc! { "$set": { "is_account_blocked": blocked } })
            .await
    }

    async fn mark_account_deleted(&self, user_id: &str) -> Result<(), ServiceError> {
        self.update_security(user_id, doc! { "$set": { "is_account_deleted": true } })
            .await
    }
}

/// In-memory directory for tests. `fail_commit` injects a transaction
/// failure so the saga's compensation path can be exercised.
pub struct MockDirectory {
    security: std::sync::Mutex<std::collections::HashMap<String, SecurityRecord>>,
    users: std::sync::Mutex<std::collections::HashMap<String, UserProfile>>,
    profiles: std::sync::Mutex<std::collections::HashMap<String, ProfileRecord>>,
    interests: std::sync::Mutex<std::collections::HashMap<String, InterestRecord>>,
    activities: std::sync::Mutex<std::collections::HashMap<String, ActivityRecord>>,
    pub fail_commit: std::sync::atomic::AtomicBool,
}

impl Default for MockDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDirectory {
    pub fn new() -> Self {
        Self {
            security: std::sync::Mutex::new(std::collections::HashMap::new()),
            users: std::sync::Mutex::new(std::collections::HashMap::new()),
            profiles: std::sync::Mutex::new(std::collections::HashMap::new()),
            interests: std::sync::Mutex::new(std::collections::HashMap::new()),
            activities: std::sync::Mutex::new(std::collections::HashMap::new()),
            fail_commit: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Seed a record directly, bypassing the registration saga.
    pub fn insert_security(&self, record: SecurityRecord) {
        self.security
            .lock()
            .expect("mock directory mutex poisoned")
            .insert(record.user_id.clone(), record);
    }

    pub fn get_security(&self, user_id: &str) -> Option<SecurityRecord> {
        self.security
            .lock()
            .expect("mock directory mutex poisoned")
            .get(user_id)
            .cloned()
    }

    pub fn security_count(&self) -> usize {
        self.security
            .lock()
            .expect("mock directory mutex poisoned")
            .len()
    }

    fn with_security<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&mut SecurityRecord) -> T,
    ) -> Result<T, ServiceError> {
        let mut guard = self
            .security
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        let record = guard
            .get_mut(user_id)
            .ok_or_else(|| ServiceError::NotFound("Account not found".to_string()))?;
        Ok(f(record))
    }
}

#[async_trait]
impl DirectoryStore for MockDirectory {
    async fn health_check(&self) -> Result<(), ServiceError> {
        Ok(())
    }

    async fn find_security_by_email(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        let guard = self
            .security
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard.values().find(|r| r.email == email).cloned())
    }

    async fn find_security_by_phone(
        &self,
        phone: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        let guard = self
            .security
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard
            .values()
            .find(|r| r.phone_number.as_deref() == Some(phone))
            .cloned())
    }

    async fn find_security_by_user_id(
        &self,
        user_id: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        Ok(self.get_security(user_id))
    }

    async fn find_two_factor_enabled(
        &self,
        email: &str,
    ) -> Result<Option<SecurityRecord>, ServiceError> {
        let guard = self
            .security
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard
            .values()
            .find(|r| r.email == email && r.is_two_factor_auth)
            .cloned())
    }

    async fn find_profile(&self, user_id: &str) -> Result<Option<UserProfile>, ServiceError> {
        let guard = self
            .users
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        Ok(guard.get(user_id).cloned())
    }

    async fn commit_registration(
        &self,
        documents: RegistrationDocuments,
    ) -> Result<(), ServiceError> {
        if self.fail_commit.load(std::sync::atomic::Ordering::SeqCst) {
            return Err(ServiceError::Internal(anyhow::anyhow!(
                "injected transaction failure"
            )));
        }

        let mut security = self
            .security
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?;
        let duplicate = security.contains_key(&documents.security.user_id)
            || security.values().any(|r| {
                r.email == documents.security.email
                    || (r.phone_number.is_some()
                        && r.phone_number == documents.security.phone_number)
            });
        if duplicate {
            return Err(ServiceError::Conflict(
                "An account with this email or phone number already exists".to_string(),
            ));
        }

        let user_id = documents.security.user_id.clone();
        security.insert(user_id.clone(), documents.security);
        drop(security);

        self.users
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .insert(user_id.clone(), documents.user);
        self.profiles
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .insert(user_id.clone(), documents.profile);
        self.interests
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .insert(user_id.clone(), documents.interest);
        self.activities
            .lock()
            .map_err(|e| ServiceError::Internal(anyhow::anyhow!("mock mutex poisoned: {}", e)))?
            .insert(user_id, documents.activity);
        Ok(())
    }

    async fn increment_failed_login(&self, user_id: &str) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| {
            r.failed_login_count += 1;
            r.last_failed_login_at = Some(chrono::Utc::now());
        })
    }

    async fn reset_failed_login(&self, user_id: &str) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| {
            r.failed_login_count = 0;
            r.last_failed_login_at = None;
        })
    }

    async fn set_session_status(
        &self,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| r.status = status)
    }

    async fn set_two_factor_secret_if_disabled(
        &self,
        user_id: &str,
        secret: &str,
    ) -> Result<bool, ServiceError> {
        self.with_security(user_id, |r| {
            if r.is_two_factor_auth {
                false
            } else {
                r.two_factor_secret = secret.to_string();
                true
            }
        })
    }

    async fn enable_two_factor(&self, user_id: &str) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| r.is_two_factor_auth = true)
    }

    async fn disable_two_factor(&self, user_id: &str) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| {
            r.is_two_factor_auth = false;
            r.two_factor_secret.clear();
        })
    }

    async fn update_password_hash(
        &self,
        user_id: &str,
        password_hash: &str,
    ) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| r.password_hash = Some(password_hash.to_string()))
    }

    async fn set_account_blocked(&self, user_id: &str, blocked: bool) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| r.is_account_blocked = blocked)
    }

    async fn mark_account_deleted(&self, user_id: &str) -> Result<(), ServiceError> {
        self.with_security(user_id, |r| r.is_account_deleted = true)
    }
}
