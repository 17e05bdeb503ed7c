//! TTL-backed staging cache for pending signups and reset tokens.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

/// Cache contract. `take` is the atomic delete-and-fetch used to consume
/// single-use tokens: two concurrent calls can never both observe the value.
#[async_trait]
pub trait SignupCache: Send + Sync {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error>;

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    /// Atomically fetch and delete.
    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error>;

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error>;

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error>;

    async fn health_check(&self) -> Result<(), anyhow::Error>;
}

#[derive(Clone)]
pub struct RedisCache {
    _client: Client,
    manager: ConnectionManager,
}

impl RedisCache {
    pub async fn new(config: &crate::config::RedisConfig) -> Result<Self, anyhow::Error> {
        tracing::info!(url = %config.url, "Connecting to Redis");
        let client = Client::open(config.url.clone())?;

        // ConnectionManager reconnects automatically
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            anyhow::anyhow!("Failed to connect to Redis: {}", e)
        })?;

        tracing::info!("Successfully connected to Redis");

        Ok(Self {
            _client: client,
            manager,
        })
    }
}

#[async_trait]
impl SignupCache for RedisCache {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(expiry_seconds)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to set cache entry: {}", e))
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to get cache entry: {}", e))
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to take cache entry: {}", e))
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to delete cache entry: {}", e))
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to check cache entry: {}", e))
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        let mut conn = self.manager.clone();
        redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| anyhow::anyhow!("Redis health check failed: {}", e))
    }
}

/// In-memory cache for tests. TTLs are not simulated; tests expire entries
/// by deleting them.
pub struct MockCache {
    pub entries: std::sync::Mutex<std::collections::HashMap<String, String>>,
}

impl Default for MockCache {
    fn default() -> Self {
        Self::new()
    }
}

impl MockCache {
    pub fn new() -> Self {
        Self {
            entries: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().expect("mock cache mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SignupCache for MockCache {
    async fn set_with_ttl(
        &self,
        key: &str,
        value: &str,
        _expiry_seconds: u64,
    ) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let val = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .get(key)
            .cloned();
        Ok(val)
    }

    async fn take(&self, key: &str) -> Result<Option<String>, anyhow::Error> {
        let val = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(val)
    }

    async fn delete(&self, key: &str) -> Result<(), anyhow::Error> {
        self.entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, anyhow::Error> {
        let exists = self
            .entries
            .lock()
            .map_err(|e| anyhow::anyhow!("Mock cache mutex poisoned: {}", e))?
            .contains_key(key);
        Ok(exists)
    }

    async fn health_check(&self) -> Result<(), anyhow::Error> {
        Ok(())
    }
}
