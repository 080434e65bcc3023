use async_trait::async_trait;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;
use marche_catalog::Shipping;
use marche_order::{RepositoryError, ShippingRepository};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Cached value could not be decoded: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Minimal key/value contract the caches need.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError>;

    async fn del(&self, key: &str) -> Result<(), CacheError>;
}

/// Process-local store used when no Redis is configured.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let entries = self.entries.read().await;
        Ok(entries
            .get(key)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let expires_at = Instant::now() + Duration::from_secs(ttl_seconds);
        let mut entries = self.entries.write().await;
        entries.retain(|_, (_, at)| *at > Instant::now());
        entries.insert(key.to_string(), (value.to_string(), expires_at));
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        self.entries.write().await.remove(key);
        Ok(())
    }
}

#[derive(Clone)]
pub struct RedisCacheStore {
    client: redis::Client,
}

impl RedisCacheStore {
    pub fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.set_ex::<_, _, ()>(key, value, ttl_seconds).await?;
        Ok(())
    }

    async fn del(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }
}

/// Read-through cache for each coordinator's default shipping table.
///
/// Cache failures are logged and bypassed; the inner repository stays the
/// source of truth. Saves go to the inner repository first, then evict.
pub struct ShippingCache {
    inner: Arc<dyn ShippingRepository>,
    store: Arc<dyn CacheStore>,
    ttl_seconds: u64,
}

impl ShippingCache {
    pub fn new(inner: Arc<dyn ShippingRepository>, store: Arc<dyn CacheStore>, ttl_seconds: u64) -> Self {
        Self { inner, store, ttl_seconds }
    }

    fn key(coordinator_id: Uuid) -> String {
        format!("shipping:default:{}", coordinator_id)
    }

    /// Drop the cached default for a coordinator.
    pub async fn invalidate(&self, coordinator_id: Uuid) {
        if let Err(e) = self.store.del(&Self::key(coordinator_id)).await {
            warn!("Failed to evict shipping cache for coordinator {}: {}", coordinator_id, e);
        } else {
            info!("Shipping cache invalidated for coordinator {}", coordinator_id);
        }
    }

    async fn cached(&self, key: &str) -> Option<Shipping> {
        match self.store.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(shipping) => Some(shipping),
                Err(e) => {
                    warn!("Discarding undecodable cache entry {}: {}", key, e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!("Shipping cache read failed for {}: {}", key, e);
                None
            }
        }
    }
}

#[async_trait]
impl ShippingRepository for ShippingCache {
    async fn get_default(&self, coordinator_id: Uuid) -> Result<Option<Shipping>, RepositoryError> {
        let key = Self::key(coordinator_id);
        if let Some(shipping) = self.cached(&key).await {
            debug!("Shipping cache hit for coordinator {}", coordinator_id);
            return Ok(Some(shipping));
        }

        let shipping = self.inner.get_default(coordinator_id).await?;
        if let Some(shipping) = &shipping {
            match serde_json::to_string(shipping) {
                Ok(raw) => {
                    if let Err(e) = self.store.set_ex(&key, &raw, self.ttl_seconds).await {
                        warn!("Shipping cache write failed for {}: {}", key, e);
                    }
                }
                Err(e) => warn!("Could not encode shipping {} for cache: {}", shipping.id, e),
            }
        }
        Ok(shipping)
    }

    async fn list(&self, coordinator_id: Uuid) -> Result<Vec<Shipping>, RepositoryError> {
        self.inner.list(coordinator_id).await
    }

    async fn save(&self, shipping: &Shipping) -> Result<(), RepositoryError> {
        self.inner.save(shipping).await?;
        self.invalidate(shipping.coordinator_id).await;
        Ok(())
    }
}
