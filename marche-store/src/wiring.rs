use std::sync::Arc;
use marche_order::{EventPublisher, OrderManager};
use crate::app_config::Config;
use crate::cache::{CacheStore, MemoryCacheStore, RedisCacheStore, ShippingCache};
use crate::database::DbClient;
use crate::order_repo::PgOrderRepository;
use crate::product_repo::PgProductRepository;
use crate::promotion_repo::PgPromotionRepository;
use crate::shipping_repo::PgShippingRepository;

/// Postgres-backed shipping repository behind the configured cache.
pub fn shipping_cache(config: &Config, db: &DbClient) -> Result<ShippingCache, redis::RedisError> {
    let store: Arc<dyn CacheStore> = match &config.cache.redis_url {
        Some(url) => Arc::new(RedisCacheStore::new(url)?),
        None => Arc::new(MemoryCacheStore::new()),
    };
    Ok(ShippingCache::new(
        Arc::new(PgShippingRepository::new(db.pool.clone())),
        store,
        config.cache.shipping_ttl_seconds,
    ))
}

pub fn order_manager(
    config: &Config,
    db: &DbClient,
    events: Arc<dyn EventPublisher>,
) -> Result<OrderManager, redis::RedisError> {
    Ok(OrderManager::new(
        Arc::new(PgOrderRepository::new(db.pool.clone())),
        Arc::new(PgProductRepository::new(db.pool.clone())),
        Arc::new(shipping_cache(config, db)?),
        Arc::new(PgPromotionRepository::new(db.pool.clone())),
        events,
        config.settlement,
    ))
}
