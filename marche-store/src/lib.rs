pub mod app_config;
pub mod cache;
pub mod database;
mod error;
pub mod events;
pub mod order_repo;
pub mod product_repo;
pub mod promotion_repo;
pub mod shipping_repo;
pub mod wiring;

pub use app_config::Config;
pub use cache::{CacheError, CacheStore, MemoryCacheStore, RedisCacheStore, ShippingCache};
pub use database::DbClient;
pub use events::BroadcastPublisher;
pub use order_repo::PgOrderRepository;
pub use product_repo::PgProductRepository;
pub use promotion_repo::PgPromotionRepository;
pub use shipping_repo::PgShippingRepository;
pub use wiring::{order_manager, shipping_cache};
