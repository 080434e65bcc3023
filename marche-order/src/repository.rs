use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use marche_catalog::{Experience, Product, Promotion, Shipping};
use marche_shared::OrderEvent;
use crate::models::{Order, OrderStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("Order {order_id} was modified concurrently (expected version {expected}, found {actual})")]
    ConcurrentModification { order_id: Uuid, expected: i64, actual: i64 },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    #[error("Duplicate {entity}: {id}")]
    Duplicate { entity: &'static str, id: String },

    #[error("Storage error: {0}")]
    Storage(String),
}

/// Which orders to list. Empty `statuses` means any status.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub coordinator_id: Option<Uuid>,
    pub statuses: Vec<OrderStatus>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        self.coordinator_id.map_or(true, |id| id == order.coordinator_id)
            && (self.statuses.is_empty() || self.statuses.contains(&order.status))
    }
}

/// One promotion use to give back together with an order write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromotionRelease {
    pub promotion_id: Uuid,
    pub amount: i64,
}

/// Repository trait for order aggregates
#[async_trait]
pub trait OrderRepository: Send + Sync {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError>;

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError>;

    /// Persist `order` only if the stored version still equals
    /// `expected_version`. Returns the new version.
    ///
    /// When `release` is given, the promotion's usage counters are decremented
    /// in the same unit of work: either both changes are stored or neither is.
    async fn update(
        &self,
        order: &Order,
        expected_version: i64,
        release: Option<&PromotionRelease>,
    ) -> Result<i64, RepositoryError>;

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError>;
}

/// Read access to the catalog
#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, RepositoryError>;

    async fn get_experience(&self, id: Uuid) -> Result<Option<Experience>, RepositoryError>;
}

#[async_trait]
pub trait ShippingRepository: Send + Sync {
    async fn get_default(&self, coordinator_id: Uuid) -> Result<Option<Shipping>, RepositoryError>;

    async fn list(&self, coordinator_id: Uuid) -> Result<Vec<Shipping>, RepositoryError>;

    /// Upsert. Saving a default clears the flag on the coordinator's other
    /// shipping records.
    async fn save(&self, shipping: &Shipping) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait PromotionRepository: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<Option<Promotion>, RepositoryError>;

    async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, RepositoryError>;

    async fn save(&self, promotion: &Promotion) -> Result<(), RepositoryError>;

    /// Atomically re-check that the promotion is enabled at `now` and below
    /// its usage limit, then count one use of `amount`. Returns `false` when
    /// the promotion is no longer eligible.
    async fn try_consume(&self, id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<bool, RepositoryError>;

    /// Undo one use of `amount`, never going below zero.
    async fn release(&self, id: Uuid, amount: i64) -> Result<(), RepositoryError>;
}

/// Sink for domain events. Called after the order change is persisted.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderEvent) -> Result<(), RepositoryError>;
}
