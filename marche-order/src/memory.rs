//! In-memory repositories. Used by tests and by tooling that runs without a
//! database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use marche_catalog::{Experience, Product, Promotion, PromotionStatus, Shipping};
use marche_shared::OrderEvent;
use crate::models::Order;
use crate::repository::{
    EventPublisher, OrderFilter, OrderRepository, ProductRepository, PromotionRelease, PromotionRepository,
    RepositoryError, ShippingRepository,
};

/// Orders keyed by id. Promotion releases that ride along with an update
/// need the promotion store attached via `with_promotions`.
#[derive(Default)]
pub struct InMemoryOrderRepository {
    orders: RwLock<HashMap<Uuid, Order>>,
    promotions: Option<Arc<InMemoryPromotionRepository>>,
}

impl InMemoryOrderRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_promotions(promotions: Arc<InMemoryPromotionRepository>) -> Self {
        Self {
            orders: RwLock::default(),
            promotions: Some(promotions),
        }
    }
}

#[async_trait]
impl OrderRepository for InMemoryOrderRepository {
    async fn insert(&self, order: &Order) -> Result<(), RepositoryError> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id) {
            return Err(RepositoryError::Duplicate { entity: "order", id: order.id.to_string() });
        }
        orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Order>, RepositoryError> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn update(
        &self,
        order: &Order,
        expected_version: i64,
        release: Option<&PromotionRelease>,
    ) -> Result<i64, RepositoryError> {
        let mut orders = self.orders.write().await;
        let stored = orders.get_mut(&order.id).ok_or_else(|| RepositoryError::NotFound {
            entity: "order",
            id: order.id.to_string(),
        })?;

        if stored.version != expected_version {
            return Err(RepositoryError::ConcurrentModification {
                order_id: order.id,
                expected: expected_version,
                actual: stored.version,
            });
        }

        // Both locks are held, so the release and the order write land together
        if let Some(release) = release {
            let store = self
                .promotions
                .as_ref()
                .ok_or_else(|| RepositoryError::Storage("no promotion store attached".to_string()))?;
            let mut promotions = store.promotions.lock().await;
            release_usage(&mut promotions, release.promotion_id, release.amount)?;
        }

        let mut next = order.clone();
        next.version = expected_version + 1;
        *stored = next;
        Ok(expected_version + 1)
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Vec<Order>, RepositoryError> {
        let mut orders: Vec<Order> = self
            .orders
            .read()
            .await
            .values()
            .filter(|order| filter.matches(order))
            .cloned()
            .collect();
        orders.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(orders)
    }
}

#[derive(Default)]
pub struct InMemoryProductRepository {
    products: RwLock<HashMap<Uuid, Product>>,
    experiences: RwLock<HashMap<Uuid, Experience>>,
}

impl InMemoryProductRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, product: Product) {
        self.products.write().await.insert(product.id, product);
    }

    pub async fn insert_experience(&self, experience: Experience) {
        self.experiences.write().await.insert(experience.id, experience);
    }
}

#[async_trait]
impl ProductRepository for InMemoryProductRepository {
    async fn get_many(&self, ids: &[Uuid]) -> Result<Vec<Product>, RepositoryError> {
        let products = self.products.read().await;
        Ok(ids.iter().filter_map(|id| products.get(id).cloned()).collect())
    }

    async fn get_experience(&self, id: Uuid) -> Result<Option<Experience>, RepositoryError> {
        Ok(self.experiences.read().await.get(&id).cloned())
    }
}

#[derive(Default)]
pub struct InMemoryShippingRepository {
    shippings: RwLock<HashMap<Uuid, Shipping>>,
}

impl InMemoryShippingRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShippingRepository for InMemoryShippingRepository {
    async fn get_default(&self, coordinator_id: Uuid) -> Result<Option<Shipping>, RepositoryError> {
        Ok(self
            .shippings
            .read()
            .await
            .values()
            .find(|s| s.coordinator_id == coordinator_id && s.is_default)
            .cloned())
    }

    async fn list(&self, coordinator_id: Uuid) -> Result<Vec<Shipping>, RepositoryError> {
        let mut shippings: Vec<Shipping> = self
            .shippings
            .read()
            .await
            .values()
            .filter(|s| s.coordinator_id == coordinator_id)
            .cloned()
            .collect();
        shippings.sort_by_key(|s| s.created_at);
        Ok(shippings)
    }

    async fn save(&self, shipping: &Shipping) -> Result<(), RepositoryError> {
        let mut shippings = self.shippings.write().await;
        if shipping.is_default {
            for other in shippings.values_mut() {
                if other.coordinator_id == shipping.coordinator_id && other.id != shipping.id {
                    other.is_default = false;
                }
            }
        }
        shippings.insert(shipping.id, shipping.clone());
        Ok(())
    }
}

/// Promotions behind a single mutex so that check-and-increment is atomic.
#[derive(Default)]
pub struct InMemoryPromotionRepository {
    promotions: Mutex<HashMap<Uuid, Promotion>>,
}

impl InMemoryPromotionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn remove(&self, id: Uuid) -> Option<Promotion> {
        self.promotions.lock().await.remove(&id)
    }
}

fn release_usage(promotions: &mut HashMap<Uuid, Promotion>, id: Uuid, amount: i64) -> Result<(), RepositoryError> {
    let promotion = promotions.get_mut(&id).ok_or_else(|| RepositoryError::NotFound {
        entity: "promotion",
        id: id.to_string(),
    })?;
    promotion.used_count = (promotion.used_count - 1).max(0);
    promotion.used_amount = (promotion.used_amount - amount).max(0);
    promotion.updated_at = Utc::now();
    Ok(())
}

#[async_trait]
impl PromotionRepository for InMemoryPromotionRepository {
    async fn get(&self, id: Uuid) -> Result<Option<Promotion>, RepositoryError> {
        Ok(self.promotions.lock().await.get(&id).cloned())
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<Promotion>, RepositoryError> {
        Ok(self.promotions.lock().await.values().find(|p| p.code == code).cloned())
    }

    async fn save(&self, promotion: &Promotion) -> Result<(), RepositoryError> {
        let mut promotions = self.promotions.lock().await;
        if promotions.values().any(|p| p.code == promotion.code && p.id != promotion.id) {
            return Err(RepositoryError::Duplicate { entity: "promotion code", id: promotion.code.clone() });
        }
        promotions.insert(promotion.id, promotion.clone());
        Ok(())
    }

    async fn try_consume(&self, id: Uuid, amount: i64, now: DateTime<Utc>) -> Result<bool, RepositoryError> {
        let mut promotions = self.promotions.lock().await;
        let promotion = promotions.get_mut(&id).ok_or_else(|| RepositoryError::NotFound {
            entity: "promotion",
            id: id.to_string(),
        })?;

        if promotion.status(now) != PromotionStatus::Enabled || !promotion.has_remaining_usage() {
            return Ok(false);
        }

        promotion.used_count += 1;
        promotion.used_amount += amount;
        promotion.updated_at = now;
        Ok(true)
    }

    async fn release(&self, id: Uuid, amount: i64) -> Result<(), RepositoryError> {
        release_usage(&mut *self.promotions.lock().await, id, amount)
    }
}

/// Keeps every published event; handy for asserting on emitted events.
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<OrderEvent>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<OrderEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, event: &OrderEvent) -> Result<(), RepositoryError> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OrderPayment, OrderType};
    use marche_catalog::{Discount, DiscountType, PromotionTarget};
    use marche_core::PaymentMethod;

    fn order() -> Order {
        let payment = OrderPayment::new(PaymentMethod::CreditCard, 1000, 0, Discount::default(), 10);
        Order::new(Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4(), OrderType::Product, payment)
    }

    #[tokio::test]
    async fn test_update_checks_version() {
        let repo = InMemoryOrderRepository::new();
        let order = order();
        repo.insert(&order).await.unwrap();

        let version = repo.update(&order, 0, None).await.unwrap();
        assert_eq!(version, 1);

        // A writer still holding version 0 loses
        let err = repo.update(&order, 0, None).await.unwrap_err();
        assert_eq!(
            err,
            RepositoryError::ConcurrentModification { order_id: order.id, expected: 0, actual: 1 }
        );
    }

    fn launch_promotion() -> Promotion {
        let now = Utc::now();
        Promotion {
            id: Uuid::new_v4(),
            title: "Launch".to_string(),
            code: "LAUNCH".to_string(),
            public: true,
            target: PromotionTarget::AllShop,
            discount_type: DiscountType::Amount,
            discount_value: 300,
            start_at: now - chrono::Duration::hours(1),
            end_at: now + chrono::Duration::hours(1),
            usage_limit: Some(1),
            used_count: 0,
            used_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_try_consume_respects_limit() {
        let repo = InMemoryPromotionRepository::new();
        let now = Utc::now();
        let promotion = launch_promotion();
        repo.save(&promotion).await.unwrap();

        assert!(repo.try_consume(promotion.id, 300, now).await.unwrap());
        assert!(!repo.try_consume(promotion.id, 300, now).await.unwrap());

        repo.release(promotion.id, 300).await.unwrap();
        let stored = repo.get(promotion.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 0);
        assert_eq!(stored.used_amount, 0);
    }

    #[tokio::test]
    async fn test_update_releases_promotion_with_order() {
        let promotions = Arc::new(InMemoryPromotionRepository::new());
        let promotion = launch_promotion();
        promotions.save(&promotion).await.unwrap();
        assert!(promotions.try_consume(promotion.id, 300, Utc::now()).await.unwrap());

        let repo = InMemoryOrderRepository::with_promotions(promotions.clone());
        let order = order();
        repo.insert(&order).await.unwrap();

        let release = PromotionRelease { promotion_id: promotion.id, amount: 300 };
        assert_eq!(repo.update(&order, 0, Some(&release)).await.unwrap(), 1);

        let stored = promotions.get(promotion.id).await.unwrap().unwrap();
        assert_eq!(stored.used_count, 0);
        assert_eq!(stored.used_amount, 0);
    }

    #[tokio::test]
    async fn test_failed_release_leaves_order_untouched() {
        let promotions = Arc::new(InMemoryPromotionRepository::new());
        let repo = InMemoryOrderRepository::with_promotions(promotions);
        let order = order();
        repo.insert(&order).await.unwrap();

        let mut changed = order.clone();
        changed.shipping_message = Some("Leave at the door".to_string());
        let release = PromotionRelease { promotion_id: Uuid::new_v4(), amount: 300 };
        let err = repo.update(&changed, 0, Some(&release)).await.unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound { entity: "promotion", .. }));

        let stored = repo.get(order.id).await.unwrap().unwrap();
        assert_eq!(stored.version, 0);
        assert!(stored.shipping_message.is_none());
    }
}
