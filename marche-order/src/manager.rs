use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;
use marche_catalog::{Discount, Product, Promotion};
use marche_shared::{OrderEvent, OrderEventKind};
use crate::fulfillment::{plan_fulfillments, FulfillmentError};
use crate::models::{Order, OrderExperience, OrderPayment, OrderType};
use crate::packer::{BoxPacker, PackItem, PackingError};
use crate::promotion::{PromotionError, PromotionResolver};
use crate::repository::{
    EventPublisher, OrderFilter, OrderRepository, ProductRepository, PromotionRelease, PromotionRepository,
    RepositoryError, ShippingRepository,
};
use crate::requests::{
    ConfirmPaymentRequest, ExperienceOrderRequest, FulfillmentUpdateRequest, PlaceOrderRequest, RefundRequest,
};
use crate::shipping_fee::{ShippingCalculator, ShippingError};
use crate::state::{releases_promotion, TransitionError};
use crate::validation::{
    validate_experience_order, validate_fulfillment_update, validate_place_order, validate_refund,
    ValidationErrors,
};

/// Engine-wide pricing rules.
#[derive(Debug, Clone, Copy, serde::Deserialize)]
pub struct SettlementRules {
    /// Consumption tax rate embedded in prices, in percent.
    pub tax_rate_percent: i64,
}

impl Default for SettlementRules {
    fn default() -> Self {
        Self { tax_rate_percent: 10 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input; fix the request and resubmit.
    Validation,
    /// Shop setup is broken; needs an operator.
    Configuration,
    /// Re-read the order and retry.
    StateConflict,
    Promotion,
    NotFound,
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum SettlementError {
    #[error(transparent)]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Packing(#[from] PackingError),

    #[error(transparent)]
    Shipping(#[from] ShippingError),

    #[error(transparent)]
    Promotion(#[from] PromotionError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Fulfillment(#[from] FulfillmentError),

    #[error("Order not found: {0}")]
    OrderNotFound(Uuid),

    #[error("Product {product_id} is not available from coordinator {coordinator_id}")]
    ProductUnavailable { product_id: Uuid, coordinator_id: Uuid },

    #[error("Experience {experience_id} is not available from coordinator {coordinator_id}")]
    ExperienceUnavailable { experience_id: Uuid, coordinator_id: Uuid },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

fn repository_kind(err: &RepositoryError) -> ErrorKind {
    match err {
        RepositoryError::ConcurrentModification { .. } => ErrorKind::StateConflict,
        RepositoryError::NotFound { .. } => ErrorKind::NotFound,
        RepositoryError::Duplicate { .. } | RepositoryError::Storage(_) => ErrorKind::Internal,
    }
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::Validation(_) | SettlementError::Packing(_) => ErrorKind::Validation,
            SettlementError::Shipping(_) => ErrorKind::Configuration,
            SettlementError::Promotion(PromotionError::Repository(inner)) => repository_kind(inner),
            SettlementError::Promotion(_) => ErrorKind::Promotion,
            SettlementError::Transition(TransitionError::FulfillmentNotFound { .. }) => ErrorKind::NotFound,
            SettlementError::Transition(_) => ErrorKind::StateConflict,
            SettlementError::Fulfillment(_) => ErrorKind::Internal,
            SettlementError::OrderNotFound(_)
            | SettlementError::ProductUnavailable { .. }
            | SettlementError::ExperienceUnavailable { .. } => ErrorKind::NotFound,
            SettlementError::Repository(inner) => repository_kind(inner),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::StateConflict
    }
}

/// Drives orders through checkout, payment, shipping and refunds.
///
/// Every mutation reads the order, applies one transition, and writes it back
/// with the version it read. A writer that lost a race gets
/// `ConcurrentModification` and nothing is applied.
pub struct OrderManager {
    orders: Arc<dyn OrderRepository>,
    products: Arc<dyn ProductRepository>,
    shippings: Arc<dyn ShippingRepository>,
    promotions: PromotionResolver,
    events: Arc<dyn EventPublisher>,
    rules: SettlementRules,
}

impl OrderManager {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        products: Arc<dyn ProductRepository>,
        shippings: Arc<dyn ShippingRepository>,
        promotions: Arc<dyn PromotionRepository>,
        events: Arc<dyn EventPublisher>,
        rules: SettlementRules,
    ) -> Self {
        Self {
            orders,
            products,
            shippings,
            promotions: PromotionResolver::new(promotions),
            events,
            rules,
        }
    }

    /// Check out physical products: pack, price, apply the promotion and
    /// create an unpaid order.
    pub async fn place_order(&self, request: PlaceOrderRequest) -> Result<Order, SettlementError> {
        validate_place_order(&request)?;
        let now = Utc::now();

        let ids: Vec<Uuid> = request.items.iter().map(|line| line.product_id).collect();
        let products: HashMap<Uuid, Product> = self
            .products
            .get_many(&ids)
            .await?
            .into_iter()
            .map(|product| (product.id, product))
            .collect();

        let mut pack_items = Vec::with_capacity(request.items.len());
        let mut subtotal = 0i64;
        for line in &request.items {
            let product = products
                .get(&line.product_id)
                .filter(|p| p.is_public && p.coordinator_id == request.coordinator_id)
                .ok_or(SettlementError::ProductUnavailable {
                    product_id: line.product_id,
                    coordinator_id: request.coordinator_id,
                })?;
            subtotal += product.price * line.quantity as i64;
            pack_items.push(PackItem {
                product_id: product.id,
                quantity: line.quantity,
                weights: product.box_weights,
                delivery_type: product.delivery_type,
            });
        }

        let boxes = BoxPacker::pack(&pack_items)?;

        let shipping = self
            .shippings
            .get_default(request.coordinator_id)
            .await?
            .ok_or(ShippingError::NotConfigured(request.coordinator_id))
            .map_err(|e| {
                error!("Shipping configuration missing: {}", e);
                e
            })?;
        let quote = ShippingCalculator::calculate(&boxes, request.address.prefecture, &shipping, subtotal)
            .map_err(|e| {
                error!("Shipping configuration error: {}", e);
                e
            })?;

        let promotion = match request.promotion_code.as_deref() {
            Some(code) => Some(self.promotions.resolve(code, request.coordinator_id, now).await?),
            None => None,
        };
        let discount = promotion
            .as_ref()
            .map(|p| p.discount(subtotal, quote.total))
            .unwrap_or_default();

        let payment = OrderPayment::new(
            request.payment_method,
            subtotal,
            quote.total,
            discount,
            self.rules.tax_rate_percent,
        );
        let mut order = Order::new(
            Uuid::new_v4(),
            request.user_id,
            request.coordinator_id,
            OrderType::Product,
            payment,
        );
        let plan = plan_fulfillments(order.id, &boxes, &quote, &products, &request.address)?;
        order.fulfillments = plan.fulfillments;
        order.items = plan.items;
        order.shipping_message = request.shipping_message;
        order.promotion_id = promotion.as_ref().map(|p| p.id);

        self.insert_with_promotion(&order, promotion.as_ref(), &discount, now).await?;

        info!(
            "Order {} placed: {} boxes, subtotal {}, shipping {}, total {}",
            order.id,
            boxes.len(),
            order.payment.subtotal,
            order.payment.shipping_fee,
            order.payment.total
        );
        self.publish(
            &order,
            vec![OrderEventKind::Placed {
                total: order.payment.total,
                promotion_id: order.promotion_id,
                box_count: order.fulfillments.len(),
            }],
        )
        .await;
        Ok(order)
    }

    /// Book an experience. Nothing is shipped, so there is no packing or
    /// shipping fee.
    pub async fn place_experience_order(&self, request: ExperienceOrderRequest) -> Result<Order, SettlementError> {
        validate_experience_order(&request)?;
        let now = Utc::now();

        let experience = self
            .products
            .get_experience(request.experience_id)
            .await?
            .filter(|e| e.is_public && e.coordinator_id == request.coordinator_id)
            .ok_or(SettlementError::ExperienceUnavailable {
                experience_id: request.experience_id,
                coordinator_id: request.coordinator_id,
            })?;

        let booking = OrderExperience {
            experience_id: experience.id,
            adult_count: request.adult_count,
            adult_price: experience.adult_price,
            child_count: request.child_count,
            child_price: experience.child_price,
            scheduled_on: request.scheduled_on,
            remarks: request.remarks,
        };
        let subtotal = booking.subtotal();

        let promotion = match request.promotion_code.as_deref() {
            Some(code) => Some(self.promotions.resolve(code, request.coordinator_id, now).await?),
            None => None,
        };
        let discount = promotion.as_ref().map(|p| p.discount(subtotal, 0)).unwrap_or_default();

        let payment = OrderPayment::new(request.payment_method, subtotal, 0, discount, self.rules.tax_rate_percent);
        let mut order = Order::new(
            Uuid::new_v4(),
            request.user_id,
            request.coordinator_id,
            OrderType::Experience,
            payment,
        );
        order.experience = Some(booking);
        order.promotion_id = promotion.as_ref().map(|p| p.id);

        self.insert_with_promotion(&order, promotion.as_ref(), &discount, now).await?;

        info!("Experience order {} placed for {}, total {}", order.id, request.scheduled_on, order.payment.total);
        self.publish(
            &order,
            vec![OrderEventKind::Placed {
                total: order.payment.total,
                promotion_id: order.promotion_id,
                box_count: 0,
            }],
        )
        .await;
        Ok(order)
    }

    /// Apply a payment gateway callback.
    pub async fn confirm_payment(
        &self,
        order_id: Uuid,
        request: ConfirmPaymentRequest,
    ) -> Result<Order, SettlementError> {
        let now = Utc::now();
        self.transition(order_id, |order| {
            order.apply_payment(request.event, request.transaction_id, now)
        })
        .await
    }

    /// Record a tracking number for one box.
    pub async fn register_fulfillment(
        &self,
        order_id: Uuid,
        fulfillment_id: Uuid,
        request: FulfillmentUpdateRequest,
    ) -> Result<Order, SettlementError> {
        validate_fulfillment_update(&request)?;
        let now = Utc::now();
        let tracking_number = request.tracking_number.trim().to_string();
        self.transition(order_id, |order| {
            order.register_tracking(fulfillment_id, request.shipping_carrier, &tracking_number, now)
        })
        .await
    }

    pub async fn complete_order(&self, order_id: Uuid) -> Result<Order, SettlementError> {
        let now = Utc::now();
        self.transition(order_id, |order| order.complete(now).map(|event| vec![event])).await
    }

    pub async fn refund_order(&self, order_id: Uuid, request: RefundRequest) -> Result<Order, SettlementError> {
        validate_refund(&request)?;
        let now = Utc::now();
        self.transition(order_id, |order| {
            order.refund(&request.description, now).map(|event| vec![event])
        })
        .await
    }

    pub async fn cancel_order(&self, order_id: Uuid) -> Result<Order, SettlementError> {
        self.transition(order_id, |order| order.cancel().map(|event| vec![event])).await
    }

    pub async fn get_order(&self, order_id: Uuid) -> Result<Order, SettlementError> {
        self.orders
            .get(order_id)
            .await?
            .ok_or(SettlementError::OrderNotFound(order_id))
    }

    pub async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<Order>, SettlementError> {
        Ok(self.orders.list(filter).await?)
    }

    async fn insert_with_promotion(
        &self,
        order: &Order,
        promotion: Option<&Promotion>,
        discount: &Discount,
        now: DateTime<Utc>,
    ) -> Result<(), SettlementError> {
        if let Some(promotion) = promotion {
            self.promotions.consume(promotion, discount, now).await?;
        }

        if let Err(e) = self.orders.insert(order).await {
            if let Some(promotion) = promotion {
                if let Err(release_err) = self.promotions.release(promotion.id, discount).await {
                    error!("Failed to release promotion {} after insert failure: {}", promotion.id, release_err);
                }
            }
            return Err(e.into());
        }
        Ok(())
    }

    async fn transition<F>(&self, order_id: Uuid, apply: F) -> Result<Order, SettlementError>
    where
        F: FnOnce(&mut Order) -> Result<Vec<OrderEventKind>, TransitionError>,
    {
        let mut order = self.get_order(order_id).await?;
        let expected_version = order.version;
        let before = order.status;

        let events = apply(&mut order).map_err(|e| {
            warn!("Rejected transition on order {}: {}", order_id, e);
            e
        })?;

        let release = order
            .promotion_id
            .filter(|_| releases_promotion(before, order.status))
            .map(|promotion_id| PromotionRelease {
                promotion_id,
                amount: order.payment.applied_discount().total(),
            });

        order.version = self
            .orders
            .update(&order, expected_version, release.as_ref())
            .await
            .map_err(|e| {
                match &e {
                    RepositoryError::ConcurrentModification { .. } => {
                        warn!("Order {} changed underneath us: {}", order_id, e)
                    }
                    _ => error!("Failed to persist order {}: {}", order_id, e),
                }
                e
            })?;

        info!(order_id = %order.id, from = %before, to = %order.status, version = order.version, "Order updated");
        if let Some(release) = &release {
            info!("Released promotion {} from order {}", release.promotion_id, order.id);
        }

        self.publish(&order, events).await;
        Ok(order)
    }

    /// Publishing happens after the write; a failed publish is logged and
    /// does not undo the change.
    async fn publish(&self, order: &Order, kinds: Vec<OrderEventKind>) {
        for kind in kinds {
            let event = OrderEvent::new(order.id, order.coordinator_id, order.version, kind);
            if let Err(e) = self.events.publish(&event).await {
                warn!("Failed to publish {} for order {}: {}", event.topic(), order.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marche_catalog::PromotionStatus;

    #[test]
    fn test_error_kinds() {
        let conflict = SettlementError::Repository(RepositoryError::ConcurrentModification {
            order_id: Uuid::nil(),
            expected: 1,
            actual: 2,
        });
        assert_eq!(conflict.kind(), ErrorKind::StateConflict);
        assert!(conflict.is_retryable());

        let missing_rate = SettlementError::Shipping(ShippingError::NotConfigured(Uuid::nil()));
        assert_eq!(missing_rate.kind(), ErrorKind::Configuration);
        assert!(!missing_rate.is_retryable());

        let expired = SettlementError::Promotion(PromotionError::Expired {
            code: "SPRING".to_string(),
            status: PromotionStatus::Finished,
        });
        assert_eq!(expired.kind(), ErrorKind::Promotion);

        let promo_storage = SettlementError::Promotion(PromotionError::Repository(RepositoryError::Storage(
            "connection reset".to_string(),
        )));
        assert_eq!(promo_storage.kind(), ErrorKind::Internal);

        let fulfillment = SettlementError::Transition(TransitionError::FulfillmentNotFound {
            order_id: Uuid::nil(),
            fulfillment_id: Uuid::nil(),
        });
        assert_eq!(fulfillment.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_default_rules() {
        assert_eq!(SettlementRules::default().tax_rate_percent, 10);
    }
}
