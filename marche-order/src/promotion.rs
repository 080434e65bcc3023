use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;
use marche_catalog::{Discount, Promotion, PromotionStatus};
use crate::repository::{PromotionRepository, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IneligibleReason {
    OtherShop,
    UsageLimitReached,
}

impl std::fmt::Display for IneligibleReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IneligibleReason::OtherShop => f.write_str("not valid for this shop"),
            IneligibleReason::UsageLimitReached => f.write_str("usage limit reached"),
        }
    }
}

/// Looks up promotion codes and keeps usage counters in step with orders.
pub struct PromotionResolver {
    promotions: Arc<dyn PromotionRepository>,
}

impl PromotionResolver {
    pub fn new(promotions: Arc<dyn PromotionRepository>) -> Self {
        Self { promotions }
    }

    /// Resolve `code` for an order at `coordinator_id`'s shop.
    pub async fn resolve(
        &self,
        code: &str,
        coordinator_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Promotion, PromotionError> {
        let promotion = self
            .promotions
            .get_by_code(code)
            .await?
            .ok_or_else(|| PromotionError::NotFound(code.to_string()))?;

        Self::check(&promotion, coordinator_id, now)?;
        Ok(promotion)
    }

    fn check(promotion: &Promotion, coordinator_id: Uuid, now: DateTime<Utc>) -> Result<(), PromotionError> {
        match promotion.status(now) {
            // Private codes are not discoverable
            PromotionStatus::Private => return Err(PromotionError::NotFound(promotion.code.clone())),
            status @ (PromotionStatus::Waiting | PromotionStatus::Finished) => {
                return Err(PromotionError::Expired { code: promotion.code.clone(), status })
            }
            PromotionStatus::Enabled => {}
        }

        if !promotion.target.covers(coordinator_id) {
            return Err(PromotionError::Ineligible {
                code: promotion.code.clone(),
                reason: IneligibleReason::OtherShop,
            });
        }

        if !promotion.has_remaining_usage() {
            return Err(PromotionError::Ineligible {
                code: promotion.code.clone(),
                reason: IneligibleReason::UsageLimitReached,
            });
        }

        Ok(())
    }

    /// Count one use of `promotion`. Eligibility is re-checked atomically by
    /// the repository, so concurrent checkouts cannot exceed the limit.
    pub async fn consume(
        &self,
        promotion: &Promotion,
        discount: &Discount,
        now: DateTime<Utc>,
    ) -> Result<(), PromotionError> {
        if self.promotions.try_consume(promotion.id, discount.total(), now).await? {
            return Ok(());
        }

        // Lost a race; report why using the current state
        let current = self
            .promotions
            .get(promotion.id)
            .await?
            .ok_or_else(|| PromotionError::NotFound(promotion.code.clone()))?;
        match current.status(now) {
            PromotionStatus::Enabled => Err(PromotionError::Ineligible {
                code: current.code,
                reason: IneligibleReason::UsageLimitReached,
            }),
            PromotionStatus::Private => Err(PromotionError::NotFound(current.code)),
            status => Err(PromotionError::Expired { code: current.code, status }),
        }
    }

    pub async fn release(&self, promotion_id: Uuid, discount: &Discount) -> Result<(), PromotionError> {
        self.promotions.release(promotion_id, discount.total()).await?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromotionError {
    #[error("Promotion code not found: {0}")]
    NotFound(String),

    #[error("Promotion {code} is not active ({status:?})")]
    Expired { code: String, status: PromotionStatus },

    #[error("Promotion {code} cannot be applied: {reason}")]
    Ineligible { code: String, reason: IneligibleReason },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::InMemoryPromotionRepository;
    use chrono::Duration;
    use marche_catalog::{DiscountType, PromotionTarget};

    fn promotion(target: PromotionTarget) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: Uuid::new_v4(),
            title: "Winter".to_string(),
            code: "WINTER25".to_string(),
            public: true,
            target,
            discount_type: DiscountType::Rate,
            discount_value: 10,
            start_at: now - Duration::days(1),
            end_at: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            used_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    async fn resolver_with(promotion: &Promotion) -> PromotionResolver {
        let repo = Arc::new(InMemoryPromotionRepository::new());
        repo.save(promotion).await.unwrap();
        PromotionResolver::new(repo)
    }

    #[tokio::test]
    async fn test_resolves_enabled_code() {
        let shop = Uuid::new_v4();
        let promotion = promotion(PromotionTarget::Shop(shop));
        let resolver = resolver_with(&promotion).await;
        let resolved = resolver.resolve("WINTER25", shop, Utc::now()).await.unwrap();
        assert_eq!(resolved.id, promotion.id);
    }

    #[tokio::test]
    async fn test_unknown_and_private_codes_are_not_found() {
        let mut promotion = promotion(PromotionTarget::AllShop);
        promotion.public = false;
        let resolver = resolver_with(&promotion).await;

        let err = resolver.resolve("NOPE", Uuid::new_v4(), Utc::now()).await.unwrap_err();
        assert_eq!(err, PromotionError::NotFound("NOPE".to_string()));
        let err = resolver.resolve("WINTER25", Uuid::new_v4(), Utc::now()).await.unwrap_err();
        assert_eq!(err, PromotionError::NotFound("WINTER25".to_string()));
    }

    #[tokio::test]
    async fn test_outside_window_is_expired() {
        let promotion = promotion(PromotionTarget::AllShop);
        let resolver = resolver_with(&promotion).await;
        let later = Utc::now() + Duration::days(3);
        let err = resolver.resolve("WINTER25", Uuid::new_v4(), later).await.unwrap_err();
        assert_eq!(
            err,
            PromotionError::Expired { code: "WINTER25".to_string(), status: PromotionStatus::Finished }
        );
    }

    #[tokio::test]
    async fn test_other_shop_is_ineligible() {
        let promotion = promotion(PromotionTarget::Shop(Uuid::new_v4()));
        let resolver = resolver_with(&promotion).await;
        let err = resolver.resolve("WINTER25", Uuid::new_v4(), Utc::now()).await.unwrap_err();
        assert!(matches!(err, PromotionError::Ineligible { reason: IneligibleReason::OtherShop, .. }));
    }

    #[tokio::test]
    async fn test_consume_after_limit_reports_usage() {
        let mut promotion = promotion(PromotionTarget::AllShop);
        promotion.usage_limit = Some(1);
        let resolver = resolver_with(&promotion).await;
        let discount = Discount { merchandise: 100, shipping: 0 };

        resolver.consume(&promotion, &discount, Utc::now()).await.unwrap();
        let err = resolver.consume(&promotion, &discount, Utc::now()).await.unwrap_err();
        assert!(matches!(err, PromotionError::Ineligible { reason: IneligibleReason::UsageLimitReached, .. }));
    }
}
