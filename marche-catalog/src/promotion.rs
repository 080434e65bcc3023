use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use marche_core::CoreError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionStatus {
    Private,
    Waiting,
    Enabled,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", tag = "scope", content = "coordinator_id")]
pub enum PromotionTarget {
    AllShop,
    Shop(Uuid),
}

impl PromotionTarget {
    pub fn covers(&self, coordinator_id: Uuid) -> bool {
        match self {
            PromotionTarget::AllShop => true,
            PromotionTarget::Shop(id) => *id == coordinator_id,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscountType {
    /// Flat subtraction from the merchandise subtotal.
    Amount,
    /// Percentage of the merchandise subtotal.
    Rate,
    FreeShipping,
}

impl DiscountType {
    pub fn as_str(self) -> &'static str {
        match self {
            DiscountType::Amount => "AMOUNT",
            DiscountType::Rate => "RATE",
            DiscountType::FreeShipping => "FREE_SHIPPING",
        }
    }
}

impl FromStr for DiscountType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AMOUNT" => Ok(DiscountType::Amount),
            "RATE" => Ok(DiscountType::Rate),
            "FREE_SHIPPING" => Ok(DiscountType::FreeShipping),
            other => Err(CoreError::UnknownVariant {
                kind: "discount type",
                value: other.to_string(),
            }),
        }
    }
}

/// Amounts a promotion takes off an order.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Discount {
    pub merchandise: i64,
    pub shipping: i64,
}

impl Discount {
    pub fn total(&self) -> i64 {
        self.merchandise + self.shipping
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
    pub id: Uuid,
    pub title: String,
    pub code: String,
    pub public: bool,
    pub target: PromotionTarget,
    pub discount_type: DiscountType,
    pub discount_value: i64,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub usage_limit: Option<i64>,
    pub used_count: i64,
    pub used_amount: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Promotion {
    /// Status at `now`. The window is inclusive on both ends.
    pub fn status(&self, now: DateTime<Utc>) -> PromotionStatus {
        if !self.public {
            PromotionStatus::Private
        } else if now < self.start_at {
            PromotionStatus::Waiting
        } else if now > self.end_at {
            PromotionStatus::Finished
        } else {
            PromotionStatus::Enabled
        }
    }

    pub fn has_remaining_usage(&self) -> bool {
        self.usage_limit.map_or(true, |limit| self.used_count < limit)
    }

    /// Discount applied to an order with the given merchandise subtotal and
    /// provisional shipping fee.
    pub fn discount(&self, subtotal: i64, shipping_fee: i64) -> Discount {
        match self.discount_type {
            DiscountType::Amount => Discount {
                merchandise: self.discount_value.clamp(0, subtotal.max(0)),
                shipping: 0,
            },
            DiscountType::Rate => Discount {
                merchandise: subtotal.max(0) * self.discount_value.clamp(0, 100) / 100,
                shipping: 0,
            },
            DiscountType::FreeShipping => Discount {
                merchandise: 0,
                shipping: shipping_fee.max(0),
            },
        }
    }

    pub fn validate(&self) -> Result<(), PromotionConfigError> {
        let code_ok = (4..=32).contains(&self.code.len())
            && self.code.chars().all(|c| c.is_ascii_alphanumeric());
        if !code_ok {
            return Err(PromotionConfigError::InvalidCode(self.code.clone()));
        }
        if self.start_at >= self.end_at {
            return Err(PromotionConfigError::InvalidWindow);
        }
        match self.discount_type {
            DiscountType::Amount if self.discount_value <= 0 => {
                Err(PromotionConfigError::InvalidValue(self.discount_value))
            }
            DiscountType::Rate if !(1..=100).contains(&self.discount_value) => {
                Err(PromotionConfigError::InvalidValue(self.discount_value))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PromotionConfigError {
    #[error("Promotion code must be 4-32 alphanumeric characters: {0:?}")]
    InvalidCode(String),
    #[error("Promotion must start before it ends")]
    InvalidWindow,
    #[error("Invalid discount value: {0}")]
    InvalidValue(i64),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rstest::rstest;

    fn promotion(discount_type: DiscountType, discount_value: i64) -> Promotion {
        let now = Utc::now();
        Promotion {
            id: Uuid::new_v4(),
            title: "Autumn sale".to_string(),
            code: "AUTUMN24".to_string(),
            public: true,
            target: PromotionTarget::AllShop,
            discount_type,
            discount_value,
            start_at: now - Duration::days(1),
            end_at: now + Duration::days(1),
            usage_limit: None,
            used_count: 0,
            used_amount: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_status_follows_window() {
        let promotion = promotion(DiscountType::Amount, 500);
        let now = Utc::now();
        assert_eq!(promotion.status(now), PromotionStatus::Enabled);
        assert_eq!(promotion.status(now - Duration::days(2)), PromotionStatus::Waiting);
        assert_eq!(promotion.status(now + Duration::days(2)), PromotionStatus::Finished);
        assert_eq!(promotion.status(promotion.end_at), PromotionStatus::Enabled);

        let mut hidden = promotion.clone();
        hidden.public = false;
        assert_eq!(hidden.status(now), PromotionStatus::Private);
    }

    #[rstest]
    #[case(DiscountType::Amount, 500, 3000, 800, Discount { merchandise: 500, shipping: 0 })]
    #[case(DiscountType::Amount, 5000, 3000, 800, Discount { merchandise: 3000, shipping: 0 })]
    #[case(DiscountType::Rate, 15, 3333, 800, Discount { merchandise: 499, shipping: 0 })]
    #[case(DiscountType::Rate, 100, 3000, 800, Discount { merchandise: 3000, shipping: 0 })]
    #[case(DiscountType::FreeShipping, 0, 3000, 800, Discount { merchandise: 0, shipping: 800 })]
    fn test_discount(
        #[case] discount_type: DiscountType,
        #[case] value: i64,
        #[case] subtotal: i64,
        #[case] shipping_fee: i64,
        #[case] expected: Discount,
    ) {
        assert_eq!(promotion(discount_type, value).discount(subtotal, shipping_fee), expected);
    }

    #[test]
    fn test_usage_limit() {
        let mut promotion = promotion(DiscountType::Amount, 500);
        assert!(promotion.has_remaining_usage());
        promotion.usage_limit = Some(1);
        assert!(promotion.has_remaining_usage());
        promotion.used_count = 1;
        assert!(!promotion.has_remaining_usage());
    }

    #[test]
    fn test_target_scope() {
        let shop = Uuid::new_v4();
        assert!(PromotionTarget::AllShop.covers(shop));
        assert!(PromotionTarget::Shop(shop).covers(shop));
        assert!(!PromotionTarget::Shop(shop).covers(Uuid::new_v4()));
    }

    #[test]
    fn test_validate() {
        assert!(promotion(DiscountType::Rate, 10).validate().is_ok());
        assert_eq!(
            promotion(DiscountType::Rate, 150).validate(),
            Err(PromotionConfigError::InvalidValue(150))
        );
        let mut bad_code = promotion(DiscountType::Amount, 100);
        bad_code.code = "no spaces".to_string();
        assert!(matches!(bad_code.validate(), Err(PromotionConfigError::InvalidCode(_))));
    }
}
