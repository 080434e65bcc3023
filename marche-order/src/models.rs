use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use marche_catalog::{BoxSize, DeliveryType, Discount};
use marche_core::{Address, CoreError, PaymentMethod, PaymentStatus};

/// Persisted enums are stored by their serde name; this keeps `as_str` and
/// `FromStr` in step with the serde attributes.
macro_rules! persisted_enum {
    ($name:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = CoreError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::UnknownVariant { kind: $kind, value: other.to_string() }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderType {
    Product,
    Experience,
}

persisted_enum!(OrderType, "order type", {
    Product => "PRODUCT",
    Experience => "EXPERIENCE",
});

/// Order status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Unpaid,
    Waiting,
    Preparing,
    Shipped,
    Completed,
    Canceled,
    Refunded,
    Failed,
}

persisted_enum!(OrderStatus, "order status", {
    Unpaid => "UNPAID",
    Waiting => "WAITING",
    Preparing => "PREPARING",
    Shipped => "SHIPPED",
    Completed => "COMPLETED",
    Canceled => "CANCELED",
    Refunded => "REFUNDED",
    Failed => "FAILED",
});

impl OrderStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            OrderStatus::Completed | OrderStatus::Canceled | OrderStatus::Refunded | OrderStatus::Failed
        )
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FulfillmentStatus {
    Unfulfilled,
    Fulfilled,
}

persisted_enum!(FulfillmentStatus, "fulfillment status", {
    Unfulfilled => "UNFULFILLED",
    Fulfilled => "FULFILLED",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingCarrier {
    Unknown,
    Yamato,
    Sagawa,
    JapanPost,
}

persisted_enum!(ShippingCarrier, "shipping carrier", {
    Unknown => "UNKNOWN",
    Yamato => "YAMATO",
    Sagawa => "SAGAWA",
    JapanPost => "JAPAN_POST",
});

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShippingMethod {
    None,
    Standard,
    Pickup,
}

persisted_enum!(ShippingMethod, "shipping method", {
    None => "NONE",
    Standard => "STANDARD",
    Pickup => "PICKUP",
});

/// Money owed on an order, all amounts tax-inclusive minor units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderPayment {
    pub transaction_id: Option<String>,
    pub method: PaymentMethod,
    pub status: PaymentStatus,
    pub subtotal: i64,
    pub discount: i64,
    pub shipping_fee: i64,
    pub shipping_discount: i64,
    /// Consumption tax embedded in `total`.
    pub tax: i64,
    pub total: i64,
    pub authorized_at: Option<DateTime<Utc>>,
    pub paid_at: Option<DateTime<Utc>>,
    pub refunded_at: Option<DateTime<Utc>>,
}

impl OrderPayment {
    pub fn new(method: PaymentMethod, subtotal: i64, shipping_fee: i64, discount: Discount, tax_rate_percent: i64) -> Self {
        let total = (subtotal - discount.merchandise + shipping_fee - discount.shipping).max(0);
        Self {
            transaction_id: None,
            method,
            status: PaymentStatus::Unpaid,
            subtotal,
            discount: discount.merchandise,
            shipping_fee,
            shipping_discount: discount.shipping,
            tax: embedded_tax(total, tax_rate_percent),
            total,
            authorized_at: None,
            paid_at: None,
            refunded_at: None,
        }
    }

    pub fn applied_discount(&self) -> Discount {
        Discount {
            merchandise: self.discount,
            shipping: self.shipping_discount,
        }
    }
}

/// Tax contained in a tax-inclusive amount, rounded down.
pub fn embedded_tax(amount: i64, rate_percent: i64) -> i64 {
    if rate_percent <= 0 {
        return 0;
    }
    amount * rate_percent / (100 + rate_percent)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderRefund {
    pub description: String,
    pub total: i64,
    pub refunded_at: DateTime<Utc>,
}

/// One physical parcel of an order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderFulfillment {
    pub id: Uuid,
    pub order_id: Uuid,
    pub box_number: u32,
    pub box_size: BoxSize,
    pub box_rate: u8,
    pub delivery_type: DeliveryType,
    pub status: FulfillmentStatus,
    pub shipping_carrier: ShippingCarrier,
    pub tracking_number: Option<String>,
    pub shipping_method: ShippingMethod,
    pub shipping_fee: i64,
    pub shipped_at: Option<DateTime<Utc>>,
    pub address: Address,
}

impl OrderFulfillment {
    pub fn is_fulfilled(&self) -> bool {
        self.status == FulfillmentStatus::Fulfilled
    }
}

/// Line item. Price is a snapshot taken at checkout.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub fulfillment_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub price: i64,
    pub quantity: u32,
}

impl OrderItem {
    pub fn amount(&self) -> i64 {
        self.price * self.quantity as i64
    }
}

/// Booking detail for experience orders.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderExperience {
    pub experience_id: Uuid,
    pub adult_count: u32,
    pub adult_price: i64,
    pub child_count: u32,
    pub child_price: i64,
    pub scheduled_on: NaiveDate,
    pub remarks: Option<String>,
}

impl OrderExperience {
    pub fn participants(&self) -> u32 {
        self.adult_count + self.child_count
    }

    pub fn subtotal(&self) -> i64 {
        self.adult_price * self.adult_count as i64 + self.child_price * self.child_count as i64
    }
}

/// The single source of truth for a buyer's purchase
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub coordinator_id: Uuid,
    pub promotion_id: Option<Uuid>,
    pub order_type: OrderType,
    pub status: OrderStatus,
    pub payment: OrderPayment,
    pub refund: Option<OrderRefund>,
    pub fulfillments: Vec<OrderFulfillment>,
    pub items: Vec<OrderItem>,
    pub experience: Option<OrderExperience>,
    pub shipping_message: Option<String>,
    /// Incremented on every persisted change; used for optimistic locking.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Order {
    pub fn new(id: Uuid, user_id: Uuid, coordinator_id: Uuid, order_type: OrderType, payment: OrderPayment) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id,
            coordinator_id,
            promotion_id: None,
            order_type,
            status: OrderStatus::Unpaid,
            payment,
            refund: None,
            fulfillments: Vec::new(),
            items: Vec::new(),
            experience: None,
            shipping_message: None,
            version: 0,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Merchandise total of the line items (or experience participants).
    pub fn subtotal(&self) -> i64 {
        match &self.experience {
            Some(experience) => experience.subtotal(),
            None => self.items.iter().map(OrderItem::amount).sum(),
        }
    }

    pub fn is_fully_fulfilled(&self) -> bool {
        self.fulfillments.iter().all(OrderFulfillment::is_fulfilled)
    }

    pub fn fulfillment(&self, fulfillment_id: Uuid) -> Option<&OrderFulfillment> {
        self.fulfillments.iter().find(|f| f.id == fulfillment_id)
    }

    pub fn items_in(&self, fulfillment_id: Uuid) -> impl Iterator<Item = &OrderItem> {
        self.items.iter().filter(move |item| item.fulfillment_id == fulfillment_id)
    }

    /// Product orders carry items, experience orders carry a booking; never both.
    pub fn check_shape(&self) -> bool {
        match self.order_type {
            OrderType::Product => !self.items.is_empty() && self.experience.is_none(),
            OrderType::Experience => {
                self.experience.is_some() && self.items.is_empty() && self.fulfillments.is_empty()
            }
        }
    }

    pub fn update_status(&mut self, new_status: OrderStatus) {
        self.status = new_status;
        self.touch();
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
