use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use marche_core::{Address, PaymentEvent, PaymentMethod};
use crate::models::ShippingCarrier;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderLineRequest {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// Checkout submission for physical products.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlaceOrderRequest {
    pub user_id: Uuid,
    pub coordinator_id: Uuid,
    pub items: Vec<OrderLineRequest>,
    pub address: Address,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub shipping_message: Option<String>,
}

/// Checkout submission for an experience booking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceOrderRequest {
    pub user_id: Uuid,
    pub coordinator_id: Uuid,
    pub experience_id: Uuid,
    pub adult_count: u32,
    pub child_count: u32,
    pub scheduled_on: NaiveDate,
    pub payment_method: PaymentMethod,
    #[serde(default)]
    pub promotion_code: Option<String>,
    #[serde(default)]
    pub remarks: Option<String>,
}

/// Gateway callback for an order's payment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmPaymentRequest {
    pub event: PaymentEvent,
    #[serde(default)]
    pub transaction_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FulfillmentUpdateRequest {
    pub shipping_carrier: ShippingCarrier,
    pub tracking_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRequest {
    pub description: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CharacterEncoding {
    Utf8,
    /// UTF-8 with a byte order mark, for spreadsheet tools.
    Utf8Bom,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub shipping_carrier: ShippingCarrier,
    pub encoding: CharacterEncoding,
    #[serde(default)]
    pub coordinator_id: Option<Uuid>,
}
