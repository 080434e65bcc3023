use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::CoreError;

/// Payment method chosen at checkout.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentMethod {
    CashOnDelivery,
    CreditCard,
    Konbini,
    BankTransfer,
    PayPay,
    LinePay,
    MerPay,
    RakutenPay,
    AuPay,
    /// Buy-now-pay-later; the buyer is invoiced after delivery.
    Deferred,
    None,
}

impl PaymentMethod {
    /// Methods where an authorization is enough to start preparing the
    /// shipment, because money only moves after delivery.
    pub fn settles_after_delivery(self) -> bool {
        matches!(self, PaymentMethod::CashOnDelivery | PaymentMethod::Deferred)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentMethod::CashOnDelivery => "CASH_ON_DELIVERY",
            PaymentMethod::CreditCard => "CREDIT_CARD",
            PaymentMethod::Konbini => "KONBINI",
            PaymentMethod::BankTransfer => "BANK_TRANSFER",
            PaymentMethod::PayPay => "PAY_PAY",
            PaymentMethod::LinePay => "LINE_PAY",
            PaymentMethod::MerPay => "MER_PAY",
            PaymentMethod::RakutenPay => "RAKUTEN_PAY",
            PaymentMethod::AuPay => "AU_PAY",
            PaymentMethod::Deferred => "DEFERRED",
            PaymentMethod::None => "NONE",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let method = match s {
            "CASH_ON_DELIVERY" => PaymentMethod::CashOnDelivery,
            "CREDIT_CARD" => PaymentMethod::CreditCard,
            "KONBINI" => PaymentMethod::Konbini,
            "BANK_TRANSFER" => PaymentMethod::BankTransfer,
            "PAY_PAY" => PaymentMethod::PayPay,
            "LINE_PAY" => PaymentMethod::LinePay,
            "MER_PAY" => PaymentMethod::MerPay,
            "RAKUTEN_PAY" => PaymentMethod::RakutenPay,
            "AU_PAY" => PaymentMethod::AuPay,
            "DEFERRED" => PaymentMethod::Deferred,
            "NONE" => PaymentMethod::None,
            other => {
                return Err(CoreError::UnknownVariant {
                    kind: "payment method",
                    value: other.to_string(),
                })
            }
        };
        Ok(method)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Unpaid,
    Authorized,
    Paid,
    Canceled,
    Failed,
    Refunded,
}

impl PaymentStatus {
    /// Statuses from which the gateway may still move the payment.
    pub fn is_open(self) -> bool {
        matches!(self, PaymentStatus::Unpaid | PaymentStatus::Authorized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PaymentStatus::Unpaid => "UNPAID",
            PaymentStatus::Authorized => "AUTHORIZED",
            PaymentStatus::Paid => "PAID",
            PaymentStatus::Canceled => "CANCELED",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        }
    }
}

impl FromStr for PaymentStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let status = match s {
            "UNPAID" => PaymentStatus::Unpaid,
            "AUTHORIZED" => PaymentStatus::Authorized,
            "PAID" => PaymentStatus::Paid,
            "CANCELED" => PaymentStatus::Canceled,
            "FAILED" => PaymentStatus::Failed,
            "REFUNDED" => PaymentStatus::Refunded,
            other => {
                return Err(CoreError::UnknownVariant {
                    kind: "payment status",
                    value: other.to_string(),
                })
            }
        };
        Ok(status)
    }
}

/// Callback kinds delivered by the payment gateway.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEvent {
    Authorized,
    Captured,
    Failed,
    Canceled,
}
