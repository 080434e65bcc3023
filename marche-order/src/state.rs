//! Order lifecycle transitions.
//!
//! Each transition checks its legal source states, mutates the order in place
//! and returns the events it produced. Persistence and publishing are left to
//! the manager.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;
use marche_core::{PaymentEvent, PaymentStatus};
use marche_shared::OrderEventKind;
use crate::models::{FulfillmentStatus, Order, OrderRefund, OrderStatus, OrderType, ShippingCarrier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    ConfirmPayment(PaymentEvent),
    RegisterFulfillment,
    Complete,
    Refund,
    Cancel,
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transition::ConfirmPayment(event) => write!(f, "confirm_payment({:?})", event),
            Transition::RegisterFulfillment => f.write_str("register_fulfillment"),
            Transition::Complete => f.write_str("complete"),
            Transition::Refund => f.write_str("refund"),
            Transition::Cancel => f.write_str("cancel"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("Order {order_id} cannot {transition} while {current}")]
    InvalidOrderState {
        order_id: Uuid,
        transition: Transition,
        current: OrderStatus,
    },

    #[error("Order {order_id} has no fulfillment {fulfillment_id}")]
    FulfillmentNotFound { order_id: Uuid, fulfillment_id: Uuid },

    #[error("Fulfillment {fulfillment_id} of order {order_id} is already fulfilled")]
    FulfillmentAlreadyFulfilled { order_id: Uuid, fulfillment_id: Uuid },
}

/// Whether moving from `from` to `to` gives a consumed promotion use back.
pub fn releases_promotion(from: OrderStatus, to: OrderStatus) -> bool {
    let released = |status: OrderStatus| matches!(status, OrderStatus::Canceled | OrderStatus::Failed | OrderStatus::Refunded);
    !released(from) && released(to)
}

impl Order {
    fn invalid(&self, transition: Transition) -> TransitionError {
        TransitionError::InvalidOrderState {
            order_id: self.id,
            transition,
            current: self.status,
        }
    }

    /// Apply a payment gateway callback.
    pub fn apply_payment(
        &mut self,
        event: PaymentEvent,
        transaction_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEventKind>, TransitionError> {
        let transition = Transition::ConfirmPayment(event);
        let payment_status = self.payment.status;
        let legal = match event {
            PaymentEvent::Authorized => {
                payment_status == PaymentStatus::Unpaid && self.status == OrderStatus::Unpaid
            }
            PaymentEvent::Captured => {
                matches!(payment_status, PaymentStatus::Unpaid | PaymentStatus::Authorized)
                    && !matches!(
                        self.status,
                        OrderStatus::Canceled | OrderStatus::Refunded | OrderStatus::Failed
                    )
            }
            // Once preparation has started the order can only be refunded
            PaymentEvent::Failed | PaymentEvent::Canceled => {
                matches!(payment_status, PaymentStatus::Unpaid | PaymentStatus::Authorized)
                    && matches!(self.status, OrderStatus::Unpaid | OrderStatus::Waiting)
            }
        };
        if !legal {
            return Err(self.invalid(transition));
        }

        if transaction_id.is_some() {
            self.payment.transaction_id = transaction_id;
        }

        let events = match event {
            PaymentEvent::Authorized => {
                self.payment.status = PaymentStatus::Authorized;
                self.payment.authorized_at = Some(now);
                // Cash on delivery and deferred payment settle later; authorization is enough to ship
                let next = if self.payment.method.settles_after_delivery() {
                    OrderStatus::Preparing
                } else {
                    OrderStatus::Waiting
                };
                self.update_status(next);
                vec![OrderEventKind::PaymentAuthorized]
            }
            PaymentEvent::Captured => {
                self.payment.status = PaymentStatus::Paid;
                self.payment.paid_at = Some(now);
                if self.payment.authorized_at.is_none() {
                    self.payment.authorized_at = Some(now);
                }
                if matches!(self.status, OrderStatus::Unpaid | OrderStatus::Waiting) {
                    self.update_status(OrderStatus::Preparing);
                } else {
                    self.touch();
                }
                vec![OrderEventKind::PaymentCaptured { total: self.payment.total }]
            }
            PaymentEvent::Failed => {
                self.payment.status = PaymentStatus::Failed;
                if self.status == OrderStatus::Unpaid {
                    self.update_status(OrderStatus::Failed);
                    vec![OrderEventKind::PaymentFailed, OrderEventKind::Failed]
                } else {
                    self.update_status(OrderStatus::Canceled);
                    vec![OrderEventKind::PaymentFailed, OrderEventKind::Canceled]
                }
            }
            PaymentEvent::Canceled => {
                self.payment.status = PaymentStatus::Canceled;
                self.update_status(OrderStatus::Canceled);
                vec![OrderEventKind::Canceled]
            }
        };
        Ok(events)
    }

    /// Record the carrier's tracking number on one box. The order ships once
    /// every box has one.
    pub fn register_tracking(
        &mut self,
        fulfillment_id: Uuid,
        carrier: ShippingCarrier,
        tracking_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<OrderEventKind>, TransitionError> {
        if !matches!(self.status, OrderStatus::Preparing | OrderStatus::Shipped) {
            return Err(self.invalid(Transition::RegisterFulfillment));
        }

        let order_id = self.id;
        let fulfillment = self
            .fulfillments
            .iter_mut()
            .find(|f| f.id == fulfillment_id)
            .ok_or(TransitionError::FulfillmentNotFound { order_id, fulfillment_id })?;
        if fulfillment.is_fulfilled() {
            return Err(TransitionError::FulfillmentAlreadyFulfilled { order_id, fulfillment_id });
        }

        fulfillment.shipping_carrier = carrier;
        fulfillment.tracking_number = Some(tracking_number.to_string());
        fulfillment.status = FulfillmentStatus::Fulfilled;
        fulfillment.shipped_at = Some(now);

        let mut events = vec![OrderEventKind::FulfillmentRegistered {
            fulfillment_id,
            tracking_number: tracking_number.to_string(),
        }];
        if self.status == OrderStatus::Preparing && self.is_fully_fulfilled() {
            self.update_status(OrderStatus::Shipped);
            events.push(OrderEventKind::Shipped);
        } else {
            self.touch();
        }
        Ok(events)
    }

    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<OrderEventKind, TransitionError> {
        let ready = match self.order_type {
            OrderType::Product => self.status == OrderStatus::Shipped,
            // Experiences have nothing to ship
            OrderType::Experience => self.status == OrderStatus::Preparing,
        };
        if !ready {
            return Err(self.invalid(Transition::Complete));
        }

        self.completed_at = Some(now);
        self.update_status(OrderStatus::Completed);
        Ok(OrderEventKind::Completed)
    }

    /// Refund the whole order. An order holds at most one refund.
    pub fn refund(&mut self, description: &str, now: DateTime<Utc>) -> Result<OrderEventKind, TransitionError> {
        let refundable = matches!(
            self.status,
            OrderStatus::Preparing | OrderStatus::Shipped | OrderStatus::Completed
        );
        if !refundable || self.refund.is_some() {
            return Err(self.invalid(Transition::Refund));
        }

        let total = self.payment.total;
        self.refund = Some(OrderRefund {
            description: description.to_string(),
            total,
            refunded_at: now,
        });
        match self.payment.status {
            PaymentStatus::Paid => self.payment.status = PaymentStatus::Refunded,
            // Never captured, so nothing is left to collect
            PaymentStatus::Authorized => self.payment.status = PaymentStatus::Canceled,
            _ => {}
        }
        self.payment.refunded_at = Some(now);
        self.update_status(OrderStatus::Refunded);
        Ok(OrderEventKind::Refunded { total })
    }

    pub fn cancel(&mut self) -> Result<OrderEventKind, TransitionError> {
        if !matches!(self.status, OrderStatus::Unpaid | OrderStatus::Waiting) {
            return Err(self.invalid(Transition::Cancel));
        }

        self.payment.status = PaymentStatus::Canceled;
        self.update_status(OrderStatus::Canceled);
        Ok(OrderEventKind::Canceled)
    }
}
