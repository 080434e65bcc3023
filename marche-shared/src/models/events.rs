use uuid::Uuid;

/// Domain event emitted after an order mutation has been persisted.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct OrderEvent {
    pub order_id: Uuid,
    pub coordinator_id: Uuid,
    pub version: i64,
    pub kind: OrderEventKind,
    pub timestamp: i64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderEventKind {
    Placed {
        total: i64,
        promotion_id: Option<Uuid>,
        box_count: usize,
    },
    PaymentAuthorized,
    PaymentCaptured {
        total: i64,
    },
    PaymentFailed,
    FulfillmentRegistered {
        fulfillment_id: Uuid,
        tracking_number: String,
    },
    Shipped,
    Completed,
    Refunded {
        total: i64,
    },
    Canceled,
    Failed,
}

impl OrderEvent {
    pub fn new(order_id: Uuid, coordinator_id: Uuid, version: i64, kind: OrderEventKind) -> Self {
        Self {
            order_id,
            coordinator_id,
            version,
            kind,
            timestamp: chrono::Utc::now().timestamp(),
        }
    }

    /// Topic name used by publishers that route events by kind.
    pub fn topic(&self) -> &'static str {
        match self.kind {
            OrderEventKind::Placed { .. } => "order.placed",
            OrderEventKind::PaymentAuthorized => "order.payment_authorized",
            OrderEventKind::PaymentCaptured { .. } => "order.payment_captured",
            OrderEventKind::PaymentFailed => "order.payment_failed",
            OrderEventKind::FulfillmentRegistered { .. } => "order.fulfillment_registered",
            OrderEventKind::Shipped => "order.shipped",
            OrderEventKind::Completed => "order.completed",
            OrderEventKind::Refunded { .. } => "order.refunded",
            OrderEventKind::Canceled => "order.canceled",
            OrderEventKind::Failed => "order.failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = OrderEvent::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            1,
            OrderEventKind::Refunded { total: 3000 },
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "REFUNDED");
        assert_eq!(json["kind"]["total"], 3000);
        assert_eq!(event.topic(), "order.refunded");
    }
}
