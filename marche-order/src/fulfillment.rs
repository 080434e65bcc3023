use std::collections::HashMap;
use uuid::Uuid;
use marche_catalog::Product;
use marche_core::Address;
use crate::models::{FulfillmentStatus, OrderFulfillment, OrderItem, ShippingCarrier, ShippingMethod};
use crate::packer::PackedBox;
use crate::shipping_fee::ShippingQuote;

/// Boxes and line items for a new order.
#[derive(Debug, Clone, Default)]
pub struct FulfillmentPlan {
    pub fulfillments: Vec<OrderFulfillment>,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FulfillmentError {
    #[error("Packed product {0} is missing from the catalog snapshot")]
    UnknownProduct(Uuid),

    #[error("Shipping quote has {charges} charges for {boxes} boxes")]
    QuoteMismatch { charges: usize, boxes: usize },
}

/// Turn packed boxes into fulfillments numbered from 1, with one item per
/// product per box. Prices and names are snapshotted from `products`.
pub fn plan_fulfillments(
    order_id: Uuid,
    boxes: &[PackedBox],
    quote: &ShippingQuote,
    products: &HashMap<Uuid, Product>,
    address: &Address,
) -> Result<FulfillmentPlan, FulfillmentError> {
    if quote.charges.len() != boxes.len() {
        return Err(FulfillmentError::QuoteMismatch {
            charges: quote.charges.len(),
            boxes: boxes.len(),
        });
    }

    let mut plan = FulfillmentPlan::default();
    for (index, (packed, charge)) in boxes.iter().zip(&quote.charges).enumerate() {
        let fulfillment_id = Uuid::new_v4();
        plan.fulfillments.push(OrderFulfillment {
            id: fulfillment_id,
            order_id,
            box_number: index as u32 + 1,
            box_size: packed.size,
            box_rate: packed.occupancy_rate,
            delivery_type: packed.delivery_type,
            status: FulfillmentStatus::Unfulfilled,
            shipping_carrier: ShippingCarrier::Unknown,
            tracking_number: None,
            shipping_method: ShippingMethod::Standard,
            // Waived boxes still record zero so the per-box fees add up to the order's fee
            shipping_fee: if quote.free_shipping_applied { 0 } else { charge.price() },
            shipped_at: None,
            address: address.clone(),
        });

        for line in &packed.lines {
            let product = products
                .get(&line.product_id)
                .ok_or(FulfillmentError::UnknownProduct(line.product_id))?;
            plan.items.push(OrderItem {
                id: Uuid::new_v4(),
                order_id,
                fulfillment_id,
                product_id: product.id,
                product_name: product.name.clone(),
                price: product.price,
                quantity: line.quantity,
            });
        }
    }
    Ok(plan)
}
