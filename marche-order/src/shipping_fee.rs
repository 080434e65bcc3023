use serde::{Deserialize, Serialize};
use marche_catalog::{BoxSize, DeliveryType, Shipping};
use marche_core::Prefecture;
use crate::packer::PackedBox;

/// Priced box, in the same order as the packer's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxCharge {
    pub size: BoxSize,
    pub rate_name: String,
    pub base_price: i64,
    pub frozen_surcharge: i64,
}

impl BoxCharge {
    pub fn price(&self) -> i64 {
        self.base_price + self.frozen_surcharge
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingQuote {
    pub charges: Vec<BoxCharge>,
    /// Sum of all box prices before the free-shipping threshold.
    pub provisional_total: i64,
    pub free_shipping_applied: bool,
    pub total: i64,
}

/// Prices packed boxes against a coordinator's shipping table.
pub struct ShippingCalculator;

impl ShippingCalculator {
    pub fn calculate(
        boxes: &[PackedBox],
        destination: Prefecture,
        shipping: &Shipping,
        subtotal: i64,
    ) -> Result<ShippingQuote, ShippingError> {
        let mut charges = Vec::with_capacity(boxes.len());

        for packed in boxes {
            let rate = shipping
                .find_rate(packed.size, destination)
                .ok_or(ShippingError::RateNotFound {
                    shipping_id: shipping.id,
                    box_size: packed.size,
                    prefecture: destination,
                })?;

            let frozen_surcharge = match packed.delivery_type {
                DeliveryType::Frozen => shipping.frozen_surcharge(packed.size),
                DeliveryType::Normal | DeliveryType::Refrigerated => 0,
            };

            charges.push(BoxCharge {
                size: packed.size,
                rate_name: rate.name.clone(),
                base_price: rate.price.max(0),
                frozen_surcharge: frozen_surcharge.max(0),
            });
        }

        let provisional_total: i64 = charges.iter().map(BoxCharge::price).sum();
        let free_shipping_applied = shipping.qualifies_for_free_shipping(subtotal);
        let total = if free_shipping_applied { 0 } else { provisional_total };

        Ok(ShippingQuote {
            charges,
            provisional_total,
            free_shipping_applied,
            total,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShippingError {
    #[error("Shipping {shipping_id} has no {box_size} rate for prefecture {prefecture}")]
    RateNotFound {
        shipping_id: uuid::Uuid,
        box_size: BoxSize,
        prefecture: Prefecture,
    },

    #[error("Coordinator {0} has no default shipping configured")]
    NotConfigured(uuid::Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packer::PackedLine;
    use chrono::Utc;
    use marche_catalog::{BoxRateTable, ShippingRate};
    use proptest::prelude::*;
    use uuid::Uuid;

    fn table(price: i64, surcharge: i64, codes: std::ops::RangeInclusive<u8>) -> BoxRateTable {
        BoxRateTable {
            rates: vec![ShippingRate {
                number: 1,
                name: "Nationwide".to_string(),
                price,
                prefectures: codes.map(|c| Prefecture::new(c).unwrap()).collect(),
            }],
            frozen_surcharge: surcharge,
        }
    }

    fn shipping(has_free_shipping: bool) -> Shipping {
        Shipping {
            id: Uuid::new_v4(),
            coordinator_id: Uuid::new_v4(),
            name: "Default".to_string(),
            is_default: true,
            box60: table(800, 300, 1..=47),
            box80: table(1100, 400, 1..=47),
            // Okinawa missing for the 100 box
            box100: table(1500, 500, 1..=46),
            has_free_shipping,
            free_shipping_rates: 8000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn packed(size: BoxSize, delivery_type: DeliveryType) -> PackedBox {
        PackedBox {
            size,
            delivery_type,
            consumed: 10,
            occupancy_rate: 10,
            lines: vec![PackedLine { product_id: Uuid::new_v4(), quantity: 1 }],
        }
    }

    fn tokyo() -> Prefecture {
        Prefecture::new(13).unwrap()
    }

    #[test]
    fn test_sums_boxes_with_frozen_surcharge() {
        let boxes = vec![
            packed(BoxSize::Size60, DeliveryType::Normal),
            packed(BoxSize::Size80, DeliveryType::Frozen),
        ];
        let quote = ShippingCalculator::calculate(&boxes, tokyo(), &shipping(false), 3000).unwrap();
        assert_eq!(quote.charges[0].price(), 800);
        assert_eq!(quote.charges[1].price(), 1500);
        assert_eq!(quote.total, 2300);
        assert!(!quote.free_shipping_applied);
    }

    #[test]
    fn test_free_shipping_threshold_zeroes_total() {
        let boxes = vec![
            packed(BoxSize::Size60, DeliveryType::Normal),
            packed(BoxSize::Size60, DeliveryType::Frozen),
        ];
        let quote = ShippingCalculator::calculate(&boxes, tokyo(), &shipping(true), 8000).unwrap();
        assert_eq!(quote.provisional_total, 1900);
        assert_eq!(quote.total, 0);
        assert!(quote.free_shipping_applied);

        let below = ShippingCalculator::calculate(&boxes, tokyo(), &shipping(true), 7999).unwrap();
        assert_eq!(below.total, 1900);
    }

    #[test]
    fn test_missing_rate_is_configuration_error() {
        let okinawa = Prefecture::new(47).unwrap();
        let shipping = shipping(false);
        let boxes = vec![packed(BoxSize::Size100, DeliveryType::Normal)];
        let err = ShippingCalculator::calculate(&boxes, okinawa, &shipping, 1000).unwrap_err();
        assert_eq!(
            err,
            ShippingError::RateNotFound {
                shipping_id: shipping.id,
                box_size: BoxSize::Size100,
                prefecture: okinawa,
            }
        );
    }

    proptest! {
        #[test]
        fn prop_total_is_never_negative_and_zero_over_threshold(
            sizes in prop::collection::vec(0usize..3, 0..8),
            frozen in prop::collection::vec(any::<bool>(), 8),
            subtotal in 0i64..20000,
            prefecture in 1u8..=46,
        ) {
            let boxes: Vec<PackedBox> = sizes
                .iter()
                .zip(frozen.iter())
                .map(|(i, f)| {
                    let delivery_type = if *f { DeliveryType::Frozen } else { DeliveryType::Normal };
                    packed(BoxSize::ASCENDING[*i], delivery_type)
                })
                .collect();
            let shipping = shipping(true);
            let quote = ShippingCalculator::calculate(&boxes, Prefecture::new(prefecture).unwrap(), &shipping, subtotal).unwrap();
            prop_assert!(quote.total >= 0);
            if subtotal >= shipping.free_shipping_rates {
                prop_assert_eq!(quote.total, 0);
            } else {
                prop_assert_eq!(quote.total, quote.provisional_total);
            }
        }
    }
}
