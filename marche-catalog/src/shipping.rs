use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use uuid::Uuid;
use marche_core::Prefecture;
use crate::product::BoxSize;

/// One row of a shipping rate table: a flat price for a set of prefectures.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShippingRate {
    pub number: i64,
    pub name: String,
    pub price: i64,
    pub prefectures: Vec<Prefecture>,
}

/// Rates and frozen surcharge for a single box size.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoxRateTable {
    pub rates: Vec<ShippingRate>,
    pub frozen_surcharge: i64,
}

impl BoxRateTable {
    /// First rate whose prefecture set contains `prefecture`.
    pub fn find(&self, prefecture: Prefecture) -> Option<&ShippingRate> {
        self.rates.iter().find(|rate| rate.prefectures.contains(&prefecture))
    }
}

/// Shipping configuration owned by a coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Shipping {
    pub id: Uuid,
    pub coordinator_id: Uuid,
    pub name: String,
    pub is_default: bool,
    pub box60: BoxRateTable,
    pub box80: BoxRateTable,
    pub box100: BoxRateTable,
    pub has_free_shipping: bool,
    pub free_shipping_rates: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Shipping {
    pub fn table(&self, size: BoxSize) -> &BoxRateTable {
        match size {
            BoxSize::Size60 => &self.box60,
            BoxSize::Size80 => &self.box80,
            BoxSize::Size100 => &self.box100,
        }
    }

    pub fn find_rate(&self, size: BoxSize, prefecture: Prefecture) -> Option<&ShippingRate> {
        self.table(size).find(prefecture)
    }

    pub fn frozen_surcharge(&self, size: BoxSize) -> i64 {
        self.table(size).frozen_surcharge
    }

    /// True when `subtotal` qualifies for the free-shipping threshold.
    pub fn qualifies_for_free_shipping(&self, subtotal: i64) -> bool {
        self.has_free_shipping && subtotal >= self.free_shipping_rates
    }

    /// Check the table for configuration errors. All problems are reported,
    /// not just the first one.
    pub fn validate(&self) -> Result<(), Vec<ShippingConfigError>> {
        let mut errors = Vec::new();

        if self.has_free_shipping && self.free_shipping_rates <= 0 {
            errors.push(ShippingConfigError::InvalidFreeShippingThreshold(self.free_shipping_rates));
        }

        for size in BoxSize::ASCENDING {
            let table = self.table(size);
            if table.frozen_surcharge < 0 {
                errors.push(ShippingConfigError::NegativePrice { box_size: size, name: "frozen surcharge".to_string() });
            }

            let mut seen: HashSet<Prefecture> = HashSet::new();
            for rate in &table.rates {
                if rate.name.trim().is_empty() {
                    errors.push(ShippingConfigError::EmptyRateName { box_size: size, number: rate.number });
                }
                if rate.price < 0 {
                    errors.push(ShippingConfigError::NegativePrice { box_size: size, name: rate.name.clone() });
                }
                for prefecture in &rate.prefectures {
                    if !seen.insert(*prefecture) {
                        errors.push(ShippingConfigError::CoverageOverlap { box_size: size, prefecture: *prefecture });
                    }
                }
            }

            for prefecture in Prefecture::all() {
                if !seen.contains(&prefecture) {
                    errors.push(ShippingConfigError::CoverageGap { box_size: size, prefecture });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// A coordinator may flag at most one of its shipping records as default.
pub fn validate_default_uniqueness(shippings: &[Shipping]) -> Result<(), ShippingConfigError> {
    let mut defaults: HashMap<Uuid, usize> = HashMap::new();
    for shipping in shippings.iter().filter(|s| s.is_default) {
        let count = defaults.entry(shipping.coordinator_id).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Err(ShippingConfigError::MultipleDefaults(shipping.coordinator_id));
        }
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ShippingConfigError {
    #[error("Box size {box_size}: no rate covers prefecture {prefecture}")]
    CoverageGap { box_size: BoxSize, prefecture: Prefecture },

    #[error("Box size {box_size}: prefecture {prefecture} is covered by more than one rate")]
    CoverageOverlap { box_size: BoxSize, prefecture: Prefecture },

    #[error("Box size {box_size}: rate #{number} has an empty name")]
    EmptyRateName { box_size: BoxSize, number: i64 },

    #[error("Box size {box_size}: negative price on {name}")]
    NegativePrice { box_size: BoxSize, name: String },

    #[error("Free shipping enabled with non-positive threshold {0}")]
    InvalidFreeShippingThreshold(i64),

    #[error("Coordinator {0} has more than one default shipping")]
    MultipleDefaults(Uuid),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefectures(codes: std::ops::RangeInclusive<u8>) -> Vec<Prefecture> {
        codes.map(|c| Prefecture::new(c).unwrap()).collect()
    }

    fn table(base: i64) -> BoxRateTable {
        BoxRateTable {
            rates: vec![
                ShippingRate { number: 1, name: "East".to_string(), price: base, prefectures: prefectures(1..=23) },
                ShippingRate { number: 2, name: "West".to_string(), price: base + 200, prefectures: prefectures(24..=47) },
            ],
            frozen_surcharge: 500,
        }
    }

    fn shipping() -> Shipping {
        Shipping {
            id: Uuid::new_v4(),
            coordinator_id: Uuid::new_v4(),
            name: "Standard".to_string(),
            is_default: true,
            box60: table(800),
            box80: table(1000),
            box100: table(1400),
            has_free_shipping: true,
            free_shipping_rates: 10000,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_complete_table_is_valid() {
        assert!(shipping().validate().is_ok());
    }

    #[test]
    fn test_find_rate() {
        let shipping = shipping();
        let tokyo = Prefecture::new(13).unwrap();
        let osaka = Prefecture::new(27).unwrap();
        assert_eq!(shipping.find_rate(BoxSize::Size60, tokyo).unwrap().price, 800);
        assert_eq!(shipping.find_rate(BoxSize::Size100, osaka).unwrap().price, 1600);
    }

    #[test]
    fn test_gap_and_overlap_are_reported() {
        let mut shipping = shipping();
        // Okinawa dropped from box 80, Tokyo duplicated in box 100
        shipping.box80.rates[1].prefectures.retain(|p| p.code() != 47);
        shipping.box100.rates[1].prefectures.push(Prefecture::new(13).unwrap());

        let errors = shipping.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors.contains(&ShippingConfigError::CoverageGap {
            box_size: BoxSize::Size80,
            prefecture: Prefecture::new(47).unwrap(),
        }));
        assert!(errors.contains(&ShippingConfigError::CoverageOverlap {
            box_size: BoxSize::Size100,
            prefecture: Prefecture::new(13).unwrap(),
        }));
    }

    #[test]
    fn test_free_shipping_threshold() {
        let mut shipping = shipping();
        assert!(shipping.qualifies_for_free_shipping(10000));
        assert!(!shipping.qualifies_for_free_shipping(9999));
        shipping.has_free_shipping = false;
        assert!(!shipping.qualifies_for_free_shipping(50000));
    }

    #[test]
    fn test_single_default_per_coordinator() {
        let first = shipping();
        let mut second = shipping();
        second.coordinator_id = first.coordinator_id;
        assert!(validate_default_uniqueness(&[first.clone()]).is_ok());
        assert_eq!(
            validate_default_uniqueness(&[first.clone(), second]),
            Err(ShippingConfigError::MultipleDefaults(first.coordinator_id))
        );
    }
}
