use serde::{Deserialize, Serialize};
use uuid::Uuid;
use marche_catalog::{BoxSize, BoxWeights, DeliveryType};

/// A line to pack: `quantity` units of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackItem {
    pub product_id: Uuid,
    pub quantity: u32,
    pub weights: BoxWeights,
    pub delivery_type: DeliveryType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedLine {
    pub product_id: Uuid,
    pub quantity: u32,
}

/// A closed box with its chosen size.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackedBox {
    pub size: BoxSize,
    pub delivery_type: DeliveryType,
    /// Capacity units used in `size`.
    pub consumed: u32,
    /// `consumed / capacity * 100`, rounded, within 1..=100.
    pub occupancy_rate: u8,
    pub lines: Vec<PackedLine>,
}

impl PackedBox {
    pub fn unit_count(&self) -> u32 {
        self.lines.iter().map(|l| l.quantity).sum()
    }
}

struct OpenBox {
    delivery_type: DeliveryType,
    size: BoxSize,
    // Running totals indexed like BoxSize::ASCENDING
    totals: [u64; 3],
    lines: Vec<PackedLine>,
}

impl OpenBox {
    fn new(delivery_type: DeliveryType) -> Self {
        Self {
            delivery_type,
            size: BoxSize::Size60,
            totals: [0; 3],
            lines: Vec::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Smallest size that still fits once `weights` is added.
    fn smallest_fit(&self, weights: &BoxWeights) -> Option<BoxSize> {
        BoxSize::ASCENDING.iter().enumerate().find_map(|(i, size)| {
            let total = self.totals[i] + weights.for_size(*size) as u64;
            (total <= size.capacity() as u64).then_some(*size)
        })
    }

    fn add(&mut self, product_id: Uuid, weights: &BoxWeights, size: BoxSize) {
        for (i, s) in BoxSize::ASCENDING.iter().enumerate() {
            self.totals[i] += weights.for_size(*s) as u64;
        }
        self.size = size;
        match self.lines.last_mut() {
            Some(line) if line.product_id == product_id => line.quantity += 1,
            _ => self.lines.push(PackedLine { product_id, quantity: 1 }),
        }
    }

    fn close(self) -> PackedBox {
        let index = BoxSize::ASCENDING.iter().position(|s| *s == self.size).unwrap_or(0);
        let consumed = self.totals[index] as u32;
        PackedBox {
            size: self.size,
            delivery_type: self.delivery_type,
            consumed,
            occupancy_rate: occupancy_rate(consumed, self.size),
            lines: self.lines,
        }
    }
}

pub fn occupancy_rate(consumed: u32, size: BoxSize) -> u8 {
    let capacity = size.capacity() as u64;
    let rate = (consumed as u64 * 100 + capacity / 2) / capacity;
    rate.clamp(1, 100) as u8
}

/// Packs ordered items into boxes.
///
/// Each delivery type is packed on its own, in the order Normal,
/// Refrigerated, Frozen. Units are added to the open box as long as some box
/// size (tried 60, 80, 100) still holds the running set; the smallest such
/// size becomes the box size. Otherwise the box is closed and a new one is
/// opened. All units are checked before anything is packed.
pub struct BoxPacker;

impl BoxPacker {
    pub fn pack(items: &[PackItem]) -> Result<Vec<PackedBox>, PackingError> {
        if let Some(item) = items.iter().find(|item| !item.weights.fits_any()) {
            return Err(PackingError::ItemTooLarge {
                product_id: item.product_id,
                weights: item.weights,
            });
        }

        let mut boxes = Vec::new();
        for delivery_type in DeliveryType::ALL {
            let mut open = OpenBox::new(delivery_type);

            for item in items.iter().filter(|item| item.delivery_type == delivery_type) {
                for _ in 0..item.quantity {
                    let size = match open.smallest_fit(&item.weights) {
                        Some(size) => size,
                        None => {
                            let full = std::mem::replace(&mut open, OpenBox::new(delivery_type));
                            boxes.push(full.close());
                            // Checked up front, a single unit always fits an empty box
                            open.smallest_fit(&item.weights).ok_or(PackingError::ItemTooLarge {
                                product_id: item.product_id,
                                weights: item.weights,
                            })?
                        }
                    };
                    open.add(item.product_id, &item.weights, size);
                }
            }

            if !open.is_empty() {
                boxes.push(open.close());
            }
        }

        Ok(boxes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PackingError {
    #[error("Item {product_id} does not fit any box size (weights 60:{}, 80:{}, 100:{})", .weights.size60, .weights.size80, .weights.size100)]
    ItemTooLarge { product_id: Uuid, weights: BoxWeights },
}
