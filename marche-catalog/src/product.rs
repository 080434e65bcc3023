use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;
use marche_core::CoreError;

/// Temperature class required in transit. Boxes never mix classes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DeliveryType {
    Normal,
    Refrigerated,
    Frozen,
}

impl DeliveryType {
    pub const ALL: [DeliveryType; 3] = [DeliveryType::Normal, DeliveryType::Refrigerated, DeliveryType::Frozen];

    pub fn as_str(self) -> &'static str {
        match self {
            DeliveryType::Normal => "NORMAL",
            DeliveryType::Refrigerated => "REFRIGERATED",
            DeliveryType::Frozen => "FROZEN",
        }
    }
}

impl FromStr for DeliveryType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NORMAL" => Ok(DeliveryType::Normal),
            "REFRIGERATED" => Ok(DeliveryType::Refrigerated),
            "FROZEN" => Ok(DeliveryType::Frozen),
            other => Err(CoreError::UnknownVariant {
                kind: "delivery type",
                value: other.to_string(),
            }),
        }
    }
}

/// Nominal box sizes, ordered smallest first.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BoxSize {
    #[serde(rename = "60")]
    Size60,
    #[serde(rename = "80")]
    Size80,
    #[serde(rename = "100")]
    Size100,
}

impl BoxSize {
    pub const ASCENDING: [BoxSize; 3] = [BoxSize::Size60, BoxSize::Size80, BoxSize::Size100];

    /// Capacity units of one box of this size.
    pub fn capacity(self) -> u32 {
        match self {
            BoxSize::Size60 => 600,
            BoxSize::Size80 => 250,
            BoxSize::Size100 => 100,
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            BoxSize::Size60 => 60,
            BoxSize::Size80 => 80,
            BoxSize::Size100 => 100,
        }
    }

    pub fn from_i16(size: i16) -> Result<Self, CoreError> {
        match size {
            60 => Ok(BoxSize::Size60),
            80 => Ok(BoxSize::Size80),
            100 => Ok(BoxSize::Size100),
            other => Err(CoreError::UnknownVariant {
                kind: "box size",
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for BoxSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_i16())
    }
}

/// Capacity units one unit of a product consumes in each box size.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoxWeights {
    pub size60: u32,
    pub size80: u32,
    pub size100: u32,
}

impl BoxWeights {
    pub fn new(size60: u32, size80: u32, size100: u32) -> Self {
        Self { size60, size80, size100 }
    }

    pub fn for_size(&self, size: BoxSize) -> u32 {
        match size {
            BoxSize::Size60 => self.size60,
            BoxSize::Size80 => self.size80,
            BoxSize::Size100 => self.size100,
        }
    }

    /// True when at least one box size can hold a single unit.
    pub fn fits_any(&self) -> bool {
        BoxSize::ASCENDING.iter().any(|size| self.for_size(*size) <= size.capacity())
    }
}

/// Catalog product as seen by the settlement engine. Prices are tax-inclusive
/// minor currency units and are snapshotted onto order items at checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    pub id: Uuid,
    pub coordinator_id: Uuid,
    pub producer_id: Uuid,
    pub name: String,
    pub price: i64,
    pub delivery_type: DeliveryType,
    pub box_weights: BoxWeights,
    pub is_public: bool,
}

/// Bookable experience (farm visit, workshop). Priced per participant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    pub id: Uuid,
    pub coordinator_id: Uuid,
    pub title: String,
    pub adult_price: i64,
    pub child_price: i64,
    pub is_public: bool,
}
