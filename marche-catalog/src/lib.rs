pub mod product;
pub mod shipping;
pub mod promotion;

pub use product::{BoxSize, BoxWeights, DeliveryType, Experience, Product};
pub use shipping::{BoxRateTable, Shipping, ShippingConfigError, ShippingRate};
pub use promotion::{Discount, DiscountType, Promotion, PromotionStatus, PromotionTarget};
