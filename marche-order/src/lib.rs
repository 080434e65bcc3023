pub mod models;
pub mod packer;
pub mod shipping_fee;
pub mod promotion;
pub mod state;
pub mod fulfillment;
pub mod requests;
pub mod validation;
pub mod repository;
pub mod memory;
pub mod manager;
pub mod export;

pub use models::{
    FulfillmentStatus, Order, OrderExperience, OrderFulfillment, OrderItem, OrderPayment, OrderRefund, OrderStatus,
    OrderType, ShippingCarrier, ShippingMethod,
};
pub use packer::{BoxPacker, PackItem, PackedBox, PackingError};
pub use shipping_fee::{ShippingCalculator, ShippingError, ShippingQuote};
pub use promotion::{PromotionError, PromotionResolver};
pub use state::{Transition, TransitionError};
pub use manager::{ErrorKind, OrderManager, SettlementError, SettlementRules};
pub use repository::{
    EventPublisher, OrderFilter, OrderRepository, ProductRepository, PromotionRelease, PromotionRepository,
    RepositoryError, ShippingRepository,
};
pub use export::{export_orders, ExportError};
