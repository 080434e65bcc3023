pub mod address;
pub mod payment;

pub use address::{Address, Prefecture};
pub use payment::{PaymentEvent, PaymentMethod, PaymentStatus};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid prefecture code: {0}")]
    InvalidPrefecture(u8),
    #[error("Unknown {kind} value: {value}")]
    UnknownVariant { kind: &'static str, value: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
