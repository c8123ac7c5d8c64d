pub mod models;
pub mod pii;

pub use models::events::{BookingParties, LifecycleEvent, LifecycleKind, PaymentFailureReason};
pub use models::fare::FareBreakdown;
pub use pii::Masked;
