pub mod completion;
pub mod confirmation;
pub mod dispatch;
pub mod fare;
pub mod lifecycle;
pub mod payment;
pub mod service;
pub mod statement;

pub use completion::{CompletionSweeper, RideCompletion, SweepReport};
pub use confirmation::ConfirmationOutcome;
pub use dispatch::{EventEmitter, LifecycleDispatcher};
pub use fare::FarePolicy;
pub use lifecycle::{BookingStateMachine, Decision};
pub use payment::{MockPaymentAdapter, PaymentOrchestrator};
pub use service::BookingService;
