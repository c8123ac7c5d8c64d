pub mod identity;
pub mod model;
pub mod notify;
pub mod payment;
pub mod repository;

use uuid::Uuid;

pub use velo_shared::FareBreakdown;

use crate::model::BookingStatus;

/// Failure of a persistence operation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. a reused transaction reference).
    #[error("Uniqueness conflict: {0}")]
    Conflict(String),
    /// The statement itself failed for this row or batch.
    #[error("Query failed: {0}")]
    Query(String),
    /// The store could not be reached.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same work row by row might succeed.
    pub fn is_row_recoverable(&self) -> bool {
        matches!(self, StoreError::Conflict(_) | StoreError::Query(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum BookingError {
    #[error("Cannot move booking from {from} to {to}")]
    InvalidTransition {
        from: BookingStatus,
        to: BookingStatus,
    },
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid payment: {0}")]
    InvalidPayment(String),
    #[error("Transaction reference already used")]
    DuplicateTransaction,
    #[error("Not enough seats on ride {ride_id} for {requested} seat(s)")]
    SeatsUnavailable { ride_id: Uuid, requested: u32 },
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Payment provider failure: {0}")]
    UpstreamFailure(String),
    #[error("Ride {ride_id}: completed {completed} booking(s), {} failed", .failed.len())]
    SweepPartialFailure {
        ride_id: Uuid,
        completed: usize,
        failed: Vec<Uuid>,
    },
    #[error("Ride {0} has not ended yet")]
    RideNotEnded(Uuid),
    #[error("Fare for {seats} seat(s) at {unit_price_minor} is out of range")]
    FareOutOfRange { unit_price_minor: i64, seats: u32 },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl BookingError {
    /// Stable machine-readable code for API responses and logs.
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::InvalidTransition { .. } => "invalid_transition",
            BookingError::Forbidden(_) => "forbidden",
            BookingError::InvalidPayment(_) => "invalid_payment",
            BookingError::DuplicateTransaction => "duplicate_transaction",
            BookingError::SeatsUnavailable { .. } => "seats_unavailable",
            BookingError::NotFound(_) => "not_found",
            BookingError::UpstreamFailure(_) => "upstream_failure",
            BookingError::SweepPartialFailure { .. } => "sweep_partial_failure",
            BookingError::RideNotEnded(_) => "ride_not_ended",
            BookingError::FareOutOfRange { .. } => "fare_out_of_range",
            BookingError::Store(_) => "store_failure",
        }
    }
}

pub type BookingResult<T> = Result<T, BookingError>;
