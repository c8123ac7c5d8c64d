use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{Booking, BookingStatus, Ride};
use crate::StoreResult;

/// Atomic adjustments of a ride's available-seat count.
///
/// Only reachable through an open [`BookingTx`].
#[async_trait]
pub trait SeatLedger: Send {
    /// Subtract `seats` from the ride if at least that many remain.
    ///
    /// Returns the number of rows changed: 1 on success, 0 when the ride lacks the seats.
    async fn conditional_decrement(&mut self, ride_id: Uuid, seats: u32) -> StoreResult<u64>;
}

/// A unit of work holding the booking row lock until commit or drop.
///
/// Dropping without calling [`BookingTx::commit`] rolls every write back, seat decrements included.
#[async_trait]
pub trait BookingTx: SeatLedger {
    /// Load the booking and lock it against concurrent units of work.
    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Whether any booking already carries this payment reference.
    async fn transaction_exists(&mut self, transaction_id: &str) -> StoreResult<bool>;

    /// Persist the booking; a reused transaction reference fails with `StoreError::Conflict`.
    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()>;

    async fn commit(&mut self) -> StoreResult<()>;
}

/// Repository trait for bookings and the rides they reference
#[async_trait]
pub trait BookingStore: Send + Sync {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>>;

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>>;

    /// Compare-and-set of a booking's status. Returns false when the booking was no longer in `from`.
    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool>;

    /// Stamp `payment_initiated_at` unless already set.
    async fn record_payment_initiated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()>;

    async fn list_bookings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>>;

    async fn list_rides_for_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Ride>>;

    /// Rides whose effective end time is at or before `now` and that still have a booking in `open`.
    async fn find_ended_ride_ids(
        &self,
        now: DateTime<Utc>,
        open: &[BookingStatus],
    ) -> StoreResult<Vec<Uuid>>;

    /// Move every booking of the ride currently in one of `from` to COMPLETED in one statement.
    ///
    /// Returns the bookings that changed, in their completed state.
    async fn complete_ride_bookings(
        &self,
        ride_id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>>;

    /// Move a single booking to COMPLETED if it is still in one of `from`.
    async fn complete_booking(
        &self,
        id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Option<Booking>>;
}
