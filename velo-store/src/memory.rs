use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard};
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::repository::{BookingStore, BookingTx, SeatLedger};
use velo_core::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    rides: HashMap<Uuid, Ride>,
    bookings: HashMap<Uuid, Booking>,
}

impl MemoryState {
    /// Same row rules as the `bookings` table constraints.
    fn check_row(&self, booking: &Booking) -> StoreResult<()> {
        let Some(reference) = booking.transaction_id.as_deref() else {
            return Ok(());
        };

        if !booking.status.allows_transaction() {
            return Err(StoreError::Query(format!(
                "booking {}: {} cannot carry a transaction id",
                booking.id, booking.status
            )));
        }

        let taken = self
            .bookings
            .values()
            .any(|other| other.id != booking.id && other.transaction_id.as_deref() == Some(reference));

        if taken {
            Err(StoreError::Conflict(format!("transaction_id {} already attached", reference)))
        } else {
            Ok(())
        }
    }

    fn complete(&mut self, id: Uuid, from: &[BookingStatus]) -> Option<Booking> {
        let booking = self.bookings.get_mut(&id)?;
        if !from.contains(&booking.status) {
            return None;
        }
        booking.status = BookingStatus::Completed;
        Some(booking.clone())
    }
}

#[derive(Default)]
struct Faults {
    bulk_completion: Option<StoreError>,
    row_completion: HashSet<Uuid>,
    commit: Option<StoreError>,
}

/// Store used by tests and local runs without Postgres.
///
/// Units of work are serialized on one lock and see a private copy of the state until commit.
#[derive(Default)]
pub struct InMemoryBookingStore {
    state: Arc<Mutex<MemoryState>>,
    faults: Arc<StdMutex<Faults>>,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_ride(&self, ride: Ride) {
        self.state.lock().await.rides.insert(ride.id, ride);
    }

    /// Make the bulk completion statement fail with `error` (or succeed again with `None`).
    pub fn fail_bulk_completion(&self, error: Option<StoreError>) {
        self.faults().bulk_completion = error;
    }

    /// Make single-row completion of this booking fail.
    pub fn fail_row_completion(&self, booking_id: Uuid) {
        self.faults().row_completion.insert(booking_id);
    }

    /// Make the next unit-of-work commit fail with `error`.
    pub fn fail_next_commit(&self, error: StoreError) {
        self.faults().commit = Some(error);
    }

    fn faults(&self) -> StdMutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>> {
        let guard = self.state.clone().lock_owned().await;
        let staged = guard.clone();

        Ok(Box::new(MemoryBookingTx {
            guard: Some(guard),
            staged,
            faults: self.faults.clone(),
        }))
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        let mut state = self.state.lock().await;
        if state.bookings.contains_key(&booking.id) {
            return Err(StoreError::Conflict(format!("booking {} already exists", booking.id)));
        }
        state.check_row(booking)?;
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        Ok(self.state.lock().await.bookings.get(&id).cloned())
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        Ok(self.state.lock().await.rides.get(&id).cloned())
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool> {
        let mut state = self.state.lock().await;
        match state.bookings.get_mut(&id) {
            Some(booking) if booking.status == from => {
                booking.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_payment_initiated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        if let Some(booking) = self.state.lock().await.bookings.get_mut(&id) {
            booking.payment_initiated_at.get_or_insert(at);
        }
        Ok(())
    }

    async fn list_bookings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        let state = self.state.lock().await;
        let mut bookings: Vec<Booking> = state
            .bookings
            .values()
            .filter(|b| b.ride_id == ride_id)
            .cloned()
            .collect();
        bookings.sort_by_key(|b| b.requested_at);
        Ok(bookings)
    }

    async fn list_rides_for_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Ride>> {
        let state = self.state.lock().await;
        let mut rides: Vec<Ride> = state
            .rides
            .values()
            .filter(|r| r.owner_id == owner_id)
            .cloned()
            .collect();
        rides.sort_by_key(|r| r.departure_at);
        Ok(rides)
    }

    async fn find_ended_ride_ids(
        &self,
        now: DateTime<Utc>,
        open: &[BookingStatus],
    ) -> StoreResult<Vec<Uuid>> {
        let state = self.state.lock().await;
        let mut ended: Vec<&Ride> = state
            .rides
            .values()
            .filter(|ride| ride.has_ended(now))
            .filter(|ride| {
                state
                    .bookings
                    .values()
                    .any(|b| b.ride_id == ride.id && open.contains(&b.status))
            })
            .collect();
        ended.sort_by_key(|r| r.departure_at);
        Ok(ended.into_iter().map(|r| r.id).collect())
    }

    async fn complete_ride_bookings(
        &self,
        ride_id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>> {
        let injected = self.faults().bulk_completion.clone();
        if let Some(error) = injected {
            return Err(error);
        }

        let mut state = self.state.lock().await;
        let ids: Vec<Uuid> = state
            .bookings
            .values()
            .filter(|b| b.ride_id == ride_id && from.contains(&b.status))
            .map(|b| b.id)
            .collect();

        Ok(ids
            .into_iter()
            .filter_map(|id| state.complete(id, from))
            .collect())
    }

    async fn complete_booking(
        &self,
        id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Option<Booking>> {
        let injected = self.faults().row_completion.contains(&id);
        if injected {
            return Err(StoreError::Query(format!("update of booking {} failed", id)));
        }

        Ok(self.state.lock().await.complete(id, from))
    }
}

/// Holds the store lock for its whole lifetime; dropping it discards `staged`.
pub struct MemoryBookingTx {
    guard: Option<OwnedMutexGuard<MemoryState>>,
    staged: MemoryState,
    faults: Arc<StdMutex<Faults>>,
}

impl MemoryBookingTx {
    fn ensure_open(&self) -> StoreResult<()> {
        if self.guard.is_some() {
            Ok(())
        } else {
            Err(StoreError::Query("transaction already committed".to_string()))
        }
    }
}

#[async_trait]
impl SeatLedger for MemoryBookingTx {
    async fn conditional_decrement(&mut self, ride_id: Uuid, seats: u32) -> StoreResult<u64> {
        self.ensure_open()?;

        match self.staged.rides.get_mut(&ride_id) {
            Some(ride) if ride.seats_available >= seats => {
                ride.seats_available -= seats;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl BookingTx for MemoryBookingTx {
    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.ensure_open()?;
        Ok(self.staged.bookings.get(&id).cloned())
    }

    async fn ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>> {
        self.ensure_open()?;
        Ok(self.staged.rides.get(&id).cloned())
    }

    async fn transaction_exists(&mut self, transaction_id: &str) -> StoreResult<bool> {
        self.ensure_open()?;
        Ok(self
            .staged
            .bookings
            .values()
            .any(|b| b.transaction_id.as_deref() == Some(transaction_id)))
    }

    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        self.ensure_open()?;
        if !self.staged.bookings.contains_key(&booking.id) {
            return Err(StoreError::Query(format!("booking {} does not exist", booking.id)));
        }
        self.staged.check_row(booking)?;
        self.staged.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let injected = self
            .faults
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .commit
            .take();
        if let Some(error) = injected {
            self.guard = None;
            return Err(error);
        }

        let mut guard = self
            .guard
            .take()
            .ok_or_else(|| StoreError::Query("transaction already committed".to_string()))?;
        *guard = std::mem::take(&mut self.staged);
        Ok(())
    }
}
