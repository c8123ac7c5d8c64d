use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;
use velo_core::identity::Caller;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::repository::{BookingStore, BookingTx, SeatLedger};
use velo_core::{BookingError, BookingResult, FareBreakdown, StoreError};
use velo_shared::{LifecycleKind, PaymentFailureReason};

use crate::dispatch::EventEmitter;
use crate::fare::FarePolicy;
use crate::lifecycle::BookingStateMachine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceProblem {
    Missing,
    Malformed,
}

/// Check a client-supplied payment reference before it touches the store.
pub fn validate_reference<'a>(reference: Option<&'a str>, prefix: &str) -> Result<&'a str, ReferenceProblem> {
    let reference = reference
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .ok_or(ReferenceProblem::Missing)?;

    let well_formed = reference.starts_with(prefix)
        && reference
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');

    if well_formed {
        Ok(reference)
    } else {
        Err(ReferenceProblem::Malformed)
    }
}

#[derive(Debug, Clone)]
pub struct ConfirmationOutcome {
    pub booking: Booking,
    /// True when the booking was already confirmed and nothing was done.
    pub replayed: bool,
    pub fare: Option<FareBreakdown>,
}

impl ConfirmationOutcome {
    /// Success for a booking that was confirmed earlier. Nothing is re-run or re-emitted.
    pub fn replayed(booking: Booking) -> Self {
        Self {
            booking,
            replayed: true,
            fare: None,
        }
    }
}

/// Verify payment, take the seats and confirm the booking in one unit of work.
pub struct ConfirmationWorkflow {
    store: Arc<dyn BookingStore>,
    emitter: EventEmitter,
    fares: FarePolicy,
    reference_prefix: String,
}

impl ConfirmationWorkflow {
    pub fn new(
        store: Arc<dyn BookingStore>,
        emitter: EventEmitter,
        fares: FarePolicy,
        reference_prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            emitter,
            fares,
            reference_prefix: reference_prefix.into(),
        }
    }

    pub async fn confirm(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        transaction_id: Option<&str>,
    ) -> BookingResult<ConfirmationOutcome> {
        let mut tx = self.store.begin().await?;

        let mut booking = tx
            .lock_booking(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", booking_id)))?;

        if booking.requester_id != caller.user_id {
            return Err(BookingError::Forbidden(
                "only the requester can pay for a booking".to_string(),
            ));
        }

        if booking.status == BookingStatus::Confirmed {
            info!(%booking_id, "Booking already confirmed, replaying success");
            return Ok(ConfirmationOutcome::replayed(booking));
        }

        BookingStateMachine::ensure(booking.status, BookingStatus::Confirmed)?;

        let ride = tx
            .ride(booking.ride_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("ride {}", booking.ride_id)))?;
        let fare = self.fares.quote(ride.price_minor, booking.seats_requested)?;

        let reference = match validate_reference(transaction_id, &self.reference_prefix) {
            Ok(reference) => reference,
            Err(ReferenceProblem::Missing) => {
                return Err(BookingError::InvalidPayment("transaction id is required".to_string()));
            }
            Err(ReferenceProblem::Malformed) => {
                self.payment_failed(&booking, &ride, PaymentFailureReason::InvalidReference);
                return Err(BookingError::InvalidPayment("invalid transaction id".to_string()));
            }
        };

        let already_attached = booking.transaction_id.as_deref() == Some(reference);
        if !already_attached && tx.transaction_exists(reference).await? {
            warn!(%booking_id, "Transaction reference already used by another booking");
            self.payment_failed(&booking, &ride, PaymentFailureReason::DuplicateTransaction);
            return Err(BookingError::DuplicateTransaction);
        }

        if tx.conditional_decrement(ride.id, booking.seats_requested).await? == 0 {
            warn!(%booking_id, ride_id = %ride.id, seats = booking.seats_requested, "Not enough seats left at confirmation");
            self.payment_failed(&booking, &ride, PaymentFailureReason::SeatsUnavailable);
            return Err(BookingError::SeatsUnavailable {
                ride_id: ride.id,
                requested: booking.seats_requested,
            });
        }

        booking.record_payment(reference.to_string(), Utc::now());
        BookingStateMachine::confirm(&mut booking)?;

        match persist(tx.as_mut(), &booking).await {
            Ok(()) => {}
            Err(StoreError::Conflict(detail)) => {
                warn!(%booking_id, "Transaction reference claimed concurrently: {}", detail);
                self.payment_failed(&booking, &ride, PaymentFailureReason::DuplicateTransaction);
                return Err(BookingError::DuplicateTransaction);
            }
            Err(e) => return Err(e.into()),
        }

        info!(%booking_id, ride_id = %ride.id, seats = booking.seats_requested, total = fare.total_minor, "Booking confirmed");

        self.emitter.emit(
            LifecycleKind::BookingConfirmed { fare: fare.clone() },
            booking.parties(&ride),
        );

        Ok(ConfirmationOutcome {
            booking,
            replayed: false,
            fare: Some(fare),
        })
    }

    fn payment_failed(&self, booking: &Booking, ride: &Ride, reason: PaymentFailureReason) {
        self.emitter
            .emit(LifecycleKind::PaymentFailed { reason }, booking.parties(ride));
    }
}

async fn persist(tx: &mut dyn BookingTx, booking: &Booking) -> Result<(), StoreError> {
    tx.save_booking(booking).await?;
    tx.commit().await
}
