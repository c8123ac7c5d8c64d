use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;
use velo_core::identity::Caller;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::payment::{ChargeRequest, CheckoutSession, PaymentAdapter, PaymentHandle};
use velo_core::repository::BookingStore;
use velo_core::{BookingError, BookingResult};
use velo_shared::LifecycleKind;

use crate::completion::{CompletionSweeper, RideCompleter, RideCompletion};
use crate::confirmation::{ConfirmationOutcome, ConfirmationWorkflow};
use crate::dispatch::EventEmitter;
use crate::fare::FarePolicy;
use crate::lifecycle::{BookingStateMachine, Decision};
use crate::payment::PaymentOrchestrator;
use crate::statement::{build_statement, DriverStatement};

/// Entry point for every booking-affecting operation.
pub struct BookingService {
    store: Arc<dyn BookingStore>,
    payments: PaymentOrchestrator,
    confirmation: ConfirmationWorkflow,
    completer: Arc<RideCompleter>,
    emitter: EventEmitter,
    fares: FarePolicy,
}

impl BookingService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        adapter: Arc<dyn PaymentAdapter>,
        emitter: EventEmitter,
        fares: FarePolicy,
    ) -> Self {
        let payments = PaymentOrchestrator::new(adapter);
        let confirmation = ConfirmationWorkflow::new(
            store.clone(),
            emitter.clone(),
            fares.clone(),
            payments.reference_prefix(),
        );
        let completer = Arc::new(RideCompleter::new(store.clone(), emitter.clone()));

        Self {
            store,
            payments,
            confirmation,
            completer,
            emitter,
            fares,
        }
    }

    /// A sweeper sharing this service's store and event stream.
    pub fn sweeper(&self) -> CompletionSweeper {
        CompletionSweeper::new(self.store.clone(), self.completer.clone())
    }

    pub async fn request_booking(
        &self,
        caller: &Caller,
        ride_id: Uuid,
        seats: Option<i32>,
    ) -> BookingResult<Booking> {
        let ride = self.ride(ride_id).await?;

        let booking = Booking::new(
            ride.id,
            caller.user_id,
            caller.name.clone(),
            caller.email.clone(),
            seats,
        );
        self.store.insert_booking(&booking).await?;

        info!(booking_id = %booking.id, %ride_id, seats = booking.seats_requested, "Booking requested");
        self.emitter
            .emit(LifecycleKind::BookingRequested, booking.parties(&ride));

        Ok(booking)
    }

    /// The ride owner accepts or rejects a pending request.
    ///
    /// Accepting checks seat availability at this moment only; nothing is held.
    pub async fn decide(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        decision: Decision,
    ) -> BookingResult<Booking> {
        let mut booking = self.booking(booking_id).await?;
        let ride = self.ride(booking.ride_id).await?;

        if !caller.owns(&ride) {
            return Err(BookingError::Forbidden(
                "only the ride owner can decide on a booking".to_string(),
            ));
        }

        let from = booking.status;
        BookingStateMachine::ensure(from, decision.target())?;

        if decision == Decision::Accept && ride.seats_available < booking.seats_requested {
            return Err(BookingError::SeatsUnavailable {
                ride_id: ride.id,
                requested: booking.seats_requested,
            });
        }

        BookingStateMachine::decide(&mut booking, decision)?;

        if !self
            .store
            .transition_status(booking.id, from, booking.status)
            .await?
        {
            // Someone else decided first; report against the current status.
            let current = self.booking(booking_id).await?;
            return Err(BookingError::InvalidTransition {
                from: current.status,
                to: booking.status,
            });
        }

        let kind = match decision {
            Decision::Accept => LifecycleKind::BookingAccepted,
            Decision::Reject => LifecycleKind::BookingRejected,
        };
        self.emitter.emit(kind, booking.parties(&ride));

        Ok(booking)
    }

    /// Open a payment intent for the booking's total.
    pub async fn initiate_payment(&self, caller: &Caller, booking_id: Uuid) -> BookingResult<PaymentHandle> {
        let (booking, ride) = self.payable(caller, booking_id).await?;
        let charge = self.charge(&booking, &ride)?;

        self.stamp_initiated(&booking, Utc::now()).await?;
        self.payments.initialize_payment(&charge).await
    }

    /// Open a hosted checkout session for the booking's total.
    pub async fn create_checkout_session(
        &self,
        caller: &Caller,
        booking_id: Uuid,
    ) -> BookingResult<CheckoutSession> {
        let (booking, ride) = self.payable(caller, booking_id).await?;
        let charge = self.charge(&booking, &ride)?;

        self.stamp_initiated(&booking, Utc::now()).await?;
        self.payments.open_checkout(&charge).await
    }

    pub async fn confirm_payment(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        transaction_id: Option<&str>,
    ) -> BookingResult<ConfirmationOutcome> {
        self.confirmation
            .confirm(caller, booking_id, transaction_id)
            .await
    }

    /// Confirm using the payment reference of a paid checkout session.
    pub async fn confirm_checkout(
        &self,
        caller: &Caller,
        booking_id: Uuid,
        session_id: &str,
    ) -> BookingResult<ConfirmationOutcome> {
        let booking = self.booking(booking_id).await?;
        authorize_requester(caller, &booking)?;

        // A confirmed booking replays without asking the processor again.
        if booking.status == BookingStatus::Confirmed {
            info!(%booking_id, "Booking already confirmed, replaying checkout");
            return Ok(ConfirmationOutcome::replayed(booking));
        }

        if session_id.trim().is_empty() {
            return Err(BookingError::InvalidPayment("session id is required".to_string()));
        }

        let reference = self.payments.session_reference(session_id).await?;
        self.confirmation
            .confirm(caller, booking_id, Some(&reference))
            .await
    }

    /// Force completion of a ride's open bookings regardless of its schedule.
    pub async fn complete_ride(&self, caller: &Caller, ride_id: Uuid) -> BookingResult<RideCompletion> {
        let ride = self.managed_ride(caller, ride_id).await?;
        self.finish_ride(&ride).await
    }

    /// Like [`BookingService::complete_ride`], but only once the ride has ended.
    pub async fn ensure_ride_completed(
        &self,
        caller: &Caller,
        ride_id: Uuid,
        now: DateTime<Utc>,
    ) -> BookingResult<RideCompletion> {
        let ride = self.managed_ride(caller, ride_id).await?;

        if !ride.has_ended(now) {
            return Err(BookingError::RideNotEnded(ride.id));
        }
        self.finish_ride(&ride).await
    }

    /// Manually complete a single confirmed booking.
    pub async fn complete_booking(&self, caller: &Caller, booking_id: Uuid) -> BookingResult<Booking> {
        let booking = self.booking(booking_id).await?;
        let ride = self.managed_ride(caller, booking.ride_id).await?;

        if booking.status != BookingStatus::Confirmed {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Completed,
            });
        }

        let completed = self
            .store
            .complete_booking(booking.id, &[BookingStatus::Confirmed])
            .await?
            .ok_or(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Completed,
            })?;

        info!(%booking_id, "Booking completed manually");
        self.emitter
            .emit(LifecycleKind::BookingCompleted, completed.parties(&ride));

        Ok(completed)
    }

    /// Paid bookings across every ride the caller drives.
    pub async fn driver_statement(&self, caller: &Caller) -> BookingResult<DriverStatement> {
        let rides = self.store.list_rides_for_owner(caller.user_id).await?;
        let mut entries = Vec::with_capacity(rides.len());

        for ride in rides {
            let bookings = self.store.list_bookings_for_ride(ride.id).await?;
            entries.push((ride, bookings));
        }

        build_statement(caller.user_id, &self.fares, &entries)
    }

    async fn finish_ride(&self, ride: &Ride) -> BookingResult<RideCompletion> {
        let outcome = self.completer.complete(ride).await?;

        if outcome.is_partial() {
            return Err(BookingError::SweepPartialFailure {
                ride_id: outcome.ride_id,
                completed: outcome.completed.len(),
                failed: outcome.failed,
            });
        }
        Ok(outcome)
    }

    async fn payable(&self, caller: &Caller, booking_id: Uuid) -> BookingResult<(Booking, Ride)> {
        let booking = self.booking(booking_id).await?;
        authorize_requester(caller, &booking)?;

        if !matches!(booking.status, BookingStatus::Accepted | BookingStatus::Paid) {
            return Err(BookingError::InvalidTransition {
                from: booking.status,
                to: BookingStatus::Confirmed,
            });
        }

        let ride = self.ride(booking.ride_id).await?;
        Ok((booking, ride))
    }

    async fn stamp_initiated(&self, booking: &Booking, now: DateTime<Utc>) -> BookingResult<()> {
        if booking.payment_initiated_at.is_none() {
            self.store
                .record_payment_initiated(booking.id, now.max(booking.last_stamp()))
                .await?;
        }
        Ok(())
    }

    fn charge(&self, booking: &Booking, ride: &Ride) -> BookingResult<ChargeRequest> {
        let fare = self.fares.quote(ride.price_minor, booking.seats_requested)?;

        Ok(ChargeRequest {
            booking_id: booking.id,
            ride_id: ride.id,
            amount_minor: fare.total_minor,
            currency: fare.currency,
            description: format!(
                "{} seat(s) {} to {}",
                booking.seats_requested, ride.from_location, ride.to_location
            ),
        })
    }

    async fn managed_ride(&self, caller: &Caller, ride_id: Uuid) -> BookingResult<Ride> {
        let ride = self.ride(ride_id).await?;
        if !caller.can_manage(&ride) {
            return Err(BookingError::Forbidden(
                "only the ride owner or staff can complete a ride".to_string(),
            ));
        }
        Ok(ride)
    }

    async fn booking(&self, id: Uuid) -> BookingResult<Booking> {
        self.store
            .get_booking(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("booking {}", id)))
    }

    async fn ride(&self, id: Uuid) -> BookingResult<Ride> {
        self.store
            .get_ride(id)
            .await?
            .ok_or_else(|| BookingError::NotFound(format!("ride {}", id)))
    }
}

fn authorize_requester(caller: &Caller, booking: &Booking) -> BookingResult<()> {
    if booking.requester_id == caller.user_id {
        Ok(())
    } else {
        Err(BookingError::Forbidden(
            "only the requester can pay for a booking".to_string(),
        ))
    }
}
