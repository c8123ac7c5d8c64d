use serde::{Deserialize, Serialize};
use tracing::info;
use velo_core::model::{Booking, BookingStatus};
use velo_core::{BookingError, BookingResult};

/// The owner's verdict on a pending request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Decision {
    Accept,
    Reject,
}

impl Decision {
    pub fn target(&self) -> BookingStatus {
        match self {
            Decision::Accept => BookingStatus::Accepted,
            Decision::Reject => BookingStatus::Rejected,
        }
    }
}

/// Manages booking status transitions
pub struct BookingStateMachine;

impl BookingStateMachine {
    /// Every edge of the booking lifecycle.
    pub fn can_transition(from: BookingStatus, to: BookingStatus) -> bool {
        use BookingStatus::*;

        matches!(
            (from, to),
            (Pending, Accepted)
                | (Pending, Rejected)
                | (Accepted, Confirmed)
                | (Accepted, Paid)
                | (Paid, Confirmed)
                | (Confirmed, Completed)
                | (Accepted, Completed)
                | (Paid, Completed)
        )
    }

    /// Fails with `InvalidTransition` unless `from -> to` is an edge.
    pub fn ensure(from: BookingStatus, to: BookingStatus) -> BookingResult<()> {
        if Self::can_transition(from, to) {
            Ok(())
        } else {
            Err(BookingError::InvalidTransition { from, to })
        }
    }

    /// Apply a transition in place. The booking is untouched on failure.
    pub fn apply(booking: &mut Booking, to: BookingStatus) -> BookingResult<()> {
        Self::ensure(booking.status, to)?;

        info!(booking_id = %booking.id, from = %booking.status, to = %to, "Booking transition");
        booking.status = to;
        Ok(())
    }

    /// Transition: PENDING → ACCEPTED | REJECTED
    pub fn decide(booking: &mut Booking, decision: Decision) -> BookingResult<()> {
        Self::apply(booking, decision.target())
    }

    /// Transition: ACCEPTED | PAID → CONFIRMED
    pub fn confirm(booking: &mut Booking) -> BookingResult<()> {
        Self::apply(booking, BookingStatus::Confirmed)
    }
}
