use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;
use velo_shared::{BookingParties, Masked};

/// Booking status in the lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Request sent to the ride owner
    Pending,
    /// Approved by the owner, awaiting passenger payment
    Accepted,
    Rejected,
    /// Payment accepted but seats not yet confirmed. Legacy, nothing in this codebase produces it.
    Paid,
    /// Payment verified and seats deducted
    Confirmed,
    Completed,
}

impl BookingStatus {
    pub const ALL: [BookingStatus; 6] = [
        BookingStatus::Pending,
        BookingStatus::Accepted,
        BookingStatus::Rejected,
        BookingStatus::Paid,
        BookingStatus::Confirmed,
        BookingStatus::Completed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Accepted => "ACCEPTED",
            BookingStatus::Rejected => "REJECTED",
            BookingStatus::Paid => "PAID",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Rejected | BookingStatus::Completed)
    }

    /// Statuses that may carry a payment reference.
    pub fn allows_transaction(&self) -> bool {
        matches!(
            self,
            BookingStatus::Paid | BookingStatus::Confirmed | BookingStatus::Completed
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown booking status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for BookingStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BookingStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| UnknownStatus(s.to_string()))
    }
}

/// A passenger's request for seats on a ride. Never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    pub id: Uuid,
    pub ride_id: Uuid,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_email: Masked<String>,
    pub status: BookingStatus,
    pub seats_requested: u32,
    pub transaction_id: Option<String>,
    pub requested_at: DateTime<Utc>,
    pub payment_initiated_at: Option<DateTime<Utc>>,
    pub payment_completed_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl Booking {
    pub fn new(
        ride_id: Uuid,
        requester_id: Uuid,
        requester_name: String,
        requester_email: Masked<String>,
        seats_requested: Option<i32>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            ride_id,
            requester_id,
            requester_name,
            requester_email,
            status: BookingStatus::Pending,
            seats_requested: normalize_seats(seats_requested),
            transaction_id: None,
            requested_at: Utc::now(),
            payment_initiated_at: None,
            payment_completed_at: None,
            confirmed_at: None,
        }
    }

    /// Latest timestamp recorded so far; later stamps are never set before it.
    pub fn last_stamp(&self) -> DateTime<Utc> {
        [self.payment_initiated_at, self.payment_completed_at, self.confirmed_at]
            .into_iter()
            .flatten()
            .fold(self.requested_at, |latest, at| latest.max(at))
    }

    /// Stamps `payment_initiated_at` once. Returns false when it was already set.
    pub fn mark_payment_initiated(&mut self, now: DateTime<Utc>) -> bool {
        if self.payment_initiated_at.is_some() {
            return false;
        }
        self.payment_initiated_at = Some(now.max(self.last_stamp()));
        true
    }

    /// Records the accepted payment reference and its completion/confirmation stamps.
    ///
    /// Status is left to the state machine.
    pub fn record_payment(&mut self, transaction_id: String, now: DateTime<Utc>) {
        let at = now.max(self.last_stamp());
        self.transaction_id = Some(transaction_id);
        self.payment_completed_at.get_or_insert(at);
        self.confirmed_at.get_or_insert(at);
    }

    pub fn parties(&self, ride: &Ride) -> BookingParties {
        BookingParties {
            booking_id: self.id,
            ride_id: ride.id,
            requester_id: self.requester_id,
            requester_name: self.requester_name.clone(),
            requester_email: self.requester_email.clone(),
            owner_id: ride.owner_id,
            owner_email: ride.owner_email.clone(),
            driver_name: ride.driver_name.clone(),
            from_location: ride.from_location.clone(),
            to_location: ride.to_location.clone(),
            departure_at: ride.departure_at,
            seats: self.seats_requested,
            transaction_id: self.transaction_id.clone(),
        }
    }
}

/// Seat counts of zero, negative or missing fall back to a single seat.
pub fn normalize_seats(requested: Option<i32>) -> u32 {
    match requested {
        Some(n) if n > 0 => n as u32,
        _ => 1,
    }
}

/// A driver-posted ride; the seat-bearing resource bookings compete for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ride {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub owner_email: Option<Masked<String>>,
    pub driver_name: Option<String>,
    pub from_location: String,
    pub to_location: String,
    pub departure_at: DateTime<Utc>,
    pub estimated_completion_at: Option<DateTime<Utc>>,
    pub seats_available: u32,
    /// Per-seat fare in minor currency units.
    pub price_minor: i64,
}

impl Ride {
    /// When the journey is considered over.
    pub fn effective_end_time(&self) -> DateTime<Utc> {
        self.estimated_completion_at.unwrap_or(self.departure_at)
    }

    pub fn has_ended(&self, now: DateTime<Utc>) -> bool {
        self.effective_end_time() <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn ride(departure_at: DateTime<Utc>, estimated: Option<DateTime<Utc>>) -> Ride {
        Ride {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            owner_email: None,
            driver_name: None,
            from_location: "Pune".to_string(),
            to_location: "Mumbai".to_string(),
            departure_at,
            estimated_completion_at: estimated,
            seats_available: 3,
            price_minor: 50_000,
        }
    }

    #[test]
    fn test_status_round_trips_through_text() {
        for status in BookingStatus::ALL {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert_eq!("confirmed".parse::<BookingStatus>().unwrap(), BookingStatus::Confirmed);
        assert!("CANCELLED".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_seats_default_to_one() {
        assert_eq!(normalize_seats(None), 1);
        assert_eq!(normalize_seats(Some(0)), 1);
        assert_eq!(normalize_seats(Some(-3)), 1);
        assert_eq!(normalize_seats(Some(4)), 4);
    }

    #[test]
    fn test_effective_end_prefers_estimated_completion() {
        let departure = Utc::now() - Duration::hours(3);
        let estimated = Utc::now() + Duration::hours(1);

        assert_eq!(ride(departure, Some(estimated)).effective_end_time(), estimated);
        assert_eq!(ride(departure, None).effective_end_time(), departure);
        assert!(!ride(departure, Some(estimated)).has_ended(Utc::now()));
        assert!(ride(departure, None).has_ended(Utc::now()));
    }

    #[test]
    fn test_payment_stamps_are_set_once_and_monotonic() {
        let mut booking = Booking::new(Uuid::new_v4(), Uuid::new_v4(), "Asha".into(), "a@x.io".into(), Some(2));
        let initiated = booking.requested_at + Duration::minutes(5);

        assert!(booking.mark_payment_initiated(initiated));
        assert!(!booking.mark_payment_initiated(initiated + Duration::minutes(1)));
        assert_eq!(booking.payment_initiated_at, Some(initiated));

        // A clock reading earlier than the last stamp is pulled forward.
        booking.record_payment("pi_123".to_string(), booking.requested_at);
        assert_eq!(booking.payment_completed_at, Some(initiated));
        assert_eq!(booking.confirmed_at, Some(initiated));
        assert_eq!(booking.transaction_id.as_deref(), Some("pi_123"));
    }
}
