use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::fare::FareBreakdown;
use crate::pii::Masked;

/// Contact and route data of everyone a booking event concerns.
///
/// Denormalized at emission time so the dispatcher never has to read the store.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct BookingParties {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub requester_id: Uuid,
    pub requester_name: String,
    pub requester_email: Masked<String>,
    pub owner_id: Uuid,
    pub owner_email: Option<Masked<String>>,
    pub driver_name: Option<String>,
    pub from_location: String,
    pub to_location: String,
    pub departure_at: DateTime<Utc>,
    pub seats: u32,
    pub transaction_id: Option<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentFailureReason {
    InvalidReference,
    DuplicateTransaction,
    SeatsUnavailable,
}

impl PaymentFailureReason {
    /// Message shown to the passenger.
    pub fn message(&self) -> &'static str {
        match self {
            PaymentFailureReason::InvalidReference => "Invalid transaction ID provided.",
            PaymentFailureReason::DuplicateTransaction => "Duplicate transaction detected.",
            PaymentFailureReason::SeatsUnavailable => "Seats unavailable at the time of confirmation.",
        }
    }
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LifecycleKind {
    BookingRequested,
    BookingAccepted,
    BookingRejected,
    PaymentFailed { reason: PaymentFailureReason },
    BookingConfirmed { fare: FareBreakdown },
    BookingCompleted,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq)]
pub struct LifecycleEvent {
    pub event_id: Uuid,
    pub kind: LifecycleKind,
    pub parties: BookingParties,
    pub timestamp: i64,
}

impl LifecycleEvent {
    pub fn new(kind: LifecycleKind, parties: BookingParties) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            kind,
            parties,
            timestamp: Utc::now().timestamp(),
        }
    }

    /// Kafka topic the event is published on.
    pub fn topic(&self) -> &'static str {
        match self.kind {
            LifecycleKind::BookingRequested => "booking.requested",
            LifecycleKind::BookingAccepted => "booking.accepted",
            LifecycleKind::BookingRejected => "booking.rejected",
            LifecycleKind::PaymentFailed { .. } => "booking.payment_failed",
            LifecycleKind::BookingConfirmed { .. } => "booking.confirmed",
            LifecycleKind::BookingCompleted => "booking.completed",
        }
    }

    pub fn booking_id(&self) -> Uuid {
        self.parties.booking_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parties() -> BookingParties {
        BookingParties {
            booking_id: Uuid::new_v4(),
            ride_id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            requester_name: "Asha".to_string(),
            requester_email: Masked::from("asha@example.com"),
            owner_id: Uuid::new_v4(),
            owner_email: Some(Masked::from("driver@example.com")),
            driver_name: Some("Ravi".to_string()),
            from_location: "Pune".to_string(),
            to_location: "Mumbai".to_string(),
            departure_at: Utc::now(),
            seats: 2,
            transaction_id: None,
        }
    }

    #[test]
    fn test_event_payload_is_tagged() {
        let event = LifecycleEvent::new(
            LifecycleKind::PaymentFailed { reason: PaymentFailureReason::SeatsUnavailable },
            parties(),
        );
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"]["type"], "PAYMENT_FAILED");
        assert_eq!(json["kind"]["reason"], "SEATS_UNAVAILABLE");
        assert_eq!(json["parties"]["requester_email"], "asha@example.com");
        assert_eq!(event.topic(), "booking.payment_failed");
    }
}
