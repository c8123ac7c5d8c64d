mod support;

use support::{user, Harness};
use velo_core::model::BookingStatus;
use velo_core::{BookingError, StoreError};

#[tokio::test]
async fn test_second_passenger_loses_the_last_seats() {
    let harness = Harness::new();
    let (driver, asha, bilal) = (user("Ravi"), user("Asha"), user("Bilal"));
    let ride = harness.ride(&driver, 3, false).await;

    let a = harness.accepted(&driver, &asha, &ride, 2).await;
    let b = harness.accepted(&driver, &bilal, &ride, 2).await;

    let outcome = harness
        .service
        .confirm_payment(&asha, a.id, Some("pi_A"))
        .await
        .unwrap();
    assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
    assert_eq!(outcome.fare.unwrap().total_minor, 108_780);
    assert_eq!(harness.seats_left(ride.id).await, 1);

    let err = harness
        .service
        .confirm_payment(&bilal, b.id, Some("pi_B"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::SeatsUnavailable { requested: 2, .. }));
    assert_eq!(err.reason(), "seats_unavailable");
    assert_eq!(harness.seats_left(ride.id).await, 1);

    let b = harness.booking(b.id).await;
    assert_eq!(b.status, BookingStatus::Accepted);
    assert_eq!(b.transaction_id, None);

    let delivered = harness.settle().await;
    assert!(delivered
        .messages_for(bilal.user_id)
        .contains(&"Seats unavailable at the time of confirmation.".to_string()));
    assert!(delivered.titles_for(asha.user_id).contains(&"Payment Successful".to_string()));
    assert!(delivered.titles_for(driver.user_id).contains(&"Passenger Paid".to_string()));
}

#[tokio::test]
async fn test_confirming_twice_decrements_once() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 4, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 2).await;

    let first = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_once"))
        .await
        .unwrap();
    let second = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_once"))
        .await
        .unwrap();

    assert!(!first.replayed);
    assert!(second.replayed);
    assert_eq!(second.booking.status, BookingStatus::Confirmed);
    assert_eq!(harness.seats_left(ride.id).await, 2);

    let delivered = harness.settle().await;
    let successes = delivered
        .titles_for(asha.user_id)
        .into_iter()
        .filter(|t| t == "Payment Successful")
        .count();
    assert_eq!(successes, 1);
}

#[tokio::test]
async fn test_reused_reference_is_rejected() {
    let harness = Harness::new();
    let (driver, asha, bilal) = (user("Ravi"), user("Asha"), user("Bilal"));
    let ride = harness.ride(&driver, 4, false).await;
    let a = harness.accepted(&driver, &asha, &ride, 1).await;
    let b = harness.accepted(&driver, &bilal, &ride, 1).await;

    harness
        .service
        .confirm_payment(&asha, a.id, Some("pi_shared"))
        .await
        .unwrap();
    let err = harness
        .service
        .confirm_payment(&bilal, b.id, Some("pi_shared"))
        .await
        .unwrap_err();

    assert!(matches!(err, BookingError::DuplicateTransaction));
    assert_eq!(harness.booking(b.id).await, b);
    assert_eq!(harness.seats_left(ride.id).await, 3);

    let delivered = harness.settle().await;
    assert_eq!(
        delivered.messages_for(bilal.user_id).last().map(String::as_str),
        Some("Duplicate transaction detected.")
    );
}

#[tokio::test]
async fn test_missing_and_malformed_references() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 4, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 1).await;

    let missing = harness.service.confirm_payment(&asha, booking.id, None).await;
    assert!(matches!(missing, Err(BookingError::InvalidPayment(_))));

    let blank = harness.service.confirm_payment(&asha, booking.id, Some("  ")).await;
    assert!(matches!(blank, Err(BookingError::InvalidPayment(_))));

    let malformed = harness
        .service
        .confirm_payment(&asha, booking.id, Some("ch_not_an_intent"))
        .await;
    assert!(matches!(malformed, Err(BookingError::InvalidPayment(_))));

    assert_eq!(harness.booking(booking.id).await.status, BookingStatus::Accepted);
    assert_eq!(harness.seats_left(ride.id).await, 4);

    // Only the malformed reference produces a failure notification.
    let delivered = harness.settle().await;
    let failures: Vec<_> = delivered
        .messages_for(asha.user_id)
        .into_iter()
        .filter(|m| m == "Invalid transaction ID provided.")
        .collect();
    assert_eq!(failures.len(), 1);
}

#[tokio::test]
async fn test_only_requester_may_confirm() {
    let harness = Harness::new();
    let (driver, asha, mallory) = (user("Ravi"), user("Asha"), user("Mallory"));
    let ride = harness.ride(&driver, 2, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 1).await;

    let err = harness
        .service
        .confirm_payment(&mallory, booking.id, Some("pi_x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));

    let err = harness
        .service
        .confirm_payment(&driver, booking.id, Some("pi_x"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
    assert_eq!(harness.seats_left(ride.id).await, 2);
}

#[tokio::test]
async fn test_pending_booking_cannot_be_confirmed() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 2, false).await;
    let booking = harness
        .service
        .request_booking(&asha, ride.id, None)
        .await
        .unwrap();
    assert_eq!(booking.seats_requested, 1);

    let err = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_early"))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        BookingError::InvalidTransition {
            from: BookingStatus::Pending,
            to: BookingStatus::Confirmed
        }
    ));
}

#[tokio::test]
async fn test_commit_conflict_rolls_back_seats() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 2, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 2).await;

    harness
        .store
        .fail_next_commit(StoreError::Conflict("uq_bookings_transaction_id".into()));

    let err = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_raced"))
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::DuplicateTransaction));
    assert_eq!(harness.seats_left(ride.id).await, 2);
    assert_eq!(harness.booking(booking.id).await.status, BookingStatus::Accepted);

    // The next attempt goes through normally.
    harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_retry"))
        .await
        .unwrap();
    assert_eq!(harness.seats_left(ride.id).await, 0);
}

#[tokio::test]
async fn test_paid_booking_can_be_confirmed() {
    use velo_core::repository::BookingStore;

    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 2, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 1).await;
    assert!(harness
        .store
        .transition_status(booking.id, BookingStatus::Accepted, BookingStatus::Paid)
        .await
        .unwrap());

    let outcome = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_paid"))
        .await
        .unwrap();
    assert_eq!(outcome.booking.status, BookingStatus::Confirmed);
    assert_eq!(harness.seats_left(ride.id).await, 1);
}

#[tokio::test]
async fn test_checkout_session_confirmation() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 3, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 2).await;

    let session = harness
        .service
        .create_checkout_session(&asha, booking.id)
        .await
        .unwrap();

    let unpaid = harness
        .service
        .confirm_checkout(&asha, booking.id, &session.session_id)
        .await;
    assert!(matches!(unpaid, Err(BookingError::InvalidPayment(_))));

    let reference = harness.adapter.complete_session(&session.session_id).unwrap();
    let outcome = harness
        .service
        .confirm_checkout(&asha, booking.id, &session.session_id)
        .await
        .unwrap();

    assert_eq!(outcome.booking.transaction_id.as_deref(), Some(reference.as_str()));
    assert!(outcome.booking.payment_initiated_at.is_some());
    assert!(outcome.booking.confirmed_at >= outcome.booking.payment_initiated_at);
    assert_eq!(harness.seats_left(ride.id).await, 1);
}

#[tokio::test]
async fn test_initiate_payment() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 3, false).await;

    let pending = harness
        .service
        .request_booking(&asha, ride.id, Some(2))
        .await
        .unwrap();
    let err = harness
        .service
        .initiate_payment(&asha, pending.id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::InvalidTransition { .. }));

    let booking = harness.accepted(&driver, &asha, &ride, 2).await;
    let handle = harness
        .service
        .initiate_payment(&asha, booking.id)
        .await
        .unwrap();
    assert!(handle.intent_id.starts_with("pi_"));
    assert_eq!(handle.amount_minor, 108_780);
    assert_eq!(handle.currency, "inr");

    let stamped = harness.booking(booking.id).await.payment_initiated_at;
    assert!(stamped.is_some());

    // A second initiation keeps the first stamp.
    harness.service.initiate_payment(&asha, booking.id).await.unwrap();
    assert_eq!(harness.booking(booking.id).await.payment_initiated_at, stamped);

    harness.adapter.set_failing(true);
    let err = harness
        .service
        .initiate_payment(&asha, booking.id)
        .await
        .unwrap_err();
    assert_eq!(err.reason(), "upstream_failure");
}

#[tokio::test]
async fn test_confirmed_checkout_replays_without_the_processor() {
    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = harness.ride(&driver, 3, false).await;
    let booking = harness.accepted(&driver, &asha, &ride, 1).await;

    let session = harness
        .service
        .create_checkout_session(&asha, booking.id)
        .await
        .unwrap();
    harness.adapter.complete_session(&session.session_id).unwrap();
    let first = harness
        .service
        .confirm_checkout(&asha, booking.id, &session.session_id)
        .await
        .unwrap();
    assert!(!first.replayed);

    harness.adapter.set_failing(true);
    let again = harness
        .service
        .confirm_checkout(&asha, booking.id, &session.session_id)
        .await
        .unwrap();

    assert!(again.replayed);
    assert_eq!(again.booking.status, BookingStatus::Confirmed);
    assert_eq!(again.booking.transaction_id, first.booking.transaction_id);
    assert_eq!(harness.seats_left(ride.id).await, 2);

    // Strangers are still refused before any replay.
    let err = harness
        .service
        .confirm_checkout(&driver, booking.id, &session.session_id)
        .await
        .unwrap_err();
    assert!(matches!(err, BookingError::Forbidden(_)));
}

#[tokio::test]
async fn test_out_of_range_fare_takes_no_seats() {
    use velo_core::model::Ride;

    let harness = Harness::new();
    let (driver, asha) = (user("Ravi"), user("Asha"));
    let ride = Ride {
        price_minor: i64::MAX / 2,
        ..harness.ride(&driver, 4, false).await
    };
    harness.store.insert_ride(ride.clone()).await;
    let booking = harness.accepted(&driver, &asha, &ride, 3).await;

    let err = harness
        .service
        .confirm_payment(&asha, booking.id, Some("pi_whale"))
        .await
        .unwrap_err();

    assert_eq!(err.reason(), "fare_out_of_range");
    assert_eq!(harness.seats_left(ride.id).await, 4);
    assert_eq!(harness.booking(booking.id).await.status, BookingStatus::Accepted);

    let err = harness.service.initiate_payment(&asha, booking.id).await.unwrap_err();
    assert!(matches!(err, BookingError::FareOutOfRange { seats: 3, .. }));
}
