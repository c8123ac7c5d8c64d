use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::{BookingResult, FareBreakdown};

use crate::fare::FarePolicy;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StatementLine {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub passenger_name: String,
    pub from_location: String,
    pub to_location: String,
    pub paid_at: Option<DateTime<Utc>>,
    pub seats: u32,
    pub transaction_id: String,
    pub fare: FareBreakdown,
}

/// Earnings of one driver across all their rides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DriverStatement {
    pub driver_id: Uuid,
    pub currency: String,
    pub lines: Vec<StatementLine>,
    pub gross_minor: i64,
    pub platform_fee_minor: i64,
    pub tax_minor: i64,
    pub net_minor: i64,
}

/// Whether a booking has been paid for and belongs on the driver's statement.
pub fn is_settled(booking: &Booking) -> bool {
    booking.transaction_id.is_some()
        && (matches!(booking.status, BookingStatus::Confirmed | BookingStatus::Paid)
            || booking.payment_completed_at.is_some())
}

pub fn build_statement(
    driver_id: Uuid,
    fares: &FarePolicy,
    rides: &[(Ride, Vec<Booking>)],
) -> BookingResult<DriverStatement> {
    let lines = rides
        .iter()
        .flat_map(|(ride, bookings)| {
            bookings
                .iter()
                .filter(|b| is_settled(b))
                .map(move |b| line(fares, ride, b))
        })
        .collect::<BookingResult<Vec<StatementLine>>>()?;

    Ok(DriverStatement {
        driver_id,
        currency: fares.currency.clone(),
        gross_minor: lines.iter().map(|l| l.fare.fare_minor).sum(),
        platform_fee_minor: lines.iter().map(|l| l.fare.platform_fee_minor).sum(),
        tax_minor: lines.iter().map(|l| l.fare.tax_minor()).sum(),
        net_minor: lines.iter().map(|l| l.fare.driver_net_minor).sum(),
        lines,
    })
}

fn line(fares: &FarePolicy, ride: &Ride, booking: &Booking) -> BookingResult<StatementLine> {
    Ok(StatementLine {
        booking_id: booking.id,
        ride_id: ride.id,
        passenger_name: booking.requester_name.clone(),
        from_location: ride.from_location.clone(),
        to_location: ride.to_location.clone(),
        paid_at: booking.payment_completed_at,
        seats: booking.seats_requested,
        transaction_id: booking.transaction_id.clone().unwrap_or_default(),
        fare: fares.quote(ride.price_minor, booking.seats_requested)?,
    })
}
