use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use uuid::Uuid;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::repository::{BookingStore, BookingTx, SeatLedger};
use velo_core::{StoreError, StoreResult};
use velo_shared::Masked;

use crate::database::store_error;

const BOOKING_COLUMNS: &str = "id, ride_id, requester_id, requester_name, requester_email, status, \
     seats_requested, transaction_id, requested_at, payment_initiated_at, payment_completed_at, confirmed_at";

const RIDE_COLUMNS: &str = "id, owner_id, owner_email, driver_name, from_location, to_location, \
     departure_at, estimated_completion_at, seats_available, price_minor";

// Internal structs for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    ride_id: Uuid,
    requester_id: Uuid,
    requester_name: String,
    requester_email: String,
    status: String,
    seats_requested: i32,
    transaction_id: Option<String>,
    requested_at: DateTime<Utc>,
    payment_initiated_at: Option<DateTime<Utc>>,
    payment_completed_at: Option<DateTime<Utc>>,
    confirmed_at: Option<DateTime<Utc>>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row
            .status
            .parse::<BookingStatus>()
            .map_err(|e| StoreError::Corrupt(format!("booking {}: {}", row.id, e)))?;
        let seats_requested = u32::try_from(row.seats_requested)
            .map_err(|_| StoreError::Corrupt(format!("booking {}: negative seat count", row.id)))?;

        Ok(Booking {
            id: row.id,
            ride_id: row.ride_id,
            requester_id: row.requester_id,
            requester_name: row.requester_name,
            requester_email: Masked(row.requester_email),
            status,
            seats_requested,
            transaction_id: row.transaction_id,
            requested_at: row.requested_at,
            payment_initiated_at: row.payment_initiated_at,
            payment_completed_at: row.payment_completed_at,
            confirmed_at: row.confirmed_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct RideRow {
    id: Uuid,
    owner_id: Uuid,
    owner_email: Option<String>,
    driver_name: Option<String>,
    from_location: String,
    to_location: String,
    departure_at: DateTime<Utc>,
    estimated_completion_at: Option<DateTime<Utc>>,
    seats_available: i32,
    price_minor: i64,
}

impl TryFrom<RideRow> for Ride {
    type Error = StoreError;

    fn try_from(row: RideRow) -> Result<Self, Self::Error> {
        let seats_available = u32::try_from(row.seats_available)
            .map_err(|_| StoreError::Corrupt(format!("ride {}: negative seat count", row.id)))?;

        Ok(Ride {
            id: row.id,
            owner_id: row.owner_id,
            owner_email: row.owner_email.map(Masked),
            driver_name: row.driver_name,
            from_location: row.from_location,
            to_location: row.to_location,
            departure_at: row.departure_at,
            estimated_completion_at: row.estimated_completion_at,
            seats_available,
            price_minor: row.price_minor,
        })
    }
}

fn status_texts(statuses: &[BookingStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

fn bookings(rows: Vec<BookingRow>) -> StoreResult<Vec<Booking>> {
    rows.into_iter().map(Booking::try_from).collect()
}

fn seat_param(seats: u32) -> StoreResult<i32> {
    i32::try_from(seats).map_err(|_| StoreError::Query(format!("seat count {} out of range", seats)))
}

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn begin(&self) -> StoreResult<Box<dyn BookingTx>> {
        let tx = self.pool.begin().await.map_err(store_error)?;
        Ok(Box::new(PgBookingTx { tx: Some(tx) }))
    }

    async fn insert_booking(&self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO bookings (id, ride_id, requester_id, requester_name, requester_email, status, seats_requested, requested_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(booking.id)
        .bind(booking.ride_id)
        .bind(booking.requester_id)
        .bind(&booking.requester_name)
        .bind(booking.requester_email.expose())
        .bind(booking.status.as_str())
        .bind(seat_param(booking.seats_requested)?)
        .bind(booking.requested_at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn get_ride(&self, id: Uuid) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error)?;

        row.map(Ride::try_from).transpose()
    }

    async fn transition_status(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
    ) -> StoreResult<bool> {
        let result = sqlx::query("UPDATE bookings SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .execute(&self.pool)
            .await
            .map_err(store_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn record_payment_initiated(&self, id: Uuid, at: DateTime<Utc>) -> StoreResult<()> {
        sqlx::query(
            "UPDATE bookings SET payment_initiated_at = $2 WHERE id = $1 AND payment_initiated_at IS NULL",
        )
        .bind(id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn list_bookings_for_ride(&self, ride_id: Uuid) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE ride_id = $1 ORDER BY requested_at",
            BOOKING_COLUMNS
        ))
        .bind(ride_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        bookings(rows)
    }

    async fn list_rides_for_owner(&self, owner_id: Uuid) -> StoreResult<Vec<Ride>> {
        let rows = sqlx::query_as::<_, RideRow>(&format!(
            "SELECT {} FROM rides WHERE owner_id = $1 ORDER BY departure_at",
            RIDE_COLUMNS
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Ride::try_from).collect()
    }

    async fn find_ended_ride_ids(
        &self,
        now: DateTime<Utc>,
        open: &[BookingStatus],
    ) -> StoreResult<Vec<Uuid>> {
        sqlx::query_scalar::<_, Uuid>(
            r#"
            SELECT r.id FROM rides r
            WHERE COALESCE(r.estimated_completion_at, r.departure_at) <= $1
              AND EXISTS (SELECT 1 FROM bookings b WHERE b.ride_id = r.id AND b.status = ANY($2))
            ORDER BY r.departure_at
            "#,
        )
        .bind(now)
        .bind(status_texts(open))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)
    }

    async fn complete_ride_bookings(
        &self,
        ride_id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Vec<Booking>> {
        let rows = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'COMPLETED' WHERE ride_id = $1 AND status = ANY($2) RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(ride_id)
        .bind(status_texts(from))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        bookings(rows)
    }

    async fn complete_booking(
        &self,
        id: Uuid,
        from: &[BookingStatus],
    ) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "UPDATE bookings SET status = 'COMPLETED' WHERE id = $1 AND status = ANY($2) RETURNING {}",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .bind(status_texts(from))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }
}

/// A Postgres transaction; rolled back by sqlx when dropped uncommitted.
pub struct PgBookingTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgBookingTx {
    fn conn(&mut self) -> StoreResult<&mut PgConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Query("transaction already committed".to_string()))
    }
}

#[async_trait]
impl SeatLedger for PgBookingTx {
    async fn conditional_decrement(&mut self, ride_id: Uuid, seats: u32) -> StoreResult<u64> {
        let seats = seat_param(seats)?;
        let result = sqlx::query(
            "UPDATE rides SET seats_available = seats_available - $2 WHERE id = $1 AND seats_available >= $2",
        )
        .bind(ride_id)
        .bind(seats)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl BookingTx for PgBookingTx {
    async fn lock_booking(&mut self, id: Uuid) -> StoreResult<Option<Booking>> {
        let row = sqlx::query_as::<_, BookingRow>(&format!(
            "SELECT {} FROM bookings WHERE id = $1 FOR UPDATE",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.conn()?)
        .await
        .map_err(store_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn ride(&mut self, id: Uuid) -> StoreResult<Option<Ride>> {
        let row = sqlx::query_as::<_, RideRow>(&format!("SELECT {} FROM rides WHERE id = $1", RIDE_COLUMNS))
            .bind(id)
            .fetch_optional(self.conn()?)
            .await
            .map_err(store_error)?;

        row.map(Ride::try_from).transpose()
    }

    async fn transaction_exists(&mut self, transaction_id: &str) -> StoreResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM bookings WHERE transaction_id = $1)")
            .bind(transaction_id)
            .fetch_one(self.conn()?)
            .await
            .map_err(store_error)
    }

    async fn save_booking(&mut self, booking: &Booking) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE bookings
            SET status = $2,
                transaction_id = $3,
                payment_initiated_at = $4,
                payment_completed_at = $5,
                confirmed_at = $6
            WHERE id = $1
            "#,
        )
        .bind(booking.id)
        .bind(booking.status.as_str())
        .bind(booking.transaction_id.as_deref())
        .bind(booking.payment_initiated_at)
        .bind(booking.payment_completed_at)
        .bind(booking.confirmed_at)
        .execute(self.conn()?)
        .await
        .map_err(store_error)?;

        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Query("transaction already committed".to_string()))?;

        tx.commit().await.map_err(store_error)
    }
}
