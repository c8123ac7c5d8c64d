use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};
use uuid::Uuid;
use velo_core::model::{Booking, BookingStatus, Ride};
use velo_core::repository::BookingStore;
use velo_core::StoreResult;
use velo_shared::LifecycleKind;

use crate::dispatch::EventEmitter;

/// Statuses the sweeper moves to COMPLETED once a ride has ended.
pub const SWEEPABLE: [BookingStatus; 3] = [
    BookingStatus::Accepted,
    BookingStatus::Paid,
    BookingStatus::Confirmed,
];

pub const MIN_SWEEP_PERIOD: Duration = Duration::from_secs(1);

/// Outcome of completing one ride's open bookings.
#[derive(Debug, Clone)]
pub struct RideCompletion {
    pub ride_id: Uuid,
    pub strategy: &'static str,
    pub completed: Vec<Booking>,
    /// Bookings the per-row path could not update.
    pub failed: Vec<Uuid>,
}

impl RideCompletion {
    pub fn is_partial(&self) -> bool {
        !self.failed.is_empty()
    }
}

#[async_trait]
pub trait CompletionStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, store: &dyn BookingStore, ride_id: Uuid) -> StoreResult<RideCompletion>;
}

/// One conditional update over all of a ride's open bookings.
pub struct BulkCompletion;

#[async_trait]
impl CompletionStrategy for BulkCompletion {
    fn name(&self) -> &'static str {
        "bulk"
    }

    async fn complete(&self, store: &dyn BookingStore, ride_id: Uuid) -> StoreResult<RideCompletion> {
        let completed = store.complete_ride_bookings(ride_id, &SWEEPABLE).await?;

        Ok(RideCompletion {
            ride_id,
            strategy: self.name(),
            completed,
            failed: Vec::new(),
        })
    }
}

/// Conditional update per booking, continuing past rows that fail.
pub struct PerRowCompletion;

#[async_trait]
impl CompletionStrategy for PerRowCompletion {
    fn name(&self) -> &'static str {
        "per_row"
    }

    async fn complete(&self, store: &dyn BookingStore, ride_id: Uuid) -> StoreResult<RideCompletion> {
        let candidates = store.list_bookings_for_ride(ride_id).await?;
        let mut completed = Vec::new();
        let mut failed = Vec::new();

        for booking in candidates.iter().filter(|b| SWEEPABLE.contains(&b.status)) {
            match store.complete_booking(booking.id, &SWEEPABLE).await {
                Ok(Some(done)) => completed.push(done),
                // Moved on concurrently; nothing to do.
                Ok(None) => {}
                Err(e) => {
                    warn!(%ride_id, booking_id = %booking.id, "Failed to complete booking: {}", e);
                    failed.push(booking.id);
                }
            }
        }

        Ok(RideCompletion {
            ride_id,
            strategy: self.name(),
            completed,
            failed,
        })
    }
}

/// Completes a ride's open bookings, bulk first with a per-row fallback.
pub struct RideCompleter {
    store: Arc<dyn BookingStore>,
    emitter: EventEmitter,
    primary: Box<dyn CompletionStrategy>,
    fallback: Box<dyn CompletionStrategy>,
}

impl RideCompleter {
    pub fn new(store: Arc<dyn BookingStore>, emitter: EventEmitter) -> Self {
        Self {
            store,
            emitter,
            primary: Box::new(BulkCompletion),
            fallback: Box::new(PerRowCompletion),
        }
    }

    /// Errors that are not row-recoverable are returned as-is and nothing is completed.
    pub async fn complete(&self, ride: &Ride) -> StoreResult<RideCompletion> {
        let outcome = match self.primary.complete(self.store.as_ref(), ride.id).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_row_recoverable() => {
                warn!(ride_id = %ride.id, strategy = self.fallback.name(), "Bulk completion failed, falling back: {}", e);
                self.fallback.complete(self.store.as_ref(), ride.id).await?
            }
            Err(e) => return Err(e),
        };

        info!(
            ride_id = %ride.id,
            strategy = outcome.strategy,
            completed = outcome.completed.len(),
            failed = outcome.failed.len(),
            "Ride bookings completed"
        );

        for booking in &outcome.completed {
            self.emitter
                .emit(LifecycleKind::BookingCompleted, booking.parties(ride));
        }

        Ok(outcome)
    }
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub rides: Vec<RideCompletion>,
    /// Rides skipped because of a non-recoverable store error.
    pub skipped: Vec<Uuid>,
}

impl SweepReport {
    pub fn completed_count(&self) -> usize {
        self.rides.iter().map(|r| r.completed.len()).sum()
    }

    pub fn failed_count(&self) -> usize {
        self.rides.iter().map(|r| r.failed.len()).sum()
    }
}

/// Periodic job forcing bookings of ended rides into COMPLETED.
#[derive(Clone)]
pub struct CompletionSweeper {
    store: Arc<dyn BookingStore>,
    completer: Arc<RideCompleter>,
}

impl CompletionSweeper {
    pub fn new(store: Arc<dyn BookingStore>, completer: Arc<RideCompleter>) -> Self {
        Self { store, completer }
    }

    /// One pass over every ride whose effective end time is at or before `now`.
    pub async fn run_once(&self, now: DateTime<Utc>) -> StoreResult<SweepReport> {
        let ride_ids = self.store.find_ended_ride_ids(now, &SWEEPABLE).await?;
        let mut report = SweepReport::default();

        for ride_id in ride_ids {
            let ride = match self.store.get_ride(ride_id).await {
                Ok(Some(ride)) => ride,
                Ok(None) => continue,
                Err(e) => {
                    error!(%ride_id, "Skipping ride, lookup failed: {}", e);
                    report.skipped.push(ride_id);
                    continue;
                }
            };

            match self.completer.complete(&ride).await {
                Ok(outcome) if outcome.completed.is_empty() && !outcome.is_partial() => {}
                Ok(outcome) => report.rides.push(outcome),
                Err(e) => {
                    error!(%ride_id, "Skipping ride, completion failed: {}", e);
                    report.skipped.push(ride_id);
                }
            }
        }

        info!(
            rides = report.rides.len(),
            completed = report.completed_count(),
            failed = report.failed_count(),
            skipped = report.skipped.len(),
            "Completion sweep finished"
        );
        Ok(report)
    }

    /// Sweep every `period` until `shutdown` resolves. The first sweep runs immediately.
    ///
    /// Periods shorter than [`MIN_SWEEP_PERIOD`] are raised to it.
    pub async fn run_periodic<F>(self, period: Duration, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        let period = period.max(MIN_SWEEP_PERIOD);
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        info!(period_secs = period.as_secs(), "Completion sweeper started");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Completion sweeper stopping");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.run_once(Utc::now()).await {
                        error!("Completion sweep failed: {}", e);
                    }
                }
            }
        }
    }
}
