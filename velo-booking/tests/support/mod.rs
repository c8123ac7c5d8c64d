#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;
use velo_booking::{BookingService, Decision, FarePolicy, LifecycleDispatcher, MockPaymentAdapter};
use velo_core::identity::{Caller, Role};
use velo_core::model::{Booking, Ride};
use velo_core::notify::{EmailMessage, EmailSink, Notification, NotificationSink};
use velo_core::repository::BookingStore;
use velo_store::InMemoryBookingStore;

#[derive(Default)]
pub struct RecordingNotifications {
    pub sent: Mutex<Vec<Notification>>,
    pub failing: AtomicBool,
    pub attempts: AtomicUsize,
}

#[async_trait]
impl NotificationSink for RecordingNotifications {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err("notifications table unavailable".into());
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEmails {
    pub sent: Mutex<Vec<EmailMessage>>,
    pub failing: AtomicBool,
    pub attempts: AtomicUsize,
}

#[async_trait]
impl EmailSink for RecordingEmails {
    async fn send(&self, email: &EmailMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err("mail relay refused connection".into());
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

/// What the dispatcher delivered once every producer was dropped.
pub struct Delivered {
    pub notifications: Vec<Notification>,
    pub emails: Vec<EmailMessage>,
    /// Delivery calls made, failed ones included.
    pub attempts: usize,
}

impl Delivered {
    pub fn titles_for(&self, user_id: Uuid) -> Vec<String> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.title.clone())
            .collect()
    }

    pub fn messages_for(&self, user_id: Uuid) -> Vec<String> {
        self.notifications
            .iter()
            .filter(|n| n.user_id == user_id)
            .map(|n| n.message.clone())
            .collect()
    }
}

pub struct Harness {
    pub store: Arc<InMemoryBookingStore>,
    pub adapter: Arc<MockPaymentAdapter>,
    pub service: Arc<BookingService>,
    notifications: Arc<RecordingNotifications>,
    emails: Arc<RecordingEmails>,
    dispatcher: JoinHandle<()>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryBookingStore::new());
        let adapter = Arc::new(MockPaymentAdapter::new());
        let notifications = Arc::new(RecordingNotifications::default());
        let emails = Arc::new(RecordingEmails::default());

        let (emitter, dispatcher) =
            LifecycleDispatcher::new(notifications.clone(), emails.clone()).spawn();
        let service = Arc::new(BookingService::new(
            store.clone(),
            adapter.clone(),
            emitter,
            FarePolicy::default(),
        ));

        Self {
            store,
            adapter,
            service,
            notifications,
            emails,
            dispatcher,
        }
    }

    /// Drop every producer and wait for the dispatcher to drain.
    ///
    /// Sweepers obtained from the service must be dropped first.
    pub async fn settle(self) -> Delivered {
        drop(self.service);
        self.dispatcher.await.unwrap();

        Delivered {
            notifications: self.notifications.sent.lock().unwrap().clone(),
            emails: self.emails.sent.lock().unwrap().clone(),
            attempts: self.notifications.attempts.load(Ordering::SeqCst)
                + self.emails.attempts.load(Ordering::SeqCst),
        }
    }

    /// Make every notification and email delivery fail from now on.
    pub fn fail_deliveries(&self) {
        self.notifications.failing.store(true, Ordering::SeqCst);
        self.emails.failing.store(true, Ordering::SeqCst);
    }

    pub async fn ride(&self, owner: &Caller, seats: u32, ended: bool) -> Ride {
        let departure_at = if ended {
            Utc::now() - Duration::hours(4)
        } else {
            Utc::now() + Duration::hours(4)
        };
        let ride = Ride {
            id: Uuid::new_v4(),
            owner_id: owner.user_id,
            owner_email: Some(owner.email.clone()),
            driver_name: Some(owner.name.clone()),
            from_location: "Pune".to_string(),
            to_location: "Mumbai".to_string(),
            departure_at,
            estimated_completion_at: Some(departure_at + Duration::hours(3)),
            seats_available: seats,
            price_minor: 50_000,
        };
        self.store.insert_ride(ride.clone()).await;
        ride
    }

    pub async fn accepted(&self, owner: &Caller, passenger: &Caller, ride: &Ride, seats: i32) -> Booking {
        let booking = self
            .service
            .request_booking(passenger, ride.id, Some(seats))
            .await
            .unwrap();
        self.service
            .decide(owner, booking.id, Decision::Accept)
            .await
            .unwrap()
    }

    pub async fn confirmed(&self, owner: &Caller, passenger: &Caller, ride: &Ride, seats: i32) -> Booking {
        let booking = self.accepted(owner, passenger, ride, seats).await;
        let reference = format!("pi_{}", Uuid::new_v4().simple());
        self.service
            .confirm_payment(passenger, booking.id, Some(&reference))
            .await
            .unwrap()
            .booking
    }

    pub async fn booking(&self, id: Uuid) -> Booking {
        self.store.get_booking(id).await.unwrap().unwrap()
    }

    pub async fn seats_left(&self, ride_id: Uuid) -> u32 {
        self.store.get_ride(ride_id).await.unwrap().unwrap().seats_available
    }
}

pub fn user(name: &str) -> Caller {
    Caller::new(
        Uuid::new_v4(),
        name,
        format!("{}@example.com", name.to_lowercase()),
        Role::User,
    )
}

pub fn staff(name: &str, role: Role) -> Caller {
    Caller::new(
        Uuid::new_v4(),
        name,
        format!("{}@example.com", name.to_lowercase()),
        role,
    )
}
