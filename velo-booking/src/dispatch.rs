use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use velo_core::notify::{
    EmailMessage, EmailSink, EmailTemplate, EventPublisher, Notification, NotificationCategory,
    NotificationSink,
};
use velo_shared::{BookingParties, LifecycleEvent, LifecycleKind, Masked};

const PASSENGER_BOOKINGS: &str = "/my-bookings";
const PASSENGER_RIDES: &str = "/my-rides";
const HOSTED_RIDES: &str = "/hosted";

/// Cloneable handle producers use to hand lifecycle events to the dispatcher.
///
/// Emitting never blocks and never fails the caller.
#[derive(Clone)]
pub struct EventEmitter {
    tx: mpsc::UnboundedSender<LifecycleEvent>,
}

impl EventEmitter {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<LifecycleEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn emit(&self, kind: LifecycleKind, parties: BookingParties) {
        let event = LifecycleEvent::new(kind, parties);
        let booking_id = event.booking_id();
        let topic = event.topic();

        if self.tx.send(event).is_err() {
            warn!(%booking_id, topic, "Lifecycle dispatcher is gone, event dropped");
        }
    }
}

/// Everything one event turns into.
#[derive(Debug, Default, PartialEq)]
pub struct DeliveryPlan {
    pub notifications: Vec<Notification>,
    pub emails: Vec<EmailMessage>,
}

impl DeliveryPlan {
    fn notify(&mut self, user_id: uuid::Uuid, title: &str, message: &str, category: NotificationCategory, link: &str) {
        self.notifications
            .push(Notification::new(user_id, title, message, category, link));
    }

    fn email(&mut self, to: Option<&Masked<String>>, template: EmailTemplate, subject: &str, context: serde_json::Value) {
        match to {
            Some(address) if !address.is_blank() => self.emails.push(EmailMessage {
                to: address.clone(),
                subject: subject.to_string(),
                template,
                context,
            }),
            _ => debug!(?template, "No address on file, email skipped"),
        }
    }
}

/// Map an event to the notifications and emails it triggers.
pub fn plan(event: &LifecycleEvent) -> DeliveryPlan {
    let p = &event.parties;
    let requester_email = Some(&p.requester_email);
    let owner_email = p.owner_email.as_ref();
    let context = booking_context(p);
    let mut plan = DeliveryPlan::default();

    match &event.kind {
        LifecycleKind::BookingRequested => {
            plan.notify(
                p.requester_id,
                "Booking Requested",
                "Your booking request has been sent to the ride host.",
                NotificationCategory::Booking,
                PASSENGER_BOOKINGS,
            );
            plan.notify(
                p.owner_id,
                "New Booking Request",
                "You have a new booking request for your ride.",
                NotificationCategory::Booking,
                HOSTED_RIDES,
            );
            plan.email(owner_email, EmailTemplate::BookingRequestedToHost, "New booking request for your ride", context);
        }
        LifecycleKind::BookingAccepted => {
            plan.notify(
                p.requester_id,
                "Booking Accepted",
                "Your booking has been accepted by the host.",
                NotificationCategory::Booking,
                PASSENGER_BOOKINGS,
            );
            plan.email(requester_email, EmailTemplate::BookingAccepted, "Your booking was accepted", context);
        }
        LifecycleKind::BookingRejected => {
            plan.notify(
                p.requester_id,
                "Booking Rejected",
                "Unfortunately, your booking was rejected by the host.",
                NotificationCategory::Booking,
                PASSENGER_BOOKINGS,
            );
            plan.email(requester_email, EmailTemplate::BookingRejected, "Your booking was rejected", context);
        }
        LifecycleKind::PaymentFailed { reason } => {
            plan.notify(
                p.requester_id,
                "Payment Failed",
                reason.message(),
                NotificationCategory::Payment,
                PASSENGER_BOOKINGS,
            );
        }
        LifecycleKind::BookingConfirmed { fare } => {
            plan.notify(
                p.requester_id,
                "Payment Successful",
                "Your payment was successful and booking is confirmed.",
                NotificationCategory::Payment,
                PASSENGER_BOOKINGS,
            );
            plan.notify(
                p.owner_id,
                "Passenger Paid",
                "A passenger has paid for a booking on your ride.",
                NotificationCategory::Payment,
                HOSTED_RIDES,
            );

            let mut invoice = context.clone();
            invoice["fare"] = json!(fare);
            plan.email(requester_email, EmailTemplate::RideConfirmed, "Your ride is confirmed", context.clone());
            plan.email(requester_email, EmailTemplate::Invoice, "Invoice for your ride", invoice);
            plan.email(owner_email, EmailTemplate::PassengerPaid, "A passenger paid for your ride", context);
        }
        LifecycleKind::BookingCompleted => {
            plan.notify(
                p.requester_id,
                "Ride Completed",
                "Your ride is completed. Please rate your driver.",
                NotificationCategory::Ride,
                PASSENGER_RIDES,
            );
            plan.notify(
                p.owner_id,
                "Ride Completed",
                "Your ride is completed. Please rate your passengers.",
                NotificationCategory::Ride,
                HOSTED_RIDES,
            );
            plan.email(requester_email, EmailTemplate::RatingRequestPassenger, "How was your ride?", context.clone());
            plan.email(owner_email, EmailTemplate::RatingRequestDriver, "Rate your passengers", context);
        }
    }

    plan
}

fn booking_context(p: &BookingParties) -> serde_json::Value {
    json!({
        "booking_id": p.booking_id,
        "ride_id": p.ride_id,
        "passenger_name": p.requester_name,
        "driver_name": p.driver_name,
        "from": p.from_location,
        "to": p.to_location,
        "departure_at": p.departure_at.to_rfc3339(),
        "seats": p.seats,
        "transaction_id": p.transaction_id,
    })
}

/// Background consumer delivering lifecycle events to the configured sinks.
pub struct LifecycleDispatcher {
    notifications: Arc<dyn NotificationSink>,
    emails: Arc<dyn EmailSink>,
    publisher: Option<Arc<dyn EventPublisher>>,
}

impl LifecycleDispatcher {
    pub fn new(notifications: Arc<dyn NotificationSink>, emails: Arc<dyn EmailSink>) -> Self {
        Self {
            notifications,
            emails,
            publisher: None,
        }
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Start the delivery task.
    ///
    /// The task ends once every emitter clone has been dropped and the queue is drained.
    pub fn spawn(self) -> (EventEmitter, JoinHandle<()>) {
        let (emitter, mut rx) = EventEmitter::channel();

        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                self.deliver(&event).await;
            }
            debug!("Lifecycle dispatcher stopped");
        });

        (emitter, handle)
    }

    /// Deliver one event. Failures are logged and never retried.
    pub async fn deliver(&self, event: &LifecycleEvent) {
        let booking_id = event.booking_id();
        let plan = plan(event);

        for notification in &plan.notifications {
            if let Err(e) = self.notifications.notify(notification).await {
                warn!(%booking_id, title = %notification.title, "Failed to store notification: {}", e);
            }
        }

        for email in &plan.emails {
            if let Err(e) = self.emails.send(email).await {
                warn!(%booking_id, template = ?email.template, "Failed to send email: {}", e);
            }
        }

        if let Some(publisher) = &self.publisher {
            match serde_json::to_string(event) {
                Ok(payload) => {
                    if let Err(e) = publisher
                        .publish(event.topic(), &booking_id.to_string(), &payload)
                        .await
                    {
                        warn!(%booking_id, topic = event.topic(), "Failed to publish event: {}", e);
                    }
                }
                Err(e) => warn!(%booking_id, "Failed to serialize event: {}", e),
            }
        }
    }
}
