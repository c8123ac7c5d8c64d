use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use velo_shared::Masked;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationCategory {
    Booking,
    Payment,
    Ride,
}

impl NotificationCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationCategory::Booking => "BOOKING",
            NotificationCategory::Payment => "PAYMENT",
            NotificationCategory::Ride => "RIDE",
        }
    }
}

/// An in-app notification shown in the user's inbox.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Notification {
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    pub category: NotificationCategory,
    pub link: String,
}

impl Notification {
    pub fn new(
        user_id: Uuid,
        title: &str,
        message: &str,
        category: NotificationCategory,
        link: &str,
    ) -> Self {
        Self {
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            category,
            link: link.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailTemplate {
    BookingRequestedToHost,
    BookingAccepted,
    BookingRejected,
    RideConfirmed,
    Invoice,
    PassengerPaid,
    RatingRequestPassenger,
    RatingRequestDriver,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    pub to: Masked<String>,
    pub subject: String,
    pub template: EmailTemplate,
    /// Template variables; rendering happens downstream.
    pub context: serde_json::Value,
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        notification: &Notification,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

#[async_trait]
pub trait EmailSink: Send + Sync {
    async fn send(&self, email: &EmailMessage) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Outbound event stream (Kafka in production).
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &str,
    ) -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}
