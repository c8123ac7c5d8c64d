use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What the passenger's client needs to complete an on-page payment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PaymentHandle {
    pub intent_id: String, // Provider's ID (e.g., pi_123)
    pub client_secret: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

/// A hosted checkout page the passenger is redirected to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CheckoutSession {
    pub session_id: String,
    pub url: String,
}

/// Metadata attached to every charge so the processor dashboard can be reconciled against bookings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChargeRequest {
    pub booking_id: Uuid,
    pub ride_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub description: String,
}

#[async_trait]
pub trait PaymentAdapter: Send + Sync {
    /// Prefix every genuine payment reference issued by this processor starts with.
    fn reference_prefix(&self) -> &str;

    /// Create a payment intent with the provider
    async fn create_intent(
        &self,
        charge: &ChargeRequest,
    ) -> Result<PaymentHandle, Box<dyn std::error::Error + Send + Sync>>;

    /// Create a hosted checkout session
    async fn create_checkout_session(
        &self,
        charge: &ChargeRequest,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>>;

    /// Payment reference of a checkout session, `None` until the passenger has paid
    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>>;
}
