use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;
use velo_core::payment::{ChargeRequest, CheckoutSession, PaymentAdapter, PaymentHandle};
use velo_core::{BookingError, BookingResult};

/// Thin layer over the processor adapter translating its failures into booking errors.
pub struct PaymentOrchestrator {
    adapter: Arc<dyn PaymentAdapter>,
}

impl PaymentOrchestrator {
    pub fn new(adapter: Arc<dyn PaymentAdapter>) -> Self {
        Self { adapter }
    }

    pub fn reference_prefix(&self) -> &str {
        self.adapter.reference_prefix()
    }

    /// Initialize a payment intent for a booking
    pub async fn initialize_payment(&self, charge: &ChargeRequest) -> BookingResult<PaymentHandle> {
        let handle = self.adapter.create_intent(charge).await.map_err(|e| {
            warn!(booking_id = %charge.booking_id, "Payment intent creation failed: {}", e);
            BookingError::UpstreamFailure(e.to_string())
        })?;

        info!(booking_id = %charge.booking_id, intent_id = %handle.intent_id, amount = handle.amount_minor, "Payment intent created");
        Ok(handle)
    }

    pub async fn open_checkout(&self, charge: &ChargeRequest) -> BookingResult<CheckoutSession> {
        let session = self.adapter.create_checkout_session(charge).await.map_err(|e| {
            warn!(booking_id = %charge.booking_id, "Checkout session creation failed: {}", e);
            BookingError::UpstreamFailure(e.to_string())
        })?;

        info!(booking_id = %charge.booking_id, session_id = %session.session_id, "Checkout session created");
        Ok(session)
    }

    /// Payment reference of a paid checkout session.
    pub async fn session_reference(&self, session_id: &str) -> BookingResult<String> {
        let reference = self
            .adapter
            .session_payment_reference(session_id)
            .await
            .map_err(|e| BookingError::UpstreamFailure(e.to_string()))?;

        reference.ok_or_else(|| BookingError::InvalidPayment("payment not completed".to_string()))
    }
}

/// In-process processor used by tests and local runs.
pub struct MockPaymentAdapter {
    prefix: String,
    fail: AtomicBool,
    // session id -> payment reference, once paid
    sessions: Mutex<HashMap<String, Option<String>>>,
}

impl MockPaymentAdapter {
    pub fn new() -> Self {
        Self::with_prefix("pi_")
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            fail: AtomicBool::new(false),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Make every subsequent processor call fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Simulate the passenger paying on the hosted page. Returns the issued reference.
    pub fn complete_session(&self, session_id: &str) -> Option<String> {
        let mut sessions = self.sessions.lock().ok()?;
        let slot = sessions.get_mut(session_id)?;
        let reference = format!("{}mock_{}", self.prefix, Uuid::new_v4().simple());
        *slot = Some(reference.clone());
        Some(reference)
    }

    fn check_available(&self) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        if self.fail.load(Ordering::SeqCst) {
            return Err("Simulated Payment Gateway Failure".into());
        }
        Ok(())
    }
}

impl Default for MockPaymentAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentAdapter for MockPaymentAdapter {
    fn reference_prefix(&self) -> &str {
        &self.prefix
    }

    async fn create_intent(
        &self,
        charge: &ChargeRequest,
    ) -> Result<PaymentHandle, Box<dyn std::error::Error + Send + Sync>> {
        self.check_available()?;

        Ok(PaymentHandle {
            intent_id: format!("{}mock_{}", self.prefix, charge.booking_id.simple()),
            client_secret: Some(format!("mock_secret_{}", Uuid::new_v4().simple())),
            amount_minor: charge.amount_minor,
            currency: charge.currency.clone(),
        })
    }

    async fn create_checkout_session(
        &self,
        charge: &ChargeRequest,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>> {
        self.check_available()?;

        let session_id = format!("cs_mock_{}", Uuid::new_v4().simple());
        self.sessions
            .lock()
            .map_err(|_| "session registry poisoned")?
            .insert(session_id.clone(), None);

        Ok(CheckoutSession {
            url: format!("https://checkout.mock/{}?booking={}", session_id, charge.booking_id),
            session_id,
        })
    }

    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        self.check_available()?;

        let sessions = self.sessions.lock().map_err(|_| "session registry poisoned")?;
        match sessions.get(session_id) {
            Some(reference) => Ok(reference.clone()),
            None => Err(format!("No such checkout session: {}", session_id).into()),
        }
    }
}
