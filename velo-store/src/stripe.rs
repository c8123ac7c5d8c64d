use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use velo_core::payment::{ChargeRequest, CheckoutSession, PaymentAdapter, PaymentHandle};

use crate::app_config::StripeConfig;

const DEFAULT_API_BASE: &str = "https://api.stripe.com";

#[derive(Debug, Deserialize)]
struct IntentResponse {
    id: String,
    client_secret: Option<String>,
    amount: i64,
    currency: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: Option<String>,
}

/// Stripe processor adapter over its form-encoded REST API.
pub struct StripeAdapter {
    client: Client,
    secret_key: String,
    api_base: String,
    success_url: String,
    cancel_url: String,
    reference_prefix: String,
}

impl StripeAdapter {
    pub fn new(config: &StripeConfig, reference_prefix: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            secret_key: config.secret_key.clone(),
            api_base: config
                .api_base
                .clone()
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
                .trim_end_matches('/')
                .to_string(),
            success_url: config.success_url.clone(),
            cancel_url: config.cancel_url.clone(),
            reference_prefix: reference_prefix.into(),
        }
    }

    fn metadata(charge: &ChargeRequest) -> Vec<(&'static str, String)> {
        vec![
            ("metadata[booking_id]", charge.booking_id.to_string()),
            ("metadata[ride_id]", charge.ride_id.to_string()),
        ]
    }

    async fn read<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, Box<dyn std::error::Error + Send + Sync>> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|body| body.error.message)
            .unwrap_or_else(|| "no error message".to_string());
        Err(format!("Stripe returned {}: {}", status, message).into())
    }
}

#[async_trait]
impl PaymentAdapter for StripeAdapter {
    fn reference_prefix(&self) -> &str {
        &self.reference_prefix
    }

    async fn create_intent(
        &self,
        charge: &ChargeRequest,
    ) -> Result<PaymentHandle, Box<dyn std::error::Error + Send + Sync>> {
        let mut form = vec![
            ("amount", charge.amount_minor.to_string()),
            ("currency", charge.currency.clone()),
            ("description", charge.description.clone()),
            ("automatic_payment_methods[enabled]", "true".to_string()),
        ];
        form.extend(Self::metadata(charge));

        let response = self
            .client
            .post(format!("{}/v1/payment_intents", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let intent: IntentResponse = Self::read(response).await?;
        debug!(intent_id = %intent.id, "Stripe payment intent created");

        Ok(PaymentHandle {
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount_minor: intent.amount,
            currency: intent.currency,
        })
    }

    async fn create_checkout_session(
        &self,
        charge: &ChargeRequest,
    ) -> Result<CheckoutSession, Box<dyn std::error::Error + Send + Sync>> {
        let mut form = vec![
            ("mode", "payment".to_string()),
            ("success_url", self.success_url.clone()),
            ("cancel_url", self.cancel_url.clone()),
            ("client_reference_id", charge.booking_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("line_items[0][price_data][currency]", charge.currency.clone()),
            ("line_items[0][price_data][unit_amount]", charge.amount_minor.to_string()),
            ("line_items[0][price_data][product_data][name]", charge.description.clone()),
        ];
        form.extend(Self::metadata(charge));

        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .form(&form)
            .send()
            .await?;
        let session: SessionResponse = Self::read(response).await?;

        let url = session.url.ok_or("Stripe checkout session has no url")?;
        Ok(CheckoutSession {
            session_id: session.id,
            url,
        })
    }

    async fn session_payment_reference(
        &self,
        session_id: &str,
    ) -> Result<Option<String>, Box<dyn std::error::Error + Send + Sync>> {
        let response = self
            .client
            .get(format!("{}/v1/checkout/sessions/{}", self.api_base, session_id))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;
        let session: SessionResponse = Self::read(response).await?;

        if session.payment_status.as_deref() != Some("paid") {
            return Ok(None);
        }
        Ok(session.payment_intent)
    }
}
