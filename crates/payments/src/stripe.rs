//! Stripe Checkout client (webhook style).
//!
//! Checkout creates a Checkout Session priced with inline `price_data`
//! per course. Payment is confirmed by a `checkout.session.completed`
//! webhook signed with the endpoint secret.

use async_trait::async_trait;
use coursehub_core::signature::{verify_signature, DEFAULT_TOLERANCE_SECS};
use coursehub_core::types::MinorUnits;
use serde::Deserialize;

use crate::error::{ensure_success, ProviderError};
use crate::{CreatedPayment, LineItem, PaymentProvider, ProviderKind, WebhookEvent, WebhookProvider};

/// Default API base URL.
pub const DEFAULT_STRIPE_URL: &str = "https://api.stripe.com";

/// Event type that confirms a paid checkout.
pub const CHECKOUT_COMPLETED: &str = "checkout.session.completed";

#[derive(Debug, Clone)]
pub struct StripeConfig {
    pub api_secret: String,
    pub webhook_secret: String,
    pub success_url: String,
    pub cancel_url: String,
    /// Lower-case ISO 4217 currency code.
    pub currency: String,
    /// API base URL without trailing slash.
    pub base_url: String,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    id: String,
    mode: Option<String>,
}

#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    config: StripeConfig,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Form fields for a Checkout Session, one `price_data` line per item.
    fn session_form(&self, items: &[LineItem]) -> Vec<(String, String)> {
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("success_url".to_string(), self.config.success_url.clone()),
            ("cancel_url".to_string(), self.config.cancel_url.clone()),
        ];

        for (i, item) in items.iter().enumerate() {
            let prefix = format!("line_items[{i}]");
            form.push((format!("{prefix}[quantity]"), "1".to_string()));
            form.push((
                format!("{prefix}[price_data][currency]"),
                self.config.currency.to_lowercase(),
            ));
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.price.to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][tax_behavior]"),
                "inclusive".to_string(),
            ));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if !item.description.is_empty() {
                form.push((
                    format!("{prefix}[price_data][product_data][description]"),
                    item.description.clone(),
                ));
            }
            form.push((
                format!("{prefix}[price_data][product_data][metadata][course_id]"),
                item.course_id.to_string(),
            ));
        }

        form
    }

    /// Verify and decode a webhook at an explicit clock reading.
    fn parse_webhook_at(
        &self,
        raw_body: &[u8],
        signature_header: &str,
        now: i64,
    ) -> Result<WebhookEvent, ProviderError> {
        verify_signature(
            raw_body,
            signature_header,
            &self.config.webhook_secret,
            now,
            DEFAULT_TOLERANCE_SECS,
        )?;

        let event: StripeEvent =
            serde_json::from_slice(raw_body).map_err(|e| ProviderError::Decode(e.to_string()))?;

        if event.event_type != CHECKOUT_COMPLETED {
            return Ok(WebhookEvent::Ignored {
                event_type: event.event_type,
            });
        }

        let session: CheckoutSession = serde_json::from_value(event.data.object)
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        // Subscription and setup sessions never correspond to a course order.
        if session.mode.as_deref() != Some("payment") {
            return Ok(WebhookEvent::Ignored {
                event_type: format!(
                    "{CHECKOUT_COMPLETED} (mode {})",
                    session.mode.as_deref().unwrap_or("none")
                ),
            });
        }

        Ok(WebhookEvent::CheckoutCompleted {
            provider_id: session.id,
        })
    }
}

#[async_trait]
impl PaymentProvider for StripeClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Stripe
    }

    async fn create_payment(
        &self,
        items: &[LineItem],
        total: MinorUnits,
    ) -> Result<CreatedPayment, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/checkout/sessions", self.config.base_url))
            .basic_auth(&self.config.api_secret, None::<&str>)
            .form(&self.session_form(items))
            .send()
            .await?;

        let payload: serde_json::Value = ensure_success(response).await?.json().await?;
        let session: SessionResponse = serde_json::from_value(payload.clone())
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        tracing::debug!(provider_id = %session.id, total, "Stripe checkout session created");

        Ok(CreatedPayment {
            provider_id: session.id,
            redirect_url: session.url,
            payload,
        })
    }
}

impl WebhookProvider for StripeClient {
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError> {
        self.parse_webhook_at(raw_body, signature_header, chrono::Utc::now().timestamp())
    }
}
