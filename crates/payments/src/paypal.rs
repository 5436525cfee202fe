//! PayPal Orders v2 client (capture style).
//!
//! Checkout creates a PayPal order and hands the approval link to the
//! buyer. Once approved, the backend captures the order; only a capture
//! that reports `COMPLETED` counts as collected money.

use async_trait::async_trait;
use coursehub_core::pricing::format_minor_units;
use coursehub_core::types::MinorUnits;
use serde::Deserialize;
use serde_json::json;

use crate::error::{ensure_success, ProviderError};
use crate::{CaptureOutcome, CaptureProvider, CreatedPayment, LineItem, PaymentProvider, ProviderKind};

/// Capture status that means the funds were collected.
pub const STATUS_COMPLETED: &str = "COMPLETED";

/// PayPal rejects item names and descriptions longer than this.
const MAX_TEXT_LEN: usize = 127;

/// Default API base URL (sandbox).
pub const DEFAULT_PAYPAL_URL: &str = "https://api-m.sandbox.paypal.com";

#[derive(Debug, Clone)]
pub struct PaypalConfig {
    pub client_id: String,
    pub secret: String,
    /// API base URL without trailing slash.
    pub base_url: String,
    /// ISO 4217 currency code; sent upper-cased.
    pub currency: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct OrderResponse {
    id: String,
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
    rel: String,
}

/// HTTP client for the PayPal REST API.
pub struct PaypalClient {
    client: reqwest::Client,
    config: PaypalConfig,
}

impl PaypalClient {
    pub fn new(config: PaypalConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    /// Obtain an OAuth access token with the client-credentials grant.
    async fn access_token(&self) -> Result<String, ProviderError> {
        let response = self
            .client
            .post(format!("{}/v1/oauth2/token", self.config.base_url))
            .basic_auth(&self.config.client_id, Some(&self.config.secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;

        let token: TokenResponse = ensure_success(response).await?.json().await?;
        Ok(token.access_token)
    }

    fn order_body(&self, items: &[LineItem], total: MinorUnits) -> serde_json::Value {
        let currency = self.config.currency.to_uppercase();
        let money = |amount: MinorUnits| {
            json!({ "currency_code": currency, "value": format_minor_units(amount) })
        };

        let items: Vec<_> = items
            .iter()
            .map(|item| {
                json!({
                    "name": truncate(&item.name),
                    "description": truncate(&item.description),
                    "quantity": "1",
                    "category": "DIGITAL_GOODS",
                    "unit_amount": money(item.price),
                })
            })
            .collect();

        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "amount": {
                    "currency_code": currency,
                    "value": format_minor_units(total),
                    "breakdown": { "item_total": money(total) },
                },
                "items": items,
            }],
        })
    }
}

#[async_trait]
impl PaymentProvider for PaypalClient {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Paypal
    }

    async fn create_payment(
        &self,
        items: &[LineItem],
        total: MinorUnits,
    ) -> Result<CreatedPayment, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!("{}/v2/checkout/orders", self.config.base_url))
            .bearer_auth(token)
            .json(&self.order_body(items, total))
            .send()
            .await?;

        let payload: serde_json::Value = ensure_success(response).await?.json().await?;
        let order: OrderResponse = serde_json::from_value(payload.clone())
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let redirect_url = order
            .links
            .iter()
            .find(|link| link.rel == "approve" || link.rel == "payer-action")
            .map(|link| link.href.clone());

        tracing::debug!(provider_id = %order.id, status = %order.status, "PayPal order created");

        Ok(CreatedPayment {
            provider_id: order.id,
            redirect_url,
            payload,
        })
    }
}

#[async_trait]
impl CaptureProvider for PaypalClient {
    async fn capture(&self, provider_id: &str) -> Result<CaptureOutcome, ProviderError> {
        let token = self.access_token().await?;
        let response = self
            .client
            .post(format!(
                "{}/v2/checkout/orders/{}/capture",
                self.config.base_url, provider_id
            ))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;

        let order: OrderResponse = ensure_success(response)
            .await?
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        Ok(CaptureOutcome {
            confirmed: order.status == STATUS_COMPLETED,
            status: order.status,
        })
    }
}

fn truncate(text: &str) -> String {
    text.chars().take(MAX_TEXT_LEN).collect()
}
