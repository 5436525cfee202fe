//! Payment provider clients.
//!
//! Two provider styles are supported behind a common [`PaymentProvider`]
//! trait:
//!
//! - **Capture style** ([`CaptureProvider`], PayPal): the client approves
//!   the payment with the provider and the backend then captures it
//!   explicitly.
//! - **Webhook style** ([`WebhookProvider`], Stripe): the provider confirms
//!   payment by calling back with a signed event.
//!
//! Both report the provider's identifier for the payment object, which
//! links the local order to it.

use async_trait::async_trait;
use coursehub_core::types::{DbId, MinorUnits};
use serde::Serialize;

pub mod error;
pub mod paypal;
pub mod stripe;

pub use error::ProviderError;
pub use paypal::{PaypalClient, PaypalConfig};
pub use stripe::{StripeClient, StripeConfig};

/// One course being paid for, priced at checkout time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItem {
    pub course_id: DbId,
    pub name: String,
    pub description: String,
    pub price: MinorUnits,
}

/// The provider-side object created for a checkout.
#[derive(Debug, Clone, Serialize)]
pub struct CreatedPayment {
    /// Provider identifier (PayPal order id, Stripe session id).
    pub provider_id: String,
    /// Where the buyer approves the payment, when the provider returns one.
    pub redirect_url: Option<String>,
    /// Raw provider response, passed through to the client.
    pub payload: serde_json::Value,
}

/// Result of a capture call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureOutcome {
    /// Provider status string, e.g. `COMPLETED`.
    pub status: String,
    /// Whether the funds were actually collected.
    pub confirmed: bool,
}

/// A verified webhook event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    /// A payment for `provider_id` has completed and should be fulfilled.
    CheckoutCompleted { provider_id: String },
    /// An authentic event that needs no action.
    Ignored { event_type: String },
}

/// Which provider a checkout goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Paypal,
    Stripe,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Paypal => "paypal",
            ProviderKind::Stripe => "stripe",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Creates provider-side payment objects.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Create a payment for `items` totalling `total` minor units.
    async fn create_payment(
        &self,
        items: &[LineItem],
        total: MinorUnits,
    ) -> Result<CreatedPayment, ProviderError>;
}

/// A provider whose payments are confirmed by an explicit capture call.
#[async_trait]
pub trait CaptureProvider: PaymentProvider {
    async fn capture(&self, provider_id: &str) -> Result<CaptureOutcome, ProviderError>;
}

/// A provider whose payments are confirmed by signed webhook events.
pub trait WebhookProvider: PaymentProvider {
    /// Authenticate `raw_body` against `signature_header` and decode it.
    fn verify_and_parse_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookEvent, ProviderError>;
}
