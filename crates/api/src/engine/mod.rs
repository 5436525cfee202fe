//! Purchase pipeline.
//!
//! - [`cart`]: the per-user cart aggregate.
//! - [`checkout`]: phase A, turning a cart into a provider payment and a
//!   pending order with captured prices.
//! - [`fulfillment`]: phase B, turning a confirmed payment into owned
//!   courses exactly once.
//!
//! Creating the provider payment and storing the order are not jointly
//! atomic. When the second step fails the first has already happened, and
//! the error says so ([`PipelineError::OrphanedPayment`]) so it can be
//! reconciled by hand. Likewise a confirmed payment whose local commit
//! fails surfaces as [`PipelineError::NotFulfilled`]; there is no
//! automatic refund.

use std::sync::Arc;
use std::time::Duration;

use coursehub_core::error::CoreError;
use coursehub_core::types::{DbId, MinorUnits};
use coursehub_db::DbPool;
use coursehub_events::Mailer;
use coursehub_payments::{CaptureProvider, ProviderError, ProviderKind, WebhookProvider};

use crate::background::TaskExecutor;

pub mod cart;
pub mod checkout;
pub mod fulfillment;

pub use checkout::Checkout;
pub use fulfillment::{Fulfillment, WebhookOutcome};

/// Failure of a pipeline step.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Payment provider {0} is not configured")]
    ProviderUnavailable(ProviderKind),

    #[error("No order for provider id {provider_id}")]
    UnknownOrder { provider_id: String },

    #[error("Payment {provider_id} not confirmed (status {status})")]
    PaymentNotConfirmed { provider_id: String, status: String },

    /// The provider confirmed payment for an order that had already expired.
    #[error("Payment {provider_id} confirmed for expired order of user {user_id}")]
    OrderExpired { provider_id: String, user_id: DbId },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Database(#[from] sqlx::Error),

    /// The provider created a payment but the local order was not stored.
    #[error("Payment {provider_id} created but its order was not stored: {source}")]
    OrphanedPayment {
        provider_id: String,
        user_id: DbId,
        amount: MinorUnits,
        #[source]
        source: Box<PipelineError>,
    },

    /// The provider confirmed payment but the order could not be completed.
    #[error("Payment {provider_id} confirmed but order was not fulfilled: {source}")]
    NotFulfilled {
        provider_id: String,
        /// Unknown when the order itself could not be read.
        user_id: Option<DbId>,
        amount: Option<MinorUnits>,
        #[source]
        source: Box<PipelineError>,
    },
}

impl PipelineError {
    /// Money moved at the provider but local state does not reflect it.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            PipelineError::OrphanedPayment { .. }
                | PipelineError::NotFulfilled { .. }
                | PipelineError::OrderExpired { .. }
        )
    }

    /// Log a reconciliation alert. Called where the condition is detected,
    /// so it is recorded even when the request that caused it is gone.
    pub(crate) fn report(&self) {
        match self {
            PipelineError::OrphanedPayment {
                provider_id,
                user_id,
                amount,
                ..
            } => tracing::error!(
                alert = true,
                %provider_id,
                user_id,
                amount,
                error = %self,
                "Reconciliation required: provider payment has no order"
            ),
            PipelineError::NotFulfilled {
                provider_id,
                user_id,
                amount,
                ..
            } => tracing::error!(
                alert = true,
                %provider_id,
                user_id = ?user_id,
                amount = ?amount,
                error = %self,
                "Reconciliation required: paid order not fulfilled"
            ),
            PipelineError::OrderExpired { provider_id, user_id } => tracing::error!(
                alert = true,
                %provider_id,
                user_id,
                error = %self,
                "Reconciliation required: payment confirmed for expired order"
            ),
            _ => {}
        }
    }
}

/// The checkout and fulfillment engine.
///
/// Owned by the composition root and shared through `AppState`. Providers
/// and the mailer are optional; a checkout through an unconfigured
/// provider fails with [`PipelineError::ProviderUnavailable`].
///
/// Cloning is cheap; clones share the pool, executor and providers.
#[derive(Clone)]
pub struct Pipeline {
    pool: DbPool,
    executor: TaskExecutor,
    paypal: Option<Arc<dyn CaptureProvider>>,
    stripe: Option<Arc<dyn WebhookProvider>>,
    mailer: Option<Arc<dyn Mailer>>,
    provider_timeout: Duration,
    currency: String,
}

impl Pipeline {
    pub fn new(
        pool: DbPool,
        executor: TaskExecutor,
        provider_timeout: Duration,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            pool,
            executor,
            paypal: None,
            stripe: None,
            mailer: None,
            provider_timeout,
            currency: currency.into(),
        }
    }

    pub fn with_paypal(mut self, provider: Arc<dyn CaptureProvider>) -> Self {
        self.paypal = Some(provider);
        self
    }

    pub fn with_stripe(mut self, provider: Arc<dyn WebhookProvider>) -> Self {
        self.stripe = Some(provider);
        self
    }

    pub fn with_mailer(mut self, mailer: Arc<dyn Mailer>) -> Self {
        self.mailer = Some(mailer);
        self
    }

    pub fn executor(&self) -> &TaskExecutor {
        &self.executor
    }

    fn paypal(&self) -> Result<&dyn CaptureProvider, PipelineError> {
        self.paypal
            .as_deref()
            .ok_or(PipelineError::ProviderUnavailable(ProviderKind::Paypal))
    }

    fn stripe(&self) -> Result<&dyn WebhookProvider, PipelineError> {
        self.stripe
            .as_deref()
            .ok_or(PipelineError::ProviderUnavailable(ProviderKind::Stripe))
    }

    /// Await a provider call under the provider deadline.
    ///
    /// A timeout is an unknown outcome: the provider may have acted.
    async fn call_provider<T, F>(
        &self,
        provider: ProviderKind,
        operation: &'static str,
        call: F,
    ) -> Result<T, ProviderError>
    where
        F: std::future::Future<Output = Result<T, ProviderError>>,
    {
        match tokio::time::timeout(self.provider_timeout, call).await {
            Ok(result) => result,
            Err(_) => {
                tracing::warn!(
                    %provider,
                    operation,
                    timeout_ms = self.provider_timeout.as_millis() as u64,
                    "Provider call timed out, outcome unknown"
                );
                Err(ProviderError::Timeout(self.provider_timeout))
            }
        }
    }
}

/// Run `work` on its own task and wait for it.
///
/// Steps that follow a provider-side payment go through here so that a
/// dropped request (client gone, request timeout) cannot cancel them
/// halfway.
async fn detached<T, F>(work: F) -> Result<T, tokio::task::JoinError>
where
    F: std::future::Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(work).await
}
