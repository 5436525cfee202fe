//! Phase B: confirmed payment to owned courses.
//!
//! Fulfillment is keyed by the provider id and guarded by the order
//! status: only a `pending` order transitions, in the same transaction
//! that empties the buyer's cart. Repeated confirmations (provider
//! retries, a double-clicked capture) find the order already `success`
//! and return without side effects.

use coursehub_core::error::CoreError;
use coursehub_core::types::{DbId, MinorUnits};
use coursehub_db::models::order::Order;
use coursehub_db::models::status::OrderStatus;
use coursehub_db::repositories::{CartRepo, OrderRepo, UserRepo};
use coursehub_events::OrderConfirmation;
use coursehub_payments::{ProviderKind, WebhookEvent};
use serde::Serialize;

use super::{detached, Pipeline, PipelineError};

/// Outcome of a fulfillment attempt that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Fulfillment {
    /// This call moved the order to `success`.
    Fulfilled { order_id: DbId },
    /// The order was already `success`; nothing was changed.
    AlreadyFulfilled { order_id: DbId },
}

/// Outcome of an authentic webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Processed { fulfillment: Fulfillment },
    Ignored { event_type: String },
}

impl Pipeline {
    /// Capture an approved PayPal order on behalf of `user_id` and fulfil
    /// it.
    ///
    /// The order is looked up first: unknown ids and other users' orders
    /// are rejected before the provider is called, and an order that is
    /// already fulfilled is not captured again.
    pub async fn capture(
        &self,
        user_id: DbId,
        provider_id: &str,
    ) -> Result<Fulfillment, PipelineError> {
        let provider = self.paypal()?;

        let order = match OrderRepo::find_by_provider_id(&self.pool, provider_id).await? {
            Some(order) if order.user_id == user_id => order,
            _ => return Err(unknown_order(provider_id)),
        };
        match order.status() {
            Some(OrderStatus::Success) => {
                tracing::debug!(provider_id, order_id = order.id, "Capture of fulfilled order skipped");
                return Ok(Fulfillment::AlreadyFulfilled { order_id: order.id });
            }
            // Nothing has been collected yet, so this is a plain rejection.
            Some(OrderStatus::Expired) => {
                return Err(CoreError::Conflict(format!("Order {provider_id} has expired")).into());
            }
            _ => {}
        }

        let outcome = self
            .call_provider(ProviderKind::Paypal, "capture", provider.capture(provider_id))
            .await?;
        if !outcome.confirmed {
            return Err(PipelineError::PaymentNotConfirmed {
                provider_id: provider_id.to_string(),
                status: outcome.status,
            });
        }

        self.fulfill(provider_id).await
    }

    /// Verify a Stripe webhook and fulfil the order it confirms.
    pub async fn handle_webhook(
        &self,
        raw_body: &[u8],
        signature_header: &str,
    ) -> Result<WebhookOutcome, PipelineError> {
        let event = self
            .stripe()?
            .verify_and_parse_webhook(raw_body, signature_header)?;

        match event {
            WebhookEvent::CheckoutCompleted { provider_id } => {
                let fulfillment = self.fulfill(&provider_id).await?;
                Ok(WebhookOutcome::Processed { fulfillment })
            }
            WebhookEvent::Ignored { event_type } => {
                tracing::debug!(%event_type, "Webhook event acknowledged without action");
                Ok(WebhookOutcome::Ignored { event_type })
            }
        }
    }

    /// Mark the order for `provider_id` paid and empty the buyer's cart.
    ///
    /// Call only once the provider has confirmed the payment. The work runs
    /// on its own task, so it completes even if the caller is dropped, and
    /// any failure past this point is reported for reconciliation where it
    /// happens.
    pub async fn fulfill(&self, provider_id: &str) -> Result<Fulfillment, PipelineError> {
        let pipeline = self.clone();
        let owned_id = provider_id.to_string();
        let joined = detached(async move {
            let result = pipeline.fulfill_confirmed(&owned_id).await;
            if let Err(e) = &result {
                e.report();
            }
            result
        })
        .await;

        joined.unwrap_or_else(|join| {
            let source = CoreError::Internal(format!("fulfillment aborted: {join}"));
            let error = not_fulfilled(provider_id, None, None, source.into());
            error.report();
            Err(error)
        })
    }

    async fn fulfill_confirmed(&self, provider_id: &str) -> Result<Fulfillment, PipelineError> {
        let order = OrderRepo::find_by_provider_id(&self.pool, provider_id)
            .await
            .map_err(|e| not_fulfilled(provider_id, None, None, e.into()))?
            .ok_or_else(|| unknown_order(provider_id))?;

        self.check_fulfillable(&order)?;
        if order.status() == Some(OrderStatus::Success) {
            tracing::debug!(provider_id, order_id = order.id, "Order already fulfilled");
            return Ok(Fulfillment::AlreadyFulfilled { order_id: order.id });
        }

        match self.commit_fulfillment(&order).await {
            Ok(true) => {
                tracing::info!(
                    provider_id,
                    order_id = order.id,
                    user_id = order.user_id,
                    "Order fulfilled"
                );
                self.send_confirmation(&order);
                Ok(Fulfillment::Fulfilled { order_id: order.id })
            }
            Ok(false) => {
                // Another confirmation or the expiry job moved it first.
                let current = OrderRepo::find_by_id(&self.pool, order.id)
                    .await
                    .map_err(|e| not_fulfilled(provider_id, Some(order.user_id), None, e.into()))?
                    .ok_or_else(|| {
                        let gone = CoreError::Internal(format!("order {} disappeared", order.id));
                        not_fulfilled(provider_id, Some(order.user_id), None, gone.into())
                    })?;
                self.check_fulfillable(&current)?;
                tracing::debug!(provider_id, order_id = order.id, "Order fulfilled concurrently");
                Ok(Fulfillment::AlreadyFulfilled { order_id: order.id })
            }
            Err(source) => {
                let amount = OrderRepo::total(&self.pool, order.id).await.ok();
                Err(not_fulfilled(
                    provider_id,
                    Some(order.user_id),
                    amount,
                    source.into(),
                ))
            }
        }
    }

    /// Reject orders that can never be fulfilled.
    fn check_fulfillable(&self, order: &Order) -> Result<(), PipelineError> {
        match order.status() {
            Some(OrderStatus::Pending) | Some(OrderStatus::Success) => Ok(()),
            Some(OrderStatus::Expired) => Err(PipelineError::OrderExpired {
                provider_id: order.provider_id.clone(),
                user_id: order.user_id,
            }),
            None => {
                let unknown = CoreError::Internal(format!(
                    "order {} has unknown status id {}",
                    order.id, order.status_id
                ));
                Err(not_fulfilled(
                    &order.provider_id,
                    Some(order.user_id),
                    None,
                    unknown.into(),
                ))
            }
        }
    }

    /// Set `success` and flush the cart in one transaction. Returns `false`
    /// when the order was no longer pending.
    async fn commit_fulfillment(&self, order: &Order) -> Result<bool, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !OrderRepo::mark_success(&mut *tx, order.id).await? {
            tx.rollback().await?;
            return Ok(false);
        }
        CartRepo::flush(&mut *tx, order.user_id).await?;

        tx.commit().await?;
        Ok(true)
    }

    fn send_confirmation(&self, order: &Order) {
        let Some(mailer) = self.mailer.clone() else {
            return;
        };
        let pool = self.pool.clone();
        let currency = self.currency.clone();
        let (order_id, user_id) = (order.id, order.user_id);

        self.executor.submit("order_confirmation", async move {
            let user = UserRepo::find_by_id(&pool, user_id)
                .await?
                .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;
            let confirmation = OrderConfirmation {
                order_id,
                course_names: OrderRepo::course_names(&pool, order_id).await?,
                total: OrderRepo::total(&pool, order_id).await?,
                currency,
            };
            mailer.send_order_confirmation(&user.email, &confirmation).await?;
            Ok(())
        });
    }
}

fn not_fulfilled(
    provider_id: &str,
    user_id: Option<DbId>,
    amount: Option<MinorUnits>,
    source: PipelineError,
) -> PipelineError {
    PipelineError::NotFulfilled {
        provider_id: provider_id.to_string(),
        user_id,
        amount,
        source: Box::new(source),
    }
}

fn unknown_order(provider_id: &str) -> PipelineError {
    PipelineError::UnknownOrder {
        provider_id: provider_id.to_string(),
    }
}
