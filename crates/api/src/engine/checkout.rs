//! Phase A: cart to pending order.

use coursehub_core::error::CoreError;
use coursehub_core::pricing::checkout_total;
use coursehub_core::types::{DbId, MinorUnits};
use coursehub_db::models::order::{CreateOrder, CreateOrderItem};
use coursehub_db::repositories::{CartRepo, OrderRepo};
use coursehub_payments::{LineItem, PaymentProvider, ProviderKind};
use serde::Serialize;

use super::{detached, Pipeline, PipelineError};

/// A started checkout, returned to the buyer.
#[derive(Debug, Serialize)]
pub struct Checkout {
    pub order_id: DbId,
    pub provider: ProviderKind,
    pub provider_id: String,
    pub redirect_url: Option<String>,
    pub total: MinorUnits,
    /// The provider's own response, for clients that drive its SDK.
    pub payload: serde_json::Value,
}

impl Pipeline {
    /// Start a checkout of `user_id`'s cart through `provider`.
    ///
    /// Prices are read once, at this instant, and stored on the order
    /// items; later catalog edits do not affect the order. The cart is
    /// left intact until the payment is confirmed.
    pub async fn checkout(
        &self,
        user_id: DbId,
        provider: ProviderKind,
    ) -> Result<Checkout, PipelineError> {
        match provider {
            ProviderKind::Paypal => self.checkout_with(user_id, self.paypal()?).await,
            ProviderKind::Stripe => self.checkout_with(user_id, self.stripe()?).await,
        }
    }

    async fn checkout_with<P>(&self, user_id: DbId, provider: &P) -> Result<Checkout, PipelineError>
    where
        P: PaymentProvider + ?Sized,
    {
        let snapshot = CartRepo::snapshot(&self.pool, user_id).await?;
        if snapshot.is_empty() {
            return Err(CoreError::EmptyCart.into());
        }

        let total = checkout_total(snapshot.iter().map(|course| course.price))?;
        let line_items: Vec<LineItem> = snapshot
            .iter()
            .map(|course| LineItem {
                course_id: course.course_id,
                name: course.name.clone(),
                description: course.description.clone(),
                price: course.price,
            })
            .collect();

        let kind = provider.kind();
        let created = self
            .call_provider(kind, "create_payment", provider.create_payment(&line_items, total))
            .await?;

        let input = CreateOrder {
            user_id,
            provider_id: created.provider_id.clone(),
            items: snapshot
                .iter()
                .map(|course| CreateOrderItem {
                    course_id: course.course_id,
                    price: course.price,
                })
                .collect(),
        };

        let item_count = input.items.len();
        let pool = self.pool.clone();
        let stored =
            detached(async move { OrderRepo::create_with_items(&pool, &input).await }).await;

        let order = match stored {
            Ok(Ok(order)) => order,
            Ok(Err(e)) => return Err(orphaned(&created.provider_id, user_id, total, e.into())),
            Err(join) => {
                let source = CoreError::Internal(format!("order insert aborted: {join}"));
                return Err(orphaned(&created.provider_id, user_id, total, source.into()));
            }
        };

        tracing::info!(
            order_id = order.id,
            user_id,
            provider = %kind,
            provider_id = %created.provider_id,
            total,
            items = item_count,
            "Checkout started"
        );

        Ok(Checkout {
            order_id: order.id,
            provider: kind,
            provider_id: created.provider_id,
            redirect_url: created.redirect_url,
            total,
            payload: created.payload,
        })
    }
}

fn orphaned(provider_id: &str, user_id: DbId, amount: MinorUnits, source: PipelineError) -> PipelineError {
    let error = PipelineError::OrphanedPayment {
        provider_id: provider_id.to_string(),
        user_id,
        amount,
        source: Box::new(source),
    };
    error.report();
    error
}
