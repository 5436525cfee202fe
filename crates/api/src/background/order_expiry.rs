//! Periodic expiry of abandoned checkouts.
//!
//! A checkout leaves a `pending` order behind even when the buyer never
//! pays. Once such an order is older than the configured window it is
//! moved to `expired`, after which it can no longer be fulfilled.

use std::time::Duration;

use chrono::Utc;
use coursehub_db::repositories::OrderRepo;
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

/// How often the expiry job runs.
const EXPIRY_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Run the expiry loop until `cancel` is triggered.
pub async fn run(pool: PgPool, expiry_hours: i64, cancel: CancellationToken) {
    tracing::info!(
        expiry_hours,
        interval_secs = EXPIRY_INTERVAL.as_secs(),
        "Order expiry job started"
    );

    let mut interval = tokio::time::interval(EXPIRY_INTERVAL);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Order expiry job stopping");
                break;
            }
            _ = interval.tick() => {
                let cutoff = Utc::now() - chrono::Duration::hours(expiry_hours);
                match OrderRepo::expire_stale(&pool, cutoff).await {
                    Ok(0) => tracing::debug!("Order expiry: nothing to expire"),
                    Ok(expired) => tracing::info!(expired, "Order expiry: expired stale pending orders"),
                    Err(e) => tracing::error!(error = %e, "Order expiry: sweep failed"),
                }
            }
        }
    }
}
