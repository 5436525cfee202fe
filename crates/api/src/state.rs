use std::sync::Arc;

use crate::config::ServerConfig;
use crate::engine::Pipeline;
use crate::rate_limit::RateLimiter;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything shared is behind `Arc` or is a pool handle.
#[derive(Clone)]
pub struct AppState {
    pub pool: coursehub_db::DbPool,
    pub config: Arc<ServerConfig>,
    /// Checkout and fulfillment engine.
    pub pipeline: Arc<Pipeline>,
    /// Per-user limiter for checkout requests.
    pub checkout_limiter: Arc<RateLimiter>,
}
