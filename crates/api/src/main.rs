use std::backtrace::Backtrace;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use coursehub_events::{Mailer, SmtpMailer};
use coursehub_payments::{PaypalClient, StripeClient};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coursehub_api::background::{order_expiry, TaskExecutor};
use coursehub_api::config::ServerConfig;
use coursehub_api::engine::Pipeline;
use coursehub_api::rate_limit::RateLimiter;
use coursehub_api::router::build_app_router;
use coursehub_api::state::AppState;

/// Upper bound on the database pool size.
const MAX_DB_CONNECTIONS: u32 = 10;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    init_tracing();
    install_panic_hook();

    // --- Configuration ---
    let config = ServerConfig::from_env().context("Invalid configuration")?;
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let pool = coursehub_db::create_pool(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .context("Failed to connect to database")?;
    coursehub_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    coursehub_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    // --- Pipeline ---
    let executor = TaskExecutor::new();
    let mut pipeline = Pipeline::new(
        pool.clone(),
        executor.clone(),
        Duration::from_secs(config.provider_timeout_secs),
        config.currency.clone(),
    );
    if let Some(paypal) = &config.paypal {
        pipeline = pipeline.with_paypal(Arc::new(PaypalClient::new(paypal.clone())));
        tracing::info!(url = %paypal.base_url, "PayPal checkout enabled");
    }
    if let Some(stripe) = &config.stripe {
        pipeline = pipeline.with_stripe(Arc::new(StripeClient::new(stripe.clone())));
        tracing::info!("Stripe checkout enabled");
    }
    if let Some(email) = &config.email {
        let mailer: Arc<dyn Mailer> =
            Arc::new(SmtpMailer::new(email.clone()).context("Invalid SMTP configuration")?);
        pipeline = pipeline.with_mailer(mailer);
        tracing::info!(smtp_host = %email.smtp_host, "Order confirmation mail enabled");
    }

    // --- Janitors ---
    let cancel = CancellationToken::new();
    let checkout_limiter = Arc::new(RateLimiter::new(config.rate_limit));
    let limiter_handle = tokio::spawn(Arc::clone(&checkout_limiter).run_janitor(cancel.clone()));
    let expiry_handle = tokio::spawn(order_expiry::run(
        pool.clone(),
        config.order_expiry_hours,
        cancel.clone(),
    ));

    // --- Router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        pipeline: Arc::new(pipeline),
        checkout_limiter,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let host = config
        .host
        .parse()
        .with_context(|| format!("Invalid HOST address {}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), limiter_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), expiry_handle).await;
    tracing::info!("Janitors stopped");

    match executor
        .shutdown(Duration::from_secs(config.shutdown_timeout_secs))
        .await
    {
        Ok(()) => tracing::info!("Background tasks drained"),
        Err(e) => tracing::error!(error = %e, "Background tasks did not drain"),
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

/// Install the global subscriber. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "coursehub_api=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Log panics, with a backtrace, through tracing. Panicking background
/// tasks are additionally caught by the executor.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let location = info
            .location()
            .map(|l| format!("{}:{}", l.file(), l.line()))
            .unwrap_or_default();
        tracing::error!(
            panic = %info,
            %location,
            backtrace = %Backtrace::force_capture(),
            "Panic"
        );
    }));
}

/// Wait for SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
