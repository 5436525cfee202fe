use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;
use coursehub_events::EmailConfig;
use coursehub_payments::paypal::DEFAULT_PAYPAL_URL;
use coursehub_payments::stripe::DEFAULT_STRIPE_URL;
use coursehub_payments::{PaypalConfig, StripeConfig};

use crate::auth::jwt::JwtConfig;

/// A missing or unparseable environment variable.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value {value:?}: {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Token-bucket settings for per-client rate limiting.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    /// Requests allowed back to back.
    pub burst: u32,
    /// Minimum interval between allowed requests once the burst is spent.
    pub interval: Duration,
    /// Buckets idle longer than this are evicted.
    pub expiry: Duration,
}

/// Server configuration loaded from environment variables.
///
/// All fields except the database URL and JWT secret have defaults
/// suitable for local development. Payment providers and the mailer are
/// optional and stay disabled until their credentials are present.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<HeaderValue>,
    pub request_timeout_secs: u64,
    /// How long shutdown waits for background tasks to drain.
    pub shutdown_timeout_secs: u64,
    /// Deadline for a single payment provider call.
    pub provider_timeout_secs: u64,
    /// Pending orders older than this are expired.
    pub order_expiry_hours: i64,
    pub currency: String,
    pub jwt: JwtConfig,
    pub rate_limit: RateLimitConfig,
    pub paypal: Option<PaypalConfig>,
    pub stripe: Option<StripeConfig>,
    pub email: Option<EmailConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default                                  |
    /// |----------------------------|------------------------------------------|
    /// | `HOST`                     | `0.0.0.0`                                |
    /// | `PORT`                     | `8000`                                   |
    /// | `DATABASE_URL`             | required                                 |
    /// | `CORS_ORIGINS`             | `http://localhost:3000`                  |
    /// | `REQUEST_TIMEOUT_SECS`     | `10`, must exceed provider timeout       |
    /// | `SHUTDOWN_TIMEOUT_SECS`    | `120`                                    |
    /// | `PROVIDER_TIMEOUT_SECS`    | `8`                                      |
    /// | `ORDER_EXPIRY_HOURS`       | `48`                                     |
    /// | `CURRENCY`                 | `eur`                                    |
    /// | `RATE_LIMIT_BURST`         | `1`                                      |
    /// | `RATE_LIMIT_INTERVAL_SECS` | `60`                                     |
    /// | `RATE_LIMIT_EXPIRY_MINS`   | `5`                                      |
    /// | `PAYPAL_CLIENT_ID`         | PayPal disabled when unset               |
    /// | `PAYPAL_SECRET`            | required with `PAYPAL_CLIENT_ID`         |
    /// | `PAYPAL_URL`               | `https://api-m.sandbox.paypal.com`       |
    /// | `STRIPE_API_SECRET`        | Stripe disabled when unset               |
    /// | `STRIPE_WEBHOOK_SECRET`    | required with `STRIPE_API_SECRET`        |
    /// | `STRIPE_SUCCESS_URL`       | `http://localhost:3000/dashboard`        |
    /// | `STRIPE_CANCEL_URL`        | `http://localhost:3000/cart`             |
    ///
    /// JWT and SMTP variables are documented on [`JwtConfig`] and
    /// [`EmailConfig`].
    pub fn from_env() -> Result<Self, ConfigError> {
        let currency = var_or("CURRENCY", "eur").to_lowercase();

        let cors_origins = var_or("CORS_ORIGINS", "http://localhost:3000")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|origin| {
                origin.parse::<HeaderValue>().map_err(|e| ConfigError::Invalid {
                    var: "CORS_ORIGINS",
                    value: origin.to_string(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let paypal = match std::env::var("PAYPAL_CLIENT_ID") {
            Ok(client_id) => Some(PaypalConfig {
                client_id,
                secret: required("PAYPAL_SECRET")?,
                base_url: var_or("PAYPAL_URL", DEFAULT_PAYPAL_URL)
                    .trim_end_matches('/')
                    .to_string(),
                currency: currency.clone(),
            }),
            Err(_) => None,
        };

        let stripe = match std::env::var("STRIPE_API_SECRET") {
            Ok(api_secret) => Some(StripeConfig {
                api_secret,
                webhook_secret: required("STRIPE_WEBHOOK_SECRET")?,
                success_url: var_or("STRIPE_SUCCESS_URL", "http://localhost:3000/dashboard"),
                cancel_url: var_or("STRIPE_CANCEL_URL", "http://localhost:3000/cart"),
                currency: currency.clone(),
                base_url: DEFAULT_STRIPE_URL.to_string(),
            }),
            Err(_) => None,
        };

        let request_timeout_secs = parsed("REQUEST_TIMEOUT_SECS", 10)?;
        let provider_timeout_secs = parsed("PROVIDER_TIMEOUT_SECS", 8)?;
        check_timeouts(request_timeout_secs, provider_timeout_secs)?;

        let email = EmailConfig::from_env().map_err(|e| ConfigError::Invalid {
            var: e.var,
            value: e.value,
            reason: e.reason,
        })?;

        Ok(Self {
            host: var_or("HOST", "0.0.0.0"),
            port: parsed("PORT", 8000)?,
            database_url: required("DATABASE_URL")?,
            cors_origins,
            request_timeout_secs,
            shutdown_timeout_secs: parsed("SHUTDOWN_TIMEOUT_SECS", 120)?,
            provider_timeout_secs,
            order_expiry_hours: parsed("ORDER_EXPIRY_HOURS", 48)?,
            currency,
            jwt: JwtConfig::from_env()?,
            rate_limit: RateLimitConfig {
                burst: parsed("RATE_LIMIT_BURST", 1)?,
                interval: Duration::from_secs(parsed("RATE_LIMIT_INTERVAL_SECS", 60)?),
                expiry: minutes("RATE_LIMIT_EXPIRY_MINS", 5)?,
            },
            paypal,
            stripe,
            email,
        })
    }
}

pub(crate) fn var_or(var: &'static str, default: &str) -> String {
    std::env::var(var).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn required(var: &'static str) -> Result<String, ConfigError> {
    match std::env::var(var) {
        Ok(value) if !value.is_empty() => Ok(value),
        _ => Err(ConfigError::Missing(var)),
    }
}

/// Parse `var` if set, otherwise return `default`.
pub(crate) fn parsed<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(value) => value.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            value,
            reason: e.to_string(),
        }),
        Err(_) => Ok(default),
    }
}

/// Parse a number of minutes from `var` into a duration.
pub(crate) fn minutes(var: &'static str, default: u64) -> Result<Duration, ConfigError> {
    let mins: u64 = parsed(var, default)?;
    mins.checked_mul(60)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::Invalid {
            var,
            value: mins.to_string(),
            reason: "too large".to_string(),
        })
}

/// The request deadline must be longer than the provider deadline.
pub(crate) fn check_timeouts(request_secs: u64, provider_secs: u64) -> Result<(), ConfigError> {
    if request_secs <= provider_secs {
        return Err(ConfigError::Invalid {
            var: "REQUEST_TIMEOUT_SECS",
            value: request_secs.to_string(),
            reason: format!("must exceed PROVIDER_TIMEOUT_SECS ({provider_secs})"),
        });
    }
    Ok(())
}
