//! Email delivery via SMTP.
//!
//! Configuration is loaded from environment variables; if `SMTP_HOST` is
//! not set, [`EmailConfig::from_env`] returns `Ok(None)` and no mailer should
//! be constructed.

use async_trait::async_trait;
use coursehub_core::pricing::format_minor_units;
use coursehub_core::types::{DbId, MinorUnits};
use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

// ---------------------------------------------------------------------------
// EmailConfig
// ---------------------------------------------------------------------------

const DEFAULT_SMTP_PORT: u16 = 587;

const DEFAULT_FROM_ADDRESS: &str = "noreply@coursehub.local";

const DEFAULT_ACTIVATION_URL: &str = "http://localhost:3000/activate";

const DEFAULT_RECOVERY_URL: &str = "http://localhost:3000/recover";

/// Configuration for the SMTP mailer.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    /// RFC 5322 "From" address.
    pub from_address: String,
    pub smtp_user: Option<String>,
    pub smtp_password: Option<String>,
    /// Link prefix for account activation tokens.
    pub activation_url: String,
    /// Link prefix for password recovery tokens.
    pub recovery_url: String,
}

impl EmailConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable         | Required | Default                           |
    /// |------------------|----------|-----------------------------------|
    /// | `SMTP_HOST`      | yes      |                                   |
    /// | `SMTP_PORT`      | no       | `587`                             |
    /// | `SMTP_FROM`      | no       | `noreply@coursehub.local`         |
    /// | `SMTP_USER`      | no       |                                   |
    /// | `SMTP_PASSWORD`  | no       |                                   |
    /// | `ACTIVATION_URL` | no       | `http://localhost:3000/activate`  |
    /// | `RECOVERY_URL`   | no       | `http://localhost:3000/recover`   |
    pub fn from_env() -> Result<Option<Self>, EmailConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Build the configuration from an arbitrary variable source.
    pub fn from_vars<F>(var: F) -> Result<Option<Self>, EmailConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(smtp_host) = var("SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = match var("SMTP_PORT") {
            Some(value) => value.trim().parse().map_err(|e: std::num::ParseIntError| {
                EmailConfigError {
                    var: "SMTP_PORT",
                    reason: e.to_string(),
                    value,
                }
            })?,
            None => DEFAULT_SMTP_PORT,
        };

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            from_address: var("SMTP_FROM").unwrap_or_else(|| DEFAULT_FROM_ADDRESS.to_string()),
            smtp_user: var("SMTP_USER"),
            smtp_password: var("SMTP_PASSWORD"),
            activation_url: var("ACTIVATION_URL")
                .unwrap_or_else(|| DEFAULT_ACTIVATION_URL.to_string()),
            recovery_url: var("RECOVERY_URL").unwrap_or_else(|| DEFAULT_RECOVERY_URL.to_string()),
        }))
    }
}

/// An SMTP variable is set but unusable.
#[derive(Debug, thiserror::Error)]
#[error("{var} has invalid value {value:?}: {reason}")]
pub struct EmailConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Mailer
// ---------------------------------------------------------------------------

/// Summary of a fulfilled order for the confirmation mail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderConfirmation {
    pub order_id: DbId,
    pub course_names: Vec<String>,
    pub total: MinorUnits,
    pub currency: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_activation_token(&self, token: &str, address: &str) -> Result<(), EmailError>;

    async fn send_recovery_token(&self, token: &str, address: &str) -> Result<(), EmailError>;

    async fn send_order_confirmation(
        &self,
        address: &str,
        order: &OrderConfirmation,
    ) -> Result<(), EmailError>;
}

/// Sends plain-text mail through an SMTP relay.
pub struct SmtpMailer {
    config: EmailConfig,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    /// Build the STARTTLS transport. No connection is opened until the
    /// first send.
    pub fn new(config: EmailConfig) -> Result<Self, EmailError> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)?
            .port(config.smtp_port);

        if let (Some(user), Some(pass)) = (&config.smtp_user, &config.smtp_password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    async fn send(&self, to: &str, subject: &str, body: String) -> Result<(), EmailError> {
        let email = Message::builder()
            .from(self.config.from_address.parse()?)
            .to(to.parse()?)
            .subject(subject)
            .header(ContentType::TEXT_PLAIN)
            .body(body)
            .map_err(|e| EmailError::Build(e.to_string()))?;

        self.transport.send(email).await?;
        tracing::info!(to, subject, "Email sent");
        Ok(())
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send_activation_token(&self, token: &str, address: &str) -> Result<(), EmailError> {
        let body = activation_body(&self.config.activation_url, token);
        self.send(address, "Activate your Coursehub account", body).await
    }

    async fn send_recovery_token(&self, token: &str, address: &str) -> Result<(), EmailError> {
        let body = recovery_body(&self.config.recovery_url, token);
        self.send(address, "Reset your Coursehub password", body).await
    }

    async fn send_order_confirmation(
        &self,
        address: &str,
        order: &OrderConfirmation,
    ) -> Result<(), EmailError> {
        let subject = format!("Your Coursehub order #{}", order.order_id);
        self.send(address, &subject, order_body(order)).await
    }
}

// ---------------------------------------------------------------------------
// Message bodies
// ---------------------------------------------------------------------------

fn token_link(prefix: &str, token: &str) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), token)
}

fn activation_body(prefix: &str, token: &str) -> String {
    format!(
        "Welcome to Coursehub!\n\nActivate your account by opening:\n{}\n",
        token_link(prefix, token)
    )
}

fn recovery_body(prefix: &str, token: &str) -> String {
    format!(
        "A password reset was requested for your account.\n\nChoose a new password here:\n{}\n\n\
         If you did not ask for this, ignore this message.\n",
        token_link(prefix, token)
    )
}

fn order_body(order: &OrderConfirmation) -> String {
    let mut body = format!("Thank you for your purchase (order #{}).\n\n", order.order_id);
    for name in &order.course_names {
        body.push_str("  - ");
        body.push_str(name);
        body.push('\n');
    }
    body.push_str(&format!(
        "\nTotal: {} {}\n\nYour courses are now available in your dashboard.\n",
        format_minor_units(order.total),
        order.currency.to_uppercase()
    ));
    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
