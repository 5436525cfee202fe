//! Outbound notifications.
//!
//! - [`Mailer`] is the seam the API uses to send account and order mail;
//!   it is only ever invoked from background tasks.
//! - [`SmtpMailer`] implements it over SMTP with `lettre`.

pub mod email;

pub use email::{EmailConfig, EmailConfigError, EmailError, Mailer, OrderConfirmation, SmtpMailer};
