use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use coursehub_core::error::CoreError;
use coursehub_core::signature::SignatureError;
use coursehub_db::versioned::UpdateError;
use coursehub_db::UNIQUE_VIOLATION;
use coursehub_payments::ProviderError;
use serde_json::json;

use crate::engine::PipelineError;

/// Application-level error type for HTTP handlers.
///
/// Every variant is classified by [`AppError::describe`] into an
/// [`ErrorDescriptor`], which drives both the JSON body and the log line.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error(transparent)]
    Update(#[from] UpdateError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Rate limit exceeded")]
    RateLimited,

    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

/// How loudly an error is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Classified form of an [`AppError`].
#[derive(Debug)]
pub struct ErrorDescriptor {
    pub status: StatusCode,
    pub code: &'static str,
    /// Message shown to the client.
    pub message: String,
    pub severity: Severity,
    /// Structured context for the log line, never sent to the client.
    pub fields: Vec<(&'static str, String)>,
}

impl ErrorDescriptor {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>, severity: Severity) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            severity,
            fields: Vec::new(),
        }
    }

    fn internal(severity: Severity) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "An internal error occurred",
            severity,
        )
    }

    fn field(mut self, name: &'static str, value: impl ToString) -> Self {
        self.fields.push((name, value.to_string()));
        self
    }

    /// Emit the log line for `error` at this descriptor's severity.
    pub fn log(&self, error: &AppError) {
        let status = self.status.as_u16();
        let code = self.code;
        let fields = &self.fields;
        match self.severity {
            Severity::Debug => tracing::debug!(status, code, ?fields, error = %error, "Request failed"),
            Severity::Info => tracing::info!(status, code, ?fields, error = %error, "Request failed"),
            Severity::Warn => tracing::warn!(status, code, ?fields, error = %error, "Request failed"),
            Severity::Error => tracing::error!(status, code, ?fields, error = %error, "Request failed"),
        }
    }
}

impl AppError {
    /// Classify this error into status, client message, and log severity.
    pub fn describe(&self) -> ErrorDescriptor {
        match self {
            AppError::Core(core) => describe_core(core),
            AppError::Database(err) => describe_sqlx(err),
            AppError::Update(UpdateError::VersionConflict { entity, id, expected }) => {
                ErrorDescriptor::new(
                    StatusCode::CONFLICT,
                    "VERSION_CONFLICT",
                    format!("{entity} with id {id} was modified concurrently; reload and retry"),
                    Severity::Warn,
                )
                .field("expected_version", expected)
            }
            AppError::Update(UpdateError::Database(err)) => describe_sqlx(err),
            AppError::Pipeline(err) => describe_pipeline(err),
            AppError::BadRequest(msg) => {
                ErrorDescriptor::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone(), Severity::Info)
            }
            AppError::RateLimited => ErrorDescriptor::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                "Too many requests, try again later",
                Severity::Debug,
            ),
            AppError::InternalError(_) => ErrorDescriptor::internal(Severity::Error),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let descriptor = self.describe();
        descriptor.log(&self);

        let body = json!({
            "error": descriptor.message,
            "code": descriptor.code,
        });

        (descriptor.status, axum::Json(body)).into_response()
    }
}

fn describe_core(err: &CoreError) -> ErrorDescriptor {
    match err {
        CoreError::NotFound { entity, id } => ErrorDescriptor::new(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            format!("{entity} with id {id} not found"),
            Severity::Info,
        ),
        CoreError::Validation(msg) => {
            ErrorDescriptor::new(StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone(), Severity::Info)
        }
        CoreError::Conflict(msg) => {
            ErrorDescriptor::new(StatusCode::CONFLICT, "CONFLICT", msg.clone(), Severity::Warn)
        }
        CoreError::VersionConflict { entity, id } => ErrorDescriptor::new(
            StatusCode::CONFLICT,
            "VERSION_CONFLICT",
            format!("{entity} with id {id} was modified concurrently; reload and retry"),
            Severity::Warn,
        ),
        CoreError::AlreadyOwned { course_id } => ErrorDescriptor::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "ALREADY_OWNED",
            format!("Course {course_id} is already owned"),
            Severity::Info,
        ),
        CoreError::EmptyCart => ErrorDescriptor::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "EMPTY_CART",
            "Cart is empty",
            Severity::Info,
        ),
        CoreError::Unauthorized(msg) => {
            ErrorDescriptor::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone(), Severity::Info)
        }
        CoreError::Forbidden(msg) => {
            ErrorDescriptor::new(StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone(), Severity::Info)
        }
        CoreError::Internal(_) => ErrorDescriptor::internal(Severity::Error),
    }
}

/// - `RowNotFound` maps to 404.
/// - Unique violations on `uq_` constraints map to 409.
/// - Everything else is a sanitized 500.
fn describe_sqlx(err: &sqlx::Error) -> ErrorDescriptor {
    match err {
        sqlx::Error::RowNotFound => {
            ErrorDescriptor::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Resource not found", Severity::Info)
        }
        sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            let constraint = db_err.constraint().unwrap_or("unknown");
            if constraint.starts_with("uq_") {
                ErrorDescriptor::new(
                    StatusCode::CONFLICT,
                    "CONFLICT",
                    format!("Duplicate value violates unique constraint: {constraint}"),
                    Severity::Warn,
                )
            } else {
                ErrorDescriptor::internal(Severity::Error)
            }
        }
        _ => ErrorDescriptor::internal(Severity::Error),
    }
}

fn describe_provider(err: &ProviderError) -> ErrorDescriptor {
    match err {
        ProviderError::Signature(SignatureError::InvalidSecret) => {
            ErrorDescriptor::internal(Severity::Error)
        }
        ProviderError::Signature(_) => ErrorDescriptor::new(
            StatusCode::BAD_REQUEST,
            "INVALID_SIGNATURE",
            "Webhook signature verification failed",
            Severity::Warn,
        ),
        ProviderError::Timeout(_) => ErrorDescriptor::new(
            StatusCode::GATEWAY_TIMEOUT,
            "PROVIDER_TIMEOUT",
            "The payment provider did not answer in time",
            Severity::Warn,
        ),
        ProviderError::Api { status, .. } => ErrorDescriptor::new(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            "The payment provider rejected the request",
            Severity::Error,
        )
        .field("provider_status", status),
        ProviderError::Request(_) | ProviderError::Decode(_) => ErrorDescriptor::new(
            StatusCode::BAD_GATEWAY,
            "PROVIDER_ERROR",
            "The payment provider could not be reached",
            Severity::Error,
        ),
    }
}

fn describe_pipeline(err: &PipelineError) -> ErrorDescriptor {
    match err {
        PipelineError::Core(core) => describe_core(core),
        PipelineError::Database(db) => describe_sqlx(db),
        PipelineError::Provider(provider) => describe_provider(provider),
        PipelineError::ProviderUnavailable(kind) => ErrorDescriptor::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "PROVIDER_UNAVAILABLE",
            format!("Payment provider {kind} is not available"),
            Severity::Warn,
        ),
        PipelineError::UnknownOrder { provider_id } => ErrorDescriptor::new(
            StatusCode::NOT_FOUND,
            "UNKNOWN_ORDER",
            "No order matches this payment",
            Severity::Warn,
        )
        .field("provider_id", provider_id),
        PipelineError::PaymentNotConfirmed { provider_id, status } => ErrorDescriptor::new(
            StatusCode::PAYMENT_REQUIRED,
            "PAYMENT_NOT_CONFIRMED",
            "The payment was not completed",
            Severity::Warn,
        )
        .field("provider_id", provider_id)
        .field("provider_status", status),
        PipelineError::OrderExpired { provider_id, user_id } => ErrorDescriptor::new(
            StatusCode::CONFLICT,
            "ORDER_EXPIRED",
            "The order expired before the payment was confirmed",
            Severity::Warn,
        )
        .field("provider_id", provider_id)
        .field("user_id", user_id),
        PipelineError::OrphanedPayment {
            provider_id,
            user_id,
            amount,
            ..
        } => ErrorDescriptor::internal(Severity::Error)
            .field("provider_id", provider_id)
            .field("user_id", user_id)
            .field("amount", amount),
        PipelineError::NotFulfilled {
            provider_id,
            user_id,
            amount,
            ..
        } => ErrorDescriptor::internal(Severity::Error)
            .field("provider_id", provider_id)
            .field("user_id", or_unknown(*user_id))
            .field("amount", or_unknown(*amount)),
    }
}

fn or_unknown(value: Option<i64>) -> String {
    value.map_or_else(|| "unknown".to_string(), |v| v.to_string())
}
