use std::time::Duration;

use coursehub_core::signature::SignatureError;

/// Failure talking to a payment provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, TLS, body read).
    #[error("Provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("Provider returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Webhook signature rejected: {0}")]
    Signature(#[from] SignatureError),

    /// The provider's response did not have the expected shape.
    #[error("Unexpected provider response: {0}")]
    Decode(String),

    /// No answer within the caller's deadline. The outcome is unknown: the
    /// provider may still have acted on the request.
    #[error("Provider did not answer within {0:?}")]
    Timeout(Duration),
}

/// Pass a success response through, or turn a failed one into
/// [`ProviderError::Api`] carrying its body.
pub(crate) async fn ensure_success(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}
