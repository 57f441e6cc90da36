//! Webhook error types for payment provider webhook handling.
//!
//! Defines the error conditions of webhook processing, with HTTP status code
//! mapping and retryability semantics. The provider stops redelivering only
//! on a 2xx, so anything that can never succeed on retry must not map to 5xx.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// The `Stripe-Signature` header was absent.
    #[error("Missing signature header")]
    MissingSignature,

    /// Webhook signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Webhook timestamp is outside the configured tolerance window.
    #[error("Timestamp out of range")]
    TimestampOutOfRange,

    /// Failed to parse the signature header or the event payload.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// The payment provider rejected or failed a re-fetch.
    #[error("Payment provider error: {0}")]
    Provider(String),

    /// The payment provider did not answer within the request budget.
    #[error("Payment provider timed out")]
    ProviderTimeout,

    /// The primary ledger write failed.
    #[error("Ledger error: {0}")]
    Ledger(String),
}

impl WebhookError {
    /// Returns true if the failure is transient and a redelivery may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Provider(_) | WebhookError::ProviderTimeout | WebhookError::Ledger(_)
        )
    }

    /// Maps the error to the HTTP status code returned to the provider.
    ///
    /// - 400: the request itself is bad (signature, payload)
    /// - 500: transient internal fault, provider will redeliver
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::MissingSignature
            | WebhookError::InvalidSignature
            | WebhookError::TimestampOutOfRange
            | WebhookError::ParseError(_) => StatusCode::BAD_REQUEST,

            WebhookError::Provider(_) | WebhookError::ProviderTimeout | WebhookError::Ledger(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Text written to the response body.
    ///
    /// Client errors carry their diagnostic; internal faults stay generic.
    pub fn public_message(&self) -> String {
        if self.status_code().is_client_error() {
            self.to_string()
        } else {
            "Internal error".to_string()
        }
    }
}
