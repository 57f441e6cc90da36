//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe:
//! - Subscription and connected-account retrieval
//! - Subscription metadata back-fill
//!
//! Webhook signature verification lives in the domain
//! (`domain::billing::WebhookVerifier`); this adapter only makes outbound calls.
//! API keys are held as `secrecy::SecretString`.

mod mock_payment_provider;
mod stripe_adapter;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter, DEFAULT_API_BASE_URL};
