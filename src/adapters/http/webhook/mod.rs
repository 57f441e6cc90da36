//! HTTP adapter for the webhook endpoint.
//!
//! - `POST /webhooks/stripe` - Handle Stripe webhooks (signature verified)
//! - `OPTIONS /webhooks/stripe` - CORS preflight
//! - `GET /health` - Liveness check

mod handlers;
mod routes;

pub use handlers::{CorsPolicy, WebhookApiError, WebhookAppState, SIGNATURE_HEADER};
pub use routes::{app_router, webhook_routes};
