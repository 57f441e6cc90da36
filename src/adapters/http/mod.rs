//! HTTP adapters - axum endpoint exposure.

pub mod webhook;

pub use webhook::{app_router, CorsPolicy, WebhookAppState};
