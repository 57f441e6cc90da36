//! Axum router configuration for the reconciler.

use std::time::Duration;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

use super::handlers::{health, preflight, receive_stripe_webhook, WebhookAppState};

/// Create the webhook router.
///
/// # Routes
/// - `POST /stripe` - Verify and reconcile a provider event
/// - `OPTIONS /stripe` - CORS preflight (204)
///
/// Any other method answers 405.
pub fn webhook_routes() -> Router<WebhookAppState> {
    Router::new().route("/stripe", post(receive_stripe_webhook).options(preflight))
}

/// Create the complete application router.
///
/// # Example
///
/// ```ignore
/// let app = app_router(state, Duration::from_secs(30));
/// axum::serve(listener, app).await?;
/// ```
pub fn app_router(state: WebhookAppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/webhooks", webhook_routes())
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}
