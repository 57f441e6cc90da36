//! HTTP handlers for the webhook endpoint.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};

use crate::application::{HandleBillingWebhookCommand, HandleBillingWebhookHandler};
use crate::domain::billing::WebhookError;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "Stripe-Signature";

const ALLOWED_METHODS: &str = "POST, OPTIONS";
const ALLOWED_HEADERS: &str = "content-type, stripe-signature";

/// Shared state for webhook routes.
#[derive(Clone)]
pub struct WebhookAppState {
    pub webhook_handler: Arc<HandleBillingWebhookHandler>,
    pub cors: Arc<CorsPolicy>,
}

impl WebhookAppState {
    pub fn new(webhook_handler: Arc<HandleBillingWebhookHandler>, cors: CorsPolicy) -> Self {
        Self {
            webhook_handler,
            cors: Arc::new(cors),
        }
    }
}

/// Origins allowed to preflight the webhook endpoint.
///
/// An empty list (or one containing `*`) allows any origin.
#[derive(Debug, Clone, Default)]
pub struct CorsPolicy {
    origins: Vec<String>,
}

impl CorsPolicy {
    pub fn new(origins: Vec<String>) -> Self {
        Self { origins }
    }

    /// Value for `Access-Control-Allow-Origin`, if the origin is allowed.
    pub fn allow_origin(&self, request_origin: Option<&str>) -> Option<String> {
        if self.origins.is_empty() || self.origins.iter().any(|o| o == "*") {
            return Some("*".to_string());
        }
        request_origin
            .filter(|origin| self.origins.iter().any(|o| o == origin))
            .map(str::to_string)
    }
}

/// POST /webhooks/stripe - Verify and reconcile a provider event
pub async fn receive_stripe_webhook(
    State(state): State<WebhookAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, WebhookApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    let outcome = state.webhook_handler.handle(cmd).await?;
    tracing::debug!(?outcome, "Webhook acknowledged");

    Ok((StatusCode::OK, "ok"))
}

/// OPTIONS /webhooks/stripe - CORS preflight
pub async fn preflight(State(state): State<WebhookAppState>, headers: HeaderMap) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    let mut response = StatusCode::NO_CONTENT.into_response();
    let response_headers = response.headers_mut();
    if let Some(allowed) = state
        .cors
        .allow_origin(origin)
        .and_then(|o| HeaderValue::from_str(&o).ok())
    {
        response_headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed);
    }
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    response_headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    response
}

/// GET /health - Liveness check
pub async fn health() -> &'static str {
    "ok"
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts webhook errors to HTTP responses.
#[derive(Debug)]
pub struct WebhookApiError(WebhookError);

impl From<WebhookError> for WebhookApiError {
    fn from(err: WebhookError) -> Self {
        Self(err)
    }
}

impl IntoResponse for WebhookApiError {
    fn into_response(self) -> Response {
        let status = self.0.status_code();

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Webhook failed, provider will retry");
        } else {
            tracing::warn!(error = %self.0, "Webhook rejected");
        }

        (status, self.0.public_message()).into_response()
    }
}
