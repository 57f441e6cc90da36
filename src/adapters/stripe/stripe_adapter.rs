//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port over the Stripe REST API: subscription
//! and account retrieval, and subscription metadata updates.
//!
//! # Configuration
//!
//! ```ignore
//! let config = StripeConfig::new(api_key).with_base_url(server.url());
//! let adapter = StripePaymentAdapter::new(config);
//! ```

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::domain::billing::{AccountSnapshot, Metadata, SubscriptionSnapshot};
use crate::ports::{PaymentError, PaymentErrorCode, PaymentProvider};

/// Default Stripe API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.stripe.com";

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_..., sk_test_... or restricted rk_...).
    api_key: SecretString,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// HTTP client timeout per request.
    request_timeout: Duration,
}

impl StripeConfig {
    /// Create a new Stripe configuration.
    pub fn new(api_key: SecretString) -> Self {
        Self {
            api_key,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the HTTP client timeout.
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

/// Error body returned by the Stripe API.
#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    error: StripeErrorDetail,
}

#[derive(Debug, Deserialize)]
struct StripeErrorDetail {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl StripePaymentAdapter {
    /// Create a new Stripe adapter with the given configuration.
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .unwrap_or_default();

        Self {
            config,
            http_client,
        }
    }

    /// GET a Stripe object, mapping 404 to `None`.
    async fn get_object<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, PaymentError> {
        let url = format!("{}{}", self.config.api_base_url, path);

        let response = self
            .http_client
            .get(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        let object = response.json().await.map_err(|e| {
            PaymentError::invalid_response(format!("Failed to parse Stripe response: {}", e))
        })?;

        Ok(Some(object))
    }
}

/// Maps a non-success Stripe response to a `PaymentError`.
async fn error_from_response(response: reqwest::Response) -> PaymentError {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<StripeErrorBody>(&body).ok().map(|b| b.error);

    let message = detail
        .as_ref()
        .and_then(|d| d.message.clone())
        .unwrap_or_else(|| body.clone());

    let code = match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            PaymentErrorCode::AuthenticationError
        }
        reqwest::StatusCode::NOT_FOUND => PaymentErrorCode::NotFound,
        reqwest::StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        _ => PaymentErrorCode::ProviderError,
    };

    tracing::error!(status = %status, error = %message, "Stripe API call failed");

    let error = PaymentError::new(code, format!("Stripe API error ({}): {}", status, message));
    match detail.and_then(|d| d.code) {
        Some(provider_code) => error.with_provider_code(provider_code),
        None => error,
    }
}

/// Form fields for a metadata update: `metadata[key]=value`.
fn metadata_form(metadata: &Metadata) -> Vec<(String, String)> {
    metadata
        .iter()
        .map(|(k, v)| (format!("metadata[{}]", k), v.clone()))
        .collect()
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<SubscriptionSnapshot>, PaymentError> {
        self.get_object(&format!("/v1/subscriptions/{}", subscription_id))
            .await
    }

    async fn get_account(&self, account_id: &str) -> Result<Option<AccountSnapshot>, PaymentError> {
        self.get_object(&format!("/v1/accounts/{}", account_id)).await
    }

    async fn update_subscription_metadata(
        &self,
        subscription_id: &str,
        metadata: &Metadata,
    ) -> Result<(), PaymentError> {
        let url = format!(
            "{}/v1/subscriptions/{}",
            self.config.api_base_url, subscription_id
        );

        let response = self
            .http_client
            .post(&url)
            .basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None)
            .form(&metadata_form(metadata))
            .send()
            .await
            .map_err(|e| PaymentError::network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(error_from_response(response).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn adapter(server: &mockito::ServerGuard) -> StripePaymentAdapter {
        StripePaymentAdapter::new(
            StripeConfig::new(SecretString::new("sk_test_123".to_string()))
                .with_base_url(server.url()),
        )
    }

    // ══════════════════════════════════════════════════════════════
    // Subscription Retrieval
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn get_subscription_parses_snapshot() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/subscriptions/sub_1")
            .match_header("authorization", Matcher::Regex("^Basic ".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"sub_1","object":"subscription","status":"active","customer":"cus_1",
                    "current_period_end":1706745600,"cancel_at_period_end":false,
                    "metadata":{"fan_id":"F1","creator_id":"C1"}}"#,
            )
            .create_async()
            .await;

        let snapshot = adapter(&server).get_subscription("sub_1").await.unwrap().unwrap();

        mock.assert_async().await;
        assert_eq!(snapshot.status, "active");
        assert_eq!(snapshot.customer_id.as_deref(), Some("cus_1"));
        assert_eq!(snapshot.metadata.get("fan_id").map(String::as_str), Some("F1"));
    }

    #[tokio::test]
    async fn get_subscription_returns_none_on_404() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_missing")
            .with_status(404)
            .with_body(r#"{"error":{"code":"resource_missing","message":"No such subscription"}}"#)
            .create_async()
            .await;

        let result = adapter(&server).get_subscription("sub_missing").await.unwrap();

        assert!(result.is_none());
    }

    #[tokio::test]
    async fn server_error_is_retryable_provider_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_1")
            .with_status(500)
            .with_body(r#"{"error":{"code":"api_error","message":"Something went wrong"}}"#)
            .create_async()
            .await;

        let err = adapter(&server).get_subscription("sub_1").await.unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::ProviderError);
        assert_eq!(err.provider_code.as_deref(), Some("api_error"));
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn unauthorized_is_authentication_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/accounts/acct_1")
            .with_status(401)
            .with_body(r#"{"error":{"message":"Invalid API Key provided"}}"#)
            .create_async()
            .await;

        let err = adapter(&server).get_account("acct_1").await.unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::AuthenticationError);
        assert!(!err.retryable);
    }

    #[tokio::test]
    async fn get_account_parses_capabilities() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/accounts/acct_1")
            .with_status(200)
            .with_body(r#"{"id":"acct_1","object":"account","charges_enabled":true,"payouts_enabled":false}"#)
            .create_async()
            .await;

        let account = adapter(&server).get_account("acct_1").await.unwrap().unwrap();

        assert!(account.charges_enabled);
        assert!(!account.payouts_enabled);
    }

    #[tokio::test]
    async fn malformed_body_is_invalid_response() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/v1/subscriptions/sub_1")
            .with_status(200)
            .with_body("<html>")
            .create_async()
            .await;

        let err = adapter(&server).get_subscription("sub_1").await.unwrap_err();

        assert_eq!(err.code, PaymentErrorCode::InvalidResponse);
    }

    // ══════════════════════════════════════════════════════════════
    // Metadata Update
    // ══════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn update_metadata_posts_bracketed_form_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/subscriptions/sub_1")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("metadata[fan_id]".to_string(), "F1".to_string()),
                Matcher::UrlEncoded("metadata[creator_id]".to_string(), "C1".to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"id":"sub_1","status":"active"}"#)
            .create_async()
            .await;

        let metadata: Metadata = [
            ("fan_id".to_string(), "F1".to_string()),
            ("creator_id".to_string(), "C1".to_string()),
        ]
        .into();
        adapter(&server)
            .update_subscription_metadata("sub_1", &metadata)
            .await
            .unwrap();

        mock.assert_async().await;
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let config = StripeConfig::new(SecretString::new("sk_test".to_string()))
            .with_base_url("http://localhost:1234/");
        assert_eq!(config.api_base_url, "http://localhost:1234");
    }
}
