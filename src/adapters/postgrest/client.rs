//! Shared HTTP plumbing for the PostgREST ledger adapters.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;

use crate::domain::foundation::{DomainError, ErrorCode};

/// PostgREST store configuration.
#[derive(Clone)]
pub struct PostgrestConfig {
    /// REST root, e.g. `https://project.supabase.co/rest/v1`.
    base_url: String,
    /// Service-role key, sent as `apikey` and bearer token.
    service_key: SecretString,
    request_timeout: Duration,
}

impl PostgrestConfig {
    pub fn new(base_url: impl Into<String>, service_key: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

/// Authenticated client shared by both ledgers.
#[derive(Clone)]
pub struct PostgrestClient {
    base_url: String,
    http_client: reqwest::Client,
}

impl PostgrestClient {
    pub fn new(config: PostgrestConfig) -> Result<Self, DomainError> {
        let key = config.service_key.expose_secret();
        let mut headers = HeaderMap::new();
        headers.insert("apikey", header_value(key)?);
        headers.insert(AUTHORIZATION, header_value(&format!("Bearer {}", key))?);

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| {
                DomainError::new(ErrorCode::InternalError, format!("Failed to build ledger client: {}", e))
            })?;

        Ok(Self {
            base_url: config.base_url,
            http_client,
        })
    }

    /// Request against `/{table}`.
    pub fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http_client
            .request(method, format!("{}/{}", self.base_url, table))
    }

    /// Sends the request and decodes a JSON array of rows.
    pub async fn rows<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Vec<T>, DomainError> {
        let response = send(request).await?;
        response.json().await.map_err(|e| {
            DomainError::new(
                ErrorCode::DatabaseError,
                format!("Failed to parse ledger response: {}", e),
            )
        })
    }
}

fn header_value(value: &str) -> Result<HeaderValue, DomainError> {
    let mut header = HeaderValue::from_str(value).map_err(|_| {
        DomainError::new(ErrorCode::ValidationFailed, "Ledger service key is not a valid header value")
    })?;
    header.set_sensitive(true);
    Ok(header)
}

async fn send(request: RequestBuilder) -> Result<Response, DomainError> {
    let response = request.send().await.map_err(|e| {
        let code = if e.is_timeout() {
            ErrorCode::Timeout
        } else {
            ErrorCode::ExternalServiceError
        };
        DomainError::new(code, format!("Ledger request failed: {}", e))
    })?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(DomainError::database(format!("Ledger API error ({}): {}", status, body))
            .with_detail("status", status.as_str()));
    }

    Ok(response)
}

/// `eq.` filter value for a query parameter.
pub fn eq(value: &str) -> String {
    format!("eq.{}", value)
}
