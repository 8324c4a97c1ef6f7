//! HTTP transport to the collector
//!
//! A transport performs exactly one attempt. Retry and error classification
//! live in [`DeliveryClient`](crate::client::DeliveryClient).

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, RETRY_AFTER};
use reqwest::{Client, Method};
use serde_json::Value;
use std::time::Duration;

use crate::error::ApiError;

/// A single request to the collector API
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: Method,
    pub path: String,
    pub params: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Send without the `Authorization` header (health checks)
    pub skip_auth: bool,
}

impl TransportRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            params: Vec::new(),
            body: None,
            skip_auth: false,
        }
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_params(mut self, params: Vec<(String, String)>) -> Self {
        self.params = params;
        self
    }

    pub fn without_auth(mut self) -> Self {
        self.skip_auth = true;
        self
    }
}

/// Raw response of one attempt
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    /// `Retry-After` header in seconds, when present and numeric
    pub retry_after: Option<f64>,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One HTTP attempt against the collector.
///
/// Implementations return `Err` only for transport-level failures, which must
/// be [`ApiError::Connection`]. Any HTTP status, success or not, is `Ok`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ApiError>;
}

/// `reqwest`-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpTransport {
    /// Create a transport for `base_url` (trailing slashes are trimmed)
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::connection("failed to build HTTP client", e))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: TransportRequest) -> Result<TransportResponse, ApiError> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(request.method, &url);

        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if !request.skip_auth {
            if let Some(key) = &self.api_key {
                builder = builder.header(AUTHORIZATION, format!("Bearer {}", key));
            }
        }

        let response = builder.send().await.map_err(|e| {
            ApiError::connection(
                format!("failed to connect to AgentLens at {}: {}", self.base_url, e),
                e,
            )
        })?;

        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<f64>().ok());
        let body = response
            .text()
            .await
            .map_err(|e| ApiError::connection("failed to read response body", e))?;

        Ok(TransportResponse {
            status,
            retry_after,
            body,
        })
    }
}
