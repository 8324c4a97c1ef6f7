//! Typed error taxonomy for collector API calls

use serde_json::Value;
use thiserror::Error;

/// Errors raised by [`DeliveryClient`](crate::client::DeliveryClient).
///
/// Variants are checked in this order when mapping an HTTP status:
/// 401, 402, 429, 503, 400, 404, anything else.
#[derive(Debug, Error)]
pub enum ApiError {
    /// 401 - never retried
    #[error("authentication failed: {message}")]
    Authentication { message: String },

    /// 402 - never retried
    #[error("quota exceeded: {message}")]
    QuotaExceeded { message: String },

    /// 429 - retried, honoring `Retry-After` when the server sends one
    #[error("rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<f64>,
    },

    /// 503 - retried with exponential backoff
    #[error("server applying backpressure: {message}")]
    Backpressure { message: String },

    /// 400 - never retried
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        details: Option<Value>,
    },

    /// 404 - never retried
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Refused, unreachable, timed out. Not retried by the client.
    #[error("connection failed: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Any other non-success status
    #[error("API error (HTTP {status}): {message}")]
    Api {
        status: u16,
        message: String,
        details: Option<Value>,
    },
}

impl ApiError {
    /// Build a connection error from a transport failure
    pub fn connection(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ApiError::Connection {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// HTTP status this error was mapped from (0 for connection failures)
    pub fn status(&self) -> u16 {
        match self {
            ApiError::Authentication { .. } => 401,
            ApiError::QuotaExceeded { .. } => 402,
            ApiError::RateLimited { .. } => 429,
            ApiError::Backpressure { .. } => 503,
            ApiError::Validation { .. } => 400,
            ApiError::NotFound { .. } => 404,
            ApiError::Connection { .. } => 0,
            ApiError::Api { status, .. } => *status,
        }
    }

    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Authentication { .. } => "AUTHENTICATION_ERROR",
            ApiError::QuotaExceeded { .. } => "QUOTA_EXCEEDED",
            ApiError::RateLimited { .. } => "RATE_LIMIT",
            ApiError::Backpressure { .. } => "BACKPRESSURE",
            ApiError::Validation { .. } => "VALIDATION_ERROR",
            ApiError::NotFound { .. } => "NOT_FOUND",
            ApiError::Connection { .. } => "CONNECTION_ERROR",
            ApiError::Api { .. } => "API_ERROR",
        }
    }

    /// Whether the retry policy may try this request again
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ApiError::RateLimited { .. } | ApiError::Backpressure { .. }
        )
    }

    /// Structured details sent by the server, if any
    pub fn details(&self) -> Option<&Value> {
        match self {
            ApiError::Validation { details, .. } | ApiError::Api { details, .. } => {
                details.as_ref()
            }
            _ => None,
        }
    }
}

/// Map an HTTP status and response body to the matching error kind.
///
/// JSON object bodies contribute `error` (message) and `details`; anything else
/// uses the raw body text, or `HTTP <status>` when the body is empty.
pub fn map_http_error(status: u16, body: &str, retry_after: Option<f64>) -> ApiError {
    let parsed: Option<Value> = serde_json::from_str(body).ok();

    let (message, details) = match parsed.as_ref().and_then(Value::as_object) {
        Some(obj) => {
            let message = match obj.get("error") {
                Some(Value::String(s)) if !s.is_empty() => s.clone(),
                Some(v) if !v.is_null() && v != "" => v.to_string(),
                _ => fallback_message(status, body),
            };
            (message, obj.get("details").cloned().filter(|d| !d.is_null()))
        }
        None => (fallback_message(status, body), None),
    };

    match status {
        401 => ApiError::Authentication { message },
        402 => ApiError::QuotaExceeded { message },
        429 => ApiError::RateLimited {
            message,
            retry_after,
        },
        503 => ApiError::Backpressure { message },
        400 => ApiError::Validation { message, details },
        404 => ApiError::NotFound { message },
        _ => ApiError::Api {
            status,
            message,
            details,
        },
    }
}

fn fallback_message(status: u16, body: &str) -> String {
    if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        body.to_string()
    }
}
