//! Collector API client with classified retry
//!
//! Every call funnels through [`DeliveryClient::request`], which turns one
//! logical request into one or more transport attempts governed by
//! [`RetryPolicy`]. Retryable kinds are retried transparently; everything
//! else surfaces immediately.

use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::error::{map_http_error, ApiError};
use crate::events::{build_llm_call_events, now_timestamp, EventBatch, EventSource};
use crate::query::{
    EventQuery, EventQueryResult, Session, SessionQuery, SessionQueryResult, StoredEvent,
    TimelineResult,
};
use crate::record::CapturedCallRecord;
use crate::redact::RedactionPipeline;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::transport::{HttpTransport, Transport, TransportRequest};

/// Path events are posted to
pub const EVENTS_PATH: &str = "/api/events";
const HEALTH_PATH: &str = "/api/health";
const SESSIONS_PATH: &str = "/api/sessions";

/// Result of logging an LLM call through the explicit API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogLlmCallResult {
    pub call_id: String,
}

/// Collector health check response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthResult {
    pub status: String,
    pub version: String,
}

/// Client for the AgentLens collector API
pub struct DeliveryClient {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
}

impl DeliveryClient {
    /// Create an HTTP client for `base_url`
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, ApiError> {
        let transport = HttpTransport::new(base_url, api_key)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    /// Create a client over any transport
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Perform a request, retrying rate limits and backpressure.
    ///
    /// Connection failures are not retried here. Successful responses are
    /// parsed as JSON; an empty body yields `Value::Null`.
    pub async fn request(&self, request: TransportRequest) -> Result<Value, ApiError> {
        let mut attempt: u32 = 0;
        loop {
            let response = self.transport.execute(request.clone()).await?;

            if response.is_success() {
                return parse_body(response.status, &response.body);
            }

            let error = map_http_error(response.status, &response.body, response.retry_after);
            match self.retry.decide(attempt, &error) {
                RetryDecision::RetryAfter(delay) => {
                    debug!(
                        "AgentLens: {} {} returned {}, retrying in {:.1}s",
                        request.method,
                        request.path,
                        response.status,
                        delay.as_secs_f64()
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                RetryDecision::GiveUp => return Err(error),
            }
        }
    }

    /// Post a batch of events
    pub async fn send_events(&self, batch: &EventBatch) -> Result<Value, ApiError> {
        let body = serde_json::to_value(batch).map_err(|e| ApiError::Validation {
            message: format!("failed to serialize events: {}", e),
            details: None,
        })?;
        self.request(TransportRequest::new(Method::POST, EVENTS_PATH).with_body(body))
            .await
    }

    /// Log a complete LLM call (request + response) as paired events.
    ///
    /// Errors are returned to the caller.
    pub async fn log_llm_call(
        &self,
        session_id: &str,
        agent_id: &str,
        record: &CapturedCallRecord,
        redact: bool,
    ) -> Result<LogLlmCallResult, ApiError> {
        let call_id = Uuid::new_v4().to_string();
        let redaction = if redact {
            RedactionPipeline::blackout()
        } else {
            RedactionPipeline::default()
        };
        let events = build_llm_call_events(
            session_id,
            agent_id,
            record,
            &redaction,
            &call_id,
            &now_timestamp(),
            EventSource::Explicit,
        );

        self.send_events(&EventBatch { events }).await?;
        Ok(LogLlmCallResult { call_id })
    }

    /// Check collector health (sent without credentials)
    pub async fn health(&self) -> Result<HealthResult, ApiError> {
        let value = self
            .request(TransportRequest::new(Method::GET, HEALTH_PATH).without_auth())
            .await?;
        decode(value, "health")
    }

    /// Query stored events
    pub async fn query_events(&self, query: &EventQuery) -> Result<EventQueryResult, ApiError> {
        self.get(EVENTS_PATH.to_string(), query.params(), "event query")
            .await
    }

    /// Fetch one stored event
    pub async fn get_event(&self, id: &str) -> Result<StoredEvent, ApiError> {
        self.get(format!("{}/{}", EVENTS_PATH, id), Vec::new(), "event")
            .await
    }

    /// Query session summaries
    pub async fn get_sessions(&self, query: &SessionQuery) -> Result<SessionQueryResult, ApiError> {
        self.get(SESSIONS_PATH.to_string(), query.params(), "session query")
            .await
    }

    /// Fetch one session summary
    pub async fn get_session(&self, id: &str) -> Result<Session, ApiError> {
        self.get(format!("{}/{}", SESSIONS_PATH, id), Vec::new(), "session")
            .await
    }

    /// Fetch a session's ordered events and hash-chain verdict
    pub async fn get_session_timeline(&self, id: &str) -> Result<TimelineResult, ApiError> {
        self.get(
            format!("{}/{}/timeline", SESSIONS_PATH, id),
            Vec::new(),
            "timeline",
        )
        .await
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: String,
        params: Vec<(String, String)>,
        what: &str,
    ) -> Result<T, ApiError> {
        let value = self
            .request(TransportRequest::new(Method::GET, path).with_params(params))
            .await?;
        decode(value, what)
    }
}

fn decode<T: DeserializeOwned>(value: Value, what: &str) -> Result<T, ApiError> {
    serde_json::from_value(value).map_err(|e| ApiError::Api {
        status: 200,
        message: format!("unexpected {} response: {}", what, e),
        details: None,
    })
}

fn parse_body(status: u16, body: &str) -> Result<Value, ApiError> {
    if body.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(body).map_err(|e| ApiError::Api {
        status,
        message: format!("invalid JSON response: {}", e),
        details: None,
    })
}
