//! Telemetry event wire format
//!
//! One captured call becomes two correlated events, `llm_call` followed by
//! `llm_response`, sharing a `callId` and timestamp. Both are posted together
//! as `{"events": [...]}`.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::record::{CapturedCallRecord, TokenUsage};
use crate::redact::{RedactionPipeline, REDACTED};

/// Event kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    LlmCall,
    LlmResponse,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

/// Where an event came from; recorded in `metadata`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSource {
    /// Captured by an installed interceptor
    AutoInstrumentation,
    /// Logged explicitly through the client API
    Explicit,
}

impl EventSource {
    fn metadata(self) -> Value {
        match self {
            EventSource::AutoInstrumentation => json!({"source": "auto-instrumentation"}),
            EventSource::Explicit => json!({}),
        }
    }
}

/// A single telemetry event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub session_id: String,
    pub agent_id: String,
    pub event_type: EventType,
    pub severity: Severity,
    pub payload: Value,
    pub metadata: Value,
    pub timestamp: String, // ISO-8601 UTC
}

/// Request body for `POST /api/events`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventBatch {
    pub events: Vec<Event>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LlmCallPayload<'a> {
    call_id: &'a str,
    provider: &'a str,
    model: &'a str,
    messages: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_prompt: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    parameters: Option<Value>,
    #[serde(skip_serializing_if = "is_false")]
    redacted: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct LlmResponsePayload<'a> {
    call_id: &'a str,
    provider: &'a str,
    model: &'a str,
    completion: Option<String>,
    finish_reason: &'a str,
    usage: &'a TokenUsage,
    cost_usd: f64,
    latency_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Value>,
    #[serde(skip_serializing_if = "is_false")]
    redacted: bool,
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// Current time as an ISO-8601 UTC string
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Build the paired `llm_call` / `llm_response` events for one record.
///
/// The record is read, never modified; redaction produces new values.
pub fn build_llm_call_events(
    session_id: &str,
    agent_id: &str,
    record: &CapturedCallRecord,
    redaction: &RedactionPipeline,
    call_id: &str,
    timestamp: &str,
    source: EventSource,
) -> Vec<Event> {
    let redacted = redaction.is_blackout();

    let messages = record
        .messages
        .iter()
        .map(|m| json!({"role": m.role, "content": redaction.content_field(&m.content)}))
        .collect();

    let call_payload = LlmCallPayload {
        call_id,
        provider: &record.provider,
        model: &record.model,
        messages,
        system_prompt: record.system_prompt.as_deref().map(|s| redaction.text_field(s)),
        parameters: record
            .parameters
            .as_ref()
            .map(|p| redaction.structured_field(p)),
        redacted,
    };

    let completion = if redacted {
        Some(REDACTED.to_string())
    } else {
        record.completion.as_deref().map(|c| redaction.text_field(c))
    };

    let response_payload = LlmResponsePayload {
        call_id,
        provider: &record.provider,
        model: &record.model,
        completion,
        finish_reason: &record.finish_reason,
        usage: &record.usage,
        cost_usd: record.cost_usd,
        latency_ms: record.latency_ms,
        tool_calls: record.tool_calls.as_ref().map(|calls| {
            redaction.structured_field(&serde_json::to_value(calls).unwrap_or(Value::Null))
        }),
        redacted,
    };

    let event = |event_type, payload: Value| Event {
        session_id: session_id.to_string(),
        agent_id: agent_id.to_string(),
        event_type,
        severity: Severity::Info,
        payload,
        metadata: source.metadata(),
        timestamp: timestamp.to_string(),
    };

    vec![
        event(
            EventType::LlmCall,
            serde_json::to_value(&call_payload).unwrap_or(Value::Null),
        ),
        event(
            EventType::LlmResponse,
            serde_json::to_value(&response_payload).unwrap_or(Value::Null),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Message, ToolCall};
    use crate::redact::PII_EMAIL;
    use regex::Regex;

    fn sample_record() -> CapturedCallRecord {
        CapturedCallRecord {
            provider: "openai".to_string(),
            model: "gpt-4o".to_string(),
            messages: vec![Message::new("user", "My email is test@example.com")],
            system_prompt: Some("You are helpful. Contact admin@corp.com".to_string()),
            completion: Some("Sure! Your email is test@example.com".to_string()),
            tool_calls: None,
            finish_reason: "stop".to_string(),
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                total_tokens: 15,
                thinking_tokens: None,
            },
            cost_usd: 0.001,
            latency_ms: 100.0,
            parameters: None,
        }
    }

    fn build(record: &CapturedCallRecord, redaction: &RedactionPipeline) -> Vec<Event> {
        build_llm_call_events(
            "sess-1",
            "agent-1",
            record,
            redaction,
            "call-1",
            "2026-01-01T00:00:00.000Z",
            EventSource::AutoInstrumentation,
        )
    }

    #[test]
    fn test_paired_events_share_call_id_and_timestamp() {
        let events = build(&sample_record(), &RedactionPipeline::default());

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type, EventType::LlmCall);
        assert_eq!(events[1].event_type, EventType::LlmResponse);
        assert_eq!(events[0].payload["callId"], events[1].payload["callId"]);
        assert_eq!(events[0].timestamp, events[1].timestamp);
        assert_eq!(events[0].metadata, json!({"source": "auto-instrumentation"}));
    }

    #[test]
    fn test_wire_field_names() {
        let events = build(&sample_record(), &RedactionPipeline::default());
        let wire = serde_json::to_value(&events[0]).unwrap();

        assert_eq!(wire["sessionId"], "sess-1");
        assert_eq!(wire["agentId"], "agent-1");
        assert_eq!(wire["eventType"], "llm_call");
        assert_eq!(wire["severity"], "info");
        assert_eq!(wire["payload"]["systemPrompt"], "You are helpful. Contact admin@corp.com");
        assert!(wire["payload"].get("redacted").is_none());
        assert!(wire["payload"].get("parameters").is_none());

        let response = &events[1].payload;
        assert_eq!(response["finishReason"], "stop");
        assert_eq!(response["usage"], json!({"inputTokens": 10, "outputTokens": 5, "totalTokens": 15}));
        assert_eq!(response["costUsd"], 0.001);
        assert_eq!(response["latencyMs"], 100.0);
        assert!(response.get("toolCalls").is_none());
    }

    #[test]
    fn test_blackout_redacts_text_and_marks_payloads() {
        let record = sample_record();
        let events = build(&record, &RedactionPipeline::blackout());

        let call = &events[0].payload;
        assert_eq!(call["messages"][0]["content"], REDACTED);
        assert_eq!(call["messages"][0]["role"], "user");
        assert_eq!(call["systemPrompt"], REDACTED);
        assert_eq!(call["redacted"], true);

        let response = &events[1].payload;
        assert_eq!(response["completion"], REDACTED);
        assert_eq!(response["redacted"], true);
        assert_eq!(response["usage"]["totalTokens"], 15);

        assert_eq!(record, sample_record());
    }

    #[test]
    fn test_patterns_scrub_every_payload_but_keep_structure() {
        let mut record = sample_record();
        record.tool_calls = Some(vec![ToolCall {
            id: "t1".to_string(),
            name: "send_mail".to_string(),
            arguments: json!({"to": "test@example.com"}),
        }]);
        record.parameters = Some(json!({"temperature": 0.2, "user": "test@example.com"}));

        let pipeline = RedactionPipeline::with_patterns(vec![Regex::new(PII_EMAIL).unwrap()]);
        let events = build(&record, &pipeline);

        for event in &events {
            let text = serde_json::to_string(&event.payload).unwrap();
            assert!(!text.contains("test@example.com"), "leaked in {text}");
            assert!(!text.contains("admin@corp.com"), "leaked in {text}");
            assert_eq!(event.payload["model"], "gpt-4o");
            assert!(event.payload.get("redacted").is_none());
        }
        assert_eq!(events[1].payload["usage"]["inputTokens"], 10);
        assert_eq!(events[0].payload["parameters"]["temperature"], 0.2);
        assert_eq!(events[1].payload["toolCalls"][0]["name"], "send_mail");
        assert_eq!(record.messages[0].content, "My email is test@example.com");
    }

    #[test]
    fn test_thinking_tokens_and_null_completion() {
        let mut record = sample_record();
        record.usage.thinking_tokens = Some(42);
        record.completion = None;

        let events = build(&record, &RedactionPipeline::default());
        assert_eq!(events[1].payload["usage"]["thinkingTokens"], 42);
        assert!(events[1].payload["completion"].is_null());
    }

    #[test]
    fn test_explicit_source_has_empty_metadata() {
        let events = build_llm_call_events(
            "s",
            "a",
            &sample_record(),
            &RedactionPipeline::default(),
            "c",
            &now_timestamp(),
            EventSource::Explicit,
        );
        assert_eq!(events[0].metadata, json!({}));
        assert!(events[0].timestamp.ends_with('Z'));
    }
}
