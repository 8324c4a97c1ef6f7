//! Integration tests for the HTTP delivery path

use agentlens_telemetry::{
    ApiError, CapturedCallRecord, DeliveryClient, EventQuery, EventSender, InstrumentationState,
    Message, RetryPolicy, SessionQuery,
};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sample_record() -> CapturedCallRecord {
    let mut record = CapturedCallRecord::new("openai", "gpt-4o-mini");
    record.messages = vec![Message::new("user", "What is 2+2?")];
    record.completion = Some("4".to_string());
    record.finish_reason = "stop".to_string();
    record.usage.input_tokens = 12;
    record.usage.output_tokens = 1;
    record.usage.total_tokens = 13;
    record
}

async fn posted_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .filter(|r| r.url.path() == "/api/events")
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

#[tokio::test]
async fn test_log_llm_call_sends_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/events"))
        .and(header("authorization", "Bearer al_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"accepted": 2})))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), Some("al_test_key".to_string())).unwrap();
    let result = client
        .log_llm_call("sess-1", "agent-1", &sample_record(), false)
        .await
        .unwrap();

    let bodies = posted_bodies(&server).await;
    let events = bodies[0]["events"].as_array().unwrap();
    assert_eq!(events[0]["payload"]["callId"], result.call_id.as_str());
    assert_eq!(events[0]["payload"]["messages"][0]["content"], "What is 2+2?");
    assert_eq!(events[1]["payload"]["usage"]["totalTokens"], 13);
}

#[tokio::test]
async fn test_authentication_error_from_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({"error": "Invalid API key"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), Some("bad".to_string())).unwrap();
    let err = client
        .log_llm_call("s", "a", &sample_record(), false)
        .await
        .unwrap_err();

    assert!(matches!(err, ApiError::Authentication { ref message } if message == "Invalid API key"));
}

#[tokio::test]
async fn test_validation_error_carries_details() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "Validation failed",
            "details": [{"path": "events.0.sessionId", "message": "Required"}]
        })))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    let err = client
        .log_llm_call("s", "a", &sample_record(), false)
        .await
        .unwrap_err();

    assert_eq!(err.code(), "VALIDATION_ERROR");
    assert_eq!(err.details().unwrap()[0]["message"], "Required");
}

#[tokio::test]
async fn test_retry_after_header_then_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).insert_header("Retry-After", "0.05"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    client
        .log_llm_call("s", "a", &sample_record(), false)
        .await
        .unwrap();

    assert_eq!(posted_bodies(&server).await.len(), 2);
}

#[tokio::test]
async fn test_backpressure_retried_until_success() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let policy = RetryPolicy {
        backoff_base: Duration::from_millis(10),
        ..RetryPolicy::default()
    };
    let client = DeliveryClient::new(&server.uri(), None)
        .unwrap()
        .with_retry_policy(policy);
    client
        .log_llm_call("s", "a", &sample_record(), false)
        .await
        .unwrap();

    assert_eq!(posted_bodies(&server).await.len(), 3);
}

#[tokio::test]
async fn test_health_is_sent_without_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/health"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": "ok", "version": "0.8.0"})),
        )
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), Some("al_secret".to_string())).unwrap();
    let health = client.health().await.unwrap();

    assert_eq!(health.status, "ok");
    assert_eq!(health.version, "0.8.0");
    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].headers.get("authorization").is_none());
}

fn stored_event(id: &str, event_type: &str) -> Value {
    json!({
        "id": id,
        "timestamp": "2025-01-01T00:00:00.000Z",
        "sessionId": "sess-1",
        "agentId": "agent-1",
        "eventType": event_type,
        "severity": "info",
        "payload": {"callId": "c1"},
        "metadata": {},
        "prevHash": null,
        "hash": "abc123"
    })
}

#[tokio::test]
async fn test_query_events_sends_filters_as_query_params() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/events"))
        .and(query_param("sessionId", "sess-1"))
        .and(query_param("eventType", "llm_call,llm_response"))
        .and(query_param("limit", "2"))
        .and(header("authorization", "Bearer al_test_key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [stored_event("e1", "llm_call"), stored_event("e2", "llm_response")],
            "total": 7,
            "hasMore": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), Some("al_test_key".to_string())).unwrap();
    let result = client
        .query_events(&EventQuery {
            session_id: Some("sess-1".to_string()),
            event_types: vec!["llm_call".to_string(), "llm_response".to_string()],
            limit: Some(2),
            ..EventQuery::default()
        })
        .await
        .unwrap();

    assert_eq!(result.total, 7);
    assert!(result.has_more);
    assert_eq!(result.events.len(), 2);
    assert_eq!(result.events[1].event_type, "llm_response");
    assert_eq!(result.events[0].prev_hash, None);
    assert_eq!(result.events[0].payload["callId"], "c1");

    let requests = server.received_requests().await.unwrap();
    assert!(requests[0].url.query_pairs().all(|(k, _)| k != "offset"));
}

#[tokio::test]
async fn test_get_session_missing_maps_to_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"error": "Session not found"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    let err = client.get_session("nope").await.unwrap_err();

    assert!(matches!(err, ApiError::NotFound { ref message } if message == "Session not found"));
    assert_eq!(err.status(), 404);
}

#[tokio::test]
async fn test_get_session_and_timeline() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/sess-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "sess-1",
            "agentId": "agent-1",
            "startedAt": "2025-01-01T00:00:00.000Z",
            "status": "completed",
            "eventCount": 2,
            "llmCallCount": 1,
            "totalCostUsd": 0.0042,
            "tags": ["prod"]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions/sess-1/timeline"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "events": [stored_event("e1", "llm_call")],
            "chainValid": true
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/sessions"))
        .and(query_param("agentId", "agent-1"))
        .and(query_param("status", "completed"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "sessions": [],
            "total": 0
        })))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();

    let session = client.get_session("sess-1").await.unwrap();
    assert_eq!(session.status, "completed");
    assert_eq!(session.llm_call_count, 1);
    assert_eq!(session.ended_at, None);
    assert_eq!(session.tags, vec!["prod".to_string()]);

    let timeline = client.get_session_timeline("sess-1").await.unwrap();
    assert!(timeline.chain_valid);
    assert_eq!(timeline.events[0].hash, "abc123");

    let sessions = client
        .get_sessions(&SessionQuery {
            agent_id: Some("agent-1".to_string()),
            statuses: vec!["completed".to_string()],
            ..SessionQuery::default()
        })
        .await
        .unwrap();
    assert_eq!(sessions.total, 0);
    assert!(!sessions.has_more);
}

#[tokio::test]
async fn test_query_with_wrong_shape_is_api_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/events/e1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"unexpected": true})))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    let err = client.get_event("e1").await.unwrap_err();

    assert_eq!(err.code(), "API_ERROR");
    assert_eq!(err.status(), 200);
}

#[tokio::test]
async fn test_connection_refused_maps_to_connection_error() {
    let client = DeliveryClient::new("http://127.0.0.1:1", None).unwrap();
    let err = client.health().await.unwrap_err();

    assert_eq!(err.code(), "CONNECTION_ERROR");
    assert_eq!(err.status(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_background_sender_delivers_to_collector() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/events"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let client = DeliveryClient::new(&server.uri(), None).unwrap();
    let state = Arc::new(InstrumentationState::new(Arc::new(client), "agent", "sess").with_redact(true));
    let sender = EventSender::new(false).unwrap();
    sender.start();

    sender.send(Arc::clone(&state), sample_record());
    sender.send(state, sample_record());
    assert!(sender.flush(Duration::from_secs(10)));
    sender.stop();

    let bodies = posted_bodies(&server).await;
    assert_eq!(bodies.len(), 2);
    for body in &bodies {
        let events = body["events"].as_array().unwrap();
        assert_eq!(events[0]["payload"]["messages"][0]["content"], "[REDACTED]");
        assert_eq!(events[1]["payload"]["completion"], "[REDACTED]");
        assert_eq!(events[1]["payload"]["redacted"], true);
        assert_eq!(events[0]["metadata"]["source"], "auto-instrumentation");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_sender_swallows_unreachable_collector() {
    let client = DeliveryClient::new("http://127.0.0.1:1", None).unwrap();
    let state = Arc::new(InstrumentationState::new(Arc::new(client), "agent", "sess"));

    let sync_sender = EventSender::new(true).unwrap();
    sync_sender.send(Arc::clone(&state), sample_record());

    let async_sender = EventSender::new(false).unwrap();
    async_sender.start();
    async_sender.send(state, sample_record());
    assert!(async_sender.flush(Duration::from_secs(10)));
    async_sender.stop();
}
