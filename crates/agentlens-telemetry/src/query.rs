//! Read side of the collector API: event and session queries

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Filters for `GET /api/events`. Unset fields are not sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventQuery {
    pub session_id: Option<String>,
    pub agent_id: Option<String>,
    /// Sent comma-joined as `eventType`
    pub event_types: Vec<String>,
    pub severities: Vec<String>,
    /// ISO-8601 lower bound
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    /// `asc` or `desc`
    pub order: Option<String>,
    pub search: Option<String>,
}

impl EventQuery {
    /// URL query parameters in wire (camelCase) form
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = QueryParams::default();
        params.opt("sessionId", self.session_id.as_ref());
        params.opt("agentId", self.agent_id.as_ref());
        params.list("eventType", &self.event_types);
        params.list("severity", &self.severities);
        params.opt("from", self.from.as_ref());
        params.opt("to", self.to.as_ref());
        params.opt("limit", self.limit.as_ref());
        params.opt("offset", self.offset.as_ref());
        params.opt("order", self.order.as_ref());
        params.opt("search", self.search.as_ref());
        params.0
    }
}

/// Filters for `GET /api/sessions`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionQuery {
    pub agent_id: Option<String>,
    /// `active`, `completed`, `error`
    pub statuses: Vec<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub tags: Vec<String>,
}

impl SessionQuery {
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = QueryParams::default();
        params.opt("agentId", self.agent_id.as_ref());
        params.list("status", &self.statuses);
        params.opt("from", self.from.as_ref());
        params.opt("to", self.to.as_ref());
        params.opt("limit", self.limit.as_ref());
        params.opt("offset", self.offset.as_ref());
        params.list("tags", &self.tags);
        params.0
    }
}

#[derive(Default)]
struct QueryParams(Vec<(String, String)>);

impl QueryParams {
    fn opt<T: ToString>(&mut self, key: &str, value: Option<&T>) {
        if let Some(value) = value {
            self.0.push((key.to_string(), value.to_string()));
        }
    }

    fn list(&mut self, key: &str, values: &[String]) {
        if !values.is_empty() {
            self.0.push((key.to_string(), values.join(",")));
        }
    }
}

/// An event as stored by the collector, including its hash-chain fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    pub id: String,
    pub timestamp: String,
    pub session_id: String,
    pub agent_id: String,
    /// Kept as text: the collector stores event types this SDK never emits
    pub event_type: String,
    pub severity: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub prev_hash: Option<String>,
    #[serde(default)]
    pub hash: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventQueryResult {
    pub events: Vec<StoredEvent>,
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

/// Session summary materialised by the collector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: String,
    pub agent_id: String,
    #[serde(default)]
    pub agent_name: Option<String>,
    pub started_at: String,
    #[serde(default)]
    pub ended_at: Option<String>,
    pub status: String,
    #[serde(default)]
    pub event_count: u64,
    #[serde(default)]
    pub tool_call_count: u64,
    #[serde(default)]
    pub error_count: u64,
    #[serde(default)]
    pub total_cost_usd: f64,
    #[serde(default)]
    pub llm_call_count: u64,
    #[serde(default)]
    pub total_input_tokens: u64,
    #[serde(default)]
    pub total_output_tokens: u64,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionQueryResult {
    pub sessions: Vec<Session>,
    pub total: u64,
    #[serde(default)]
    pub has_more: bool,
}

/// Events of one session in order, with the hash-chain verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineResult {
    pub events: Vec<StoredEvent>,
    pub chain_valid: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pairs(params: &[(String, String)]) -> Vec<(&str, &str)> {
        params.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect()
    }

    #[test]
    fn test_empty_query_sends_no_params() {
        assert!(EventQuery::default().params().is_empty());
        assert!(SessionQuery::default().params().is_empty());
    }

    #[test]
    fn test_event_query_params_are_camel_case_and_joined() {
        let query = EventQuery {
            session_id: Some("s1".to_string()),
            event_types: vec!["llm_call".to_string(), "llm_response".to_string()],
            limit: Some(50),
            order: Some("desc".to_string()),
            ..EventQuery::default()
        };

        assert_eq!(
            pairs(&query.params()),
            vec![
                ("sessionId", "s1"),
                ("eventType", "llm_call,llm_response"),
                ("limit", "50"),
                ("order", "desc"),
            ]
        );
    }

    #[test]
    fn test_session_query_params() {
        let query = SessionQuery {
            agent_id: Some("planner".to_string()),
            statuses: vec!["active".to_string()],
            tags: vec!["prod".to_string(), "eu".to_string()],
            offset: Some(10),
            ..SessionQuery::default()
        };

        assert_eq!(
            pairs(&query.params()),
            vec![
                ("agentId", "planner"),
                ("status", "active"),
                ("offset", "10"),
                ("tags", "prod,eu"),
            ]
        );
    }

    #[test]
    fn test_session_tolerates_missing_counters() {
        let session: Session = serde_json::from_value(json!({
            "id": "s1",
            "agentId": "a1",
            "startedAt": "2025-01-01T00:00:00.000Z",
            "status": "active",
            "llmCallCount": 3
        }))
        .unwrap();

        assert_eq!(session.llm_call_count, 3);
        assert_eq!(session.event_count, 0);
        assert!(session.tags.is_empty());
    }
}
