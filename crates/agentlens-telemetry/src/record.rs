//! Captured LLM call data

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single message in the conversation sent to the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String, // "system" | "user" | "assistant" | "tool"
    /// Plain text or a list of content parts
    pub content: Value,
}

impl Message {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: Value::String(content.into()),
        }
    }
}

/// A tool call requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

/// Token accounting for one call
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_tokens: Option<u64>,
}

/// Everything captured from one intercepted provider call.
///
/// Produced once by an extractor; never mutated afterwards. Redaction works
/// on copies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CapturedCallRecord {
    pub provider: String,
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(default)]
    pub system_prompt: Option<String>,
    #[serde(default)]
    pub completion: Option<String>,
    #[serde(default)]
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: String,
    pub usage: TokenUsage,
    pub cost_usd: f64,
    pub latency_ms: f64,
    #[serde(default)]
    pub parameters: Option<Value>,
}

impl CapturedCallRecord {
    /// Start a record with empty content and zero usage
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            model: model.into(),
            messages: Vec::new(),
            system_prompt: None,
            completion: None,
            tool_calls: None,
            finish_reason: "unknown".to_string(),
            usage: TokenUsage::default(),
            cost_usd: 0.0,
            latency_ms: 0.0,
            parameters: None,
        }
    }
}
