//! Anthropic messages

use agentlens_telemetry::{CapturedCallRecord, Message, TokenUsage, ToolCall};
use anyhow::{bail, Result};
use serde_json::Value;

use super::{model_name, pick_params, str_field, u64_field};
use crate::interceptor::{Interceptor, PatchTarget};
use crate::pricing::get_cost;

pub const PROVIDER: &str = "anthropic";
pub const MODULE: &str = "anthropic.resources.messages";

const PARAMS: &[&str] = &["temperature", "max_tokens", "top_p", "top_k", "stop_sequences"];

#[derive(Debug, Default, Clone, Copy)]
pub struct AnthropicInterceptor;

impl Interceptor for AnthropicInterceptor {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn targets(&self) -> Vec<PatchTarget> {
        vec![
            PatchTarget::new(MODULE, Some("Messages"), "create", false),
            PatchTarget::new(MODULE, Some("AsyncMessages"), "create", true),
        ]
    }

    fn extract(&self, response: &Value, args: &Value, latency_ms: f64) -> Result<CapturedCallRecord> {
        let Some(blocks) = response.get("content").and_then(Value::as_array) else {
            bail!("unexpected Anthropic response: missing content blocks");
        };

        let mut record = CapturedCallRecord::new(PROVIDER, model_name(response, args));
        record.system_prompt = system_prompt(args.get("system"));
        record.messages = normalise_messages(args.get("messages"));
        record.parameters = pick_params(args, PARAMS);
        record.latency_ms = latency_ms;
        record.finish_reason = str_field(response, "stop_reason")
            .unwrap_or("unknown")
            .to_string();

        let mut text = Vec::new();
        let mut tool_calls = Vec::new();
        for block in blocks {
            match str_field(block, "type") {
                Some("text") => text.push(str_field(block, "text").unwrap_or_default()),
                Some("tool_use") => tool_calls.push(ToolCall {
                    id: str_field(block, "id").unwrap_or_default().to_string(),
                    name: str_field(block, "name").unwrap_or_default().to_string(),
                    arguments: block.get("input").cloned().unwrap_or(Value::Null),
                }),
                _ => {}
            }
        }
        record.completion = (!text.is_empty()).then(|| text.join("\n"));
        record.tool_calls = (!tool_calls.is_empty()).then_some(tool_calls);

        if let Some(usage) = response.get("usage") {
            let input = u64_field(usage, "input_tokens");
            let output = u64_field(usage, "output_tokens");
            record.usage = TokenUsage {
                input_tokens: input,
                output_tokens: output,
                total_tokens: input.saturating_add(output),
                thinking_tokens: None,
            };
        }

        record.cost_usd = get_cost(
            PROVIDER,
            &record.model,
            record.usage.input_tokens,
            record.usage.output_tokens,
        )
        .unwrap_or(0.0);

        Ok(record)
    }
}

/// `system` may be a string or a list of text blocks
fn system_prompt(raw: Option<&Value>) -> Option<String> {
    match raw? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Array(blocks) => Some(
            blocks
                .iter()
                .map(|b| match b {
                    Value::String(s) => s.clone(),
                    other => str_field(other, "text").unwrap_or_default().to_string(),
                })
                .collect::<Vec<_>>()
                .join(" "),
        ),
        other => Some(other.to_string()),
    }
}

fn normalise_messages(raw: Option<&Value>) -> Vec<Message> {
    raw.and_then(Value::as_array)
        .into_iter()
        .flatten()
        .map(|msg| {
            let role = str_field(msg, "role").unwrap_or("user");
            let content = match msg.get("content") {
                Some(Value::String(s)) => s.clone(),
                Some(Value::Array(parts)) => parts
                    .iter()
                    .map(|part| match str_field(part, "type") {
                        Some("text") => str_field(part, "text").unwrap_or_default().to_string(),
                        _ => part.to_string(),
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
                Some(Value::Null) | None => String::new(),
                Some(other) => other.to_string(),
            };
            Message::new(role, content)
        })
        .collect()
}
