//! OpenAI chat completions

use agentlens_telemetry::{CapturedCallRecord, Message, TokenUsage, ToolCall};
use anyhow::{bail, Result};
use serde_json::Value;

use super::{model_name, pick_params, str_field, u64_field};
use crate::interceptor::{Interceptor, PatchTarget};
use crate::pricing::get_cost;

pub const PROVIDER: &str = "openai";
pub const MODULE: &str = "openai.resources.chat.completions";

const PARAMS: &[&str] = &[
    "temperature",
    "max_tokens",
    "top_p",
    "stop",
    "frequency_penalty",
    "presence_penalty",
];

#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiInterceptor;

impl Interceptor for OpenAiInterceptor {
    fn provider(&self) -> &str {
        PROVIDER
    }

    fn targets(&self) -> Vec<PatchTarget> {
        vec![
            PatchTarget::new(MODULE, Some("Completions"), "create", false),
            PatchTarget::new(MODULE, Some("AsyncCompletions"), "create", true),
        ]
    }

    fn extract(&self, response: &Value, args: &Value, latency_ms: f64) -> Result<CapturedCallRecord> {
        if !response.is_object() {
            bail!("unexpected OpenAI response: expected an object");
        }

        let mut record = CapturedCallRecord::new(PROVIDER, model_name(response, args));
        let (system_prompt, messages) = extract_messages(args.get("messages"));
        record.messages = messages;
        record.system_prompt = system_prompt;
        record.parameters = pick_params(args, PARAMS);
        record.latency_ms = latency_ms;

        if let Some(choice) = response.get("choices").and_then(|c| c.get(0)) {
            let message = choice.get("message").unwrap_or(&Value::Null);
            record.completion = str_field(message, "content").map(str::to_string);
            record.finish_reason = str_field(choice, "finish_reason")
                .unwrap_or("unknown")
                .to_string();
            record.tool_calls = extract_tool_calls(message);
        }

        if let Some(usage) = response.get("usage") {
            record.usage = TokenUsage {
                input_tokens: u64_field(usage, "prompt_tokens"),
                output_tokens: u64_field(usage, "completion_tokens"),
                total_tokens: u64_field(usage, "total_tokens"),
                thinking_tokens: usage
                    .pointer("/completion_tokens_details/reasoning_tokens")
                    .and_then(Value::as_u64)
                    .filter(|t| *t > 0),
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

/// Flatten `content`, which may be a string, a list of parts, or null
fn content_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .map(|part| str_field(part, "text").unwrap_or_default())
            .collect::<Vec<_>>()
            .join(" "),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

/// Returns `(system_prompt, messages)`; system messages stay in the list
fn extract_messages(raw: Option<&Value>) -> (Option<String>, Vec<Message>) {
    let mut system_prompt = None;
    let mut messages = Vec::new();

    for msg in raw.and_then(Value::as_array).into_iter().flatten() {
        let role = str_field(msg, "role").unwrap_or("user");
        let text = content_text(msg.get("content"));
        if role == "system" {
            system_prompt = Some(text.clone());
        }
        messages.push(Message::new(role, text));
    }

    (system_prompt, messages)
}

fn extract_tool_calls(message: &Value) -> Option<Vec<ToolCall>> {
    let calls = message.get("tool_calls")?.as_array()?;
    if calls.is_empty() {
        return None;
    }

    Some(
        calls
            .iter()
            .map(|tc| ToolCall {
                id: str_field(tc, "id").unwrap_or_default().to_string(),
                name: tc
                    .pointer("/function/name")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                arguments: tc
                    .pointer("/function/arguments")
                    .cloned()
                    .unwrap_or(Value::Null),
            })
            .collect(),
    )
}
