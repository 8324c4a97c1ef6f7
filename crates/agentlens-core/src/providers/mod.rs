//! Built-in provider extractors
//!
//! Each provider is an [`Interceptor`](crate::interceptor::Interceptor) that
//! reads its vendor's JSON request/response shapes. Hosts register the
//! matching call sites (see each provider's `MODULE`) before `init`.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicInterceptor;
pub use openai::OpenAiInterceptor;

use serde_json::{Map, Value};

fn str_field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

fn u64_field(value: &Value, key: &str) -> u64 {
    value.get(key).and_then(Value::as_u64).unwrap_or(0)
}

/// Copy the listed generation parameters that are present and non-null
fn pick_params(args: &Value, keys: &[&str]) -> Option<Value> {
    let params: Map<String, Value> = keys
        .iter()
        .filter_map(|key| match args.get(*key) {
            Some(Value::Null) | None => None,
            Some(v) => Some((key.to_string(), v.clone())),
        })
        .collect();

    if params.is_empty() {
        None
    } else {
        Some(Value::Object(params))
    }
}

/// Model id from the response, falling back to the request
fn model_name(response: &Value, args: &Value) -> String {
    str_field(response, "model")
        .filter(|m| !m.is_empty())
        .or_else(|| str_field(args, "model"))
        .unwrap_or("unknown")
        .to_string()
}
