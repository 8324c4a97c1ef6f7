//! Model pricing lookup
//!
//! Prices are USD per 1M tokens as `(input, output)`. Dated model names
//! (`gpt-4o-2024-08-06`) match their base entry by longest prefix.

use tracing::debug;

const OPENAI: &[(&str, f64, f64)] = &[
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("gpt-4-turbo", 10.0, 30.0),
    ("gpt-4", 30.0, 60.0),
    ("gpt-3.5-turbo", 0.5, 1.5),
    ("o1-mini", 3.0, 12.0),
    ("o1", 15.0, 60.0),
    ("o3-mini", 1.1, 4.4),
];

const ANTHROPIC: &[(&str, f64, f64)] = &[
    ("claude-3-5-sonnet", 3.0, 15.0),
    ("claude-3-5-haiku", 0.8, 4.0),
    ("claude-3-opus", 15.0, 75.0),
    ("claude-3-sonnet", 3.0, 15.0),
    ("claude-3-haiku", 0.25, 1.25),
    ("claude-sonnet-4", 3.0, 15.0),
    ("claude-opus-4", 15.0, 75.0),
];

const MISTRAL: &[(&str, f64, f64)] = &[
    ("mistral-tiny", 0.25, 0.25),
    ("mistral-small", 1.0, 3.0),
    ("mistral-medium", 2.7, 8.1),
    ("mistral-large", 4.0, 12.0),
    ("open-mistral-7b", 0.25, 0.25),
    ("open-mixtral-8x7b", 0.7, 0.7),
    ("open-mixtral-8x22b", 2.0, 6.0),
    ("codestral", 1.0, 3.0),
];

const COHERE: &[(&str, f64, f64)] = &[
    ("command-r-plus", 3.0, 15.0),
    ("command-r", 0.5, 1.5),
    ("command-light", 0.3, 0.6),
    ("command", 1.0, 2.0),
];

fn table(provider: &str) -> Option<&'static [(&'static str, f64, f64)]> {
    match provider {
        "openai" => Some(OPENAI),
        "anthropic" => Some(ANTHROPIC),
        "mistral" => Some(MISTRAL),
        "cohere" => Some(COHERE),
        _ => None,
    }
}

/// Cost in USD, or `None` for an unknown provider or model.
/// Local providers (`ollama`) are free.
pub fn get_cost(provider: &str, model: &str, input_tokens: u64, output_tokens: u64) -> Option<f64> {
    if provider == "ollama" {
        return Some(0.0);
    }

    let Some(prices) = table(provider) else {
        debug!("AgentLens pricing: unknown provider '{}'", provider);
        return None;
    };

    let best = prices
        .iter()
        .filter(|(name, _, _)| model.starts_with(name))
        .max_by_key(|(name, _, _)| name.len());

    match best {
        Some((_, input, output)) => {
            Some((input_tokens as f64 * input + output_tokens as f64 * output) / 1_000_000.0)
        }
        None => {
            debug!(
                "AgentLens pricing: unknown model '{}' for provider '{}'",
                model, provider
            );
            None
        }
    }
}
