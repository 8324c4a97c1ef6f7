//! Content redaction applied before events leave the process
//!
//! Two modes compose:
//!
//! - **Full blackout**: every human-readable text field (messages, system
//!   prompt, completion) becomes [`REDACTED`] and payloads carry
//!   `"redacted": true`.
//! - **Pattern / callback**: regexes and an optional text transform are
//!   applied to every string inside a JSON value, leaving structure intact.
//!
//! Blackout wins over patterns for the same field. Inputs are never mutated.

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::{Arc, LazyLock};

/// Replacement text for redacted content
pub const REDACTED: &str = "[REDACTED]";

/// Custom text transform applied after the patterns
pub type PiiFilter = Arc<dyn Fn(&str) -> String + Send + Sync>;

pub const PII_EMAIL: &str = r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}";
pub const PII_SSN: &str = r"\b\d{3}-\d{2}-\d{4}\b";
pub const PII_CREDIT_CARD: &str = r"\b\d{4}[\s-]?\d{4}[\s-]?\d{4}[\s-]?\d{4}\b";
pub const PII_PHONE: &str =
    r"\b(?:\+?1[-.\s]?)?(?:\(?\d{3}\)?[-.\s]?)?\d{3}[-.\s]?\d{4}\b";

static BUILTIN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [PII_EMAIL, PII_SSN, PII_CREDIT_CARD, PII_PHONE]
        .iter()
        .filter_map(|p| Regex::new(p).ok())
        .collect()
});

/// Compiled built-in PII patterns: email, SSN, credit card, phone
pub fn builtin_patterns() -> Vec<Regex> {
    BUILTIN.clone()
}

/// Redaction configuration for one session
#[derive(Clone, Default)]
pub struct RedactionPipeline {
    blackout: bool,
    patterns: Vec<Regex>,
    filter: Option<PiiFilter>,
}

impl fmt::Debug for RedactionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedactionPipeline")
            .field("blackout", &self.blackout)
            .field(
                "patterns",
                &self.patterns.iter().map(Regex::as_str).collect::<Vec<_>>(),
            )
            .field("filter", &self.filter.is_some())
            .finish()
    }
}

impl RedactionPipeline {
    pub fn new(blackout: bool, patterns: Vec<Regex>, filter: Option<PiiFilter>) -> Self {
        Self {
            blackout,
            patterns,
            filter,
        }
    }

    /// Pipeline that replaces every text field with the sentinel
    pub fn blackout() -> Self {
        Self::new(true, Vec::new(), None)
    }

    /// Pipeline that only applies `patterns`
    pub fn with_patterns(patterns: Vec<Regex>) -> Self {
        Self::new(false, patterns, None)
    }

    pub fn is_blackout(&self) -> bool {
        self.blackout
    }

    pub fn patterns(&self) -> &[Regex] {
        &self.patterns
    }

    pub fn filter(&self) -> Option<&PiiFilter> {
        self.filter.as_ref()
    }

    /// True if pattern/callback scrubbing has anything to do
    pub fn has_filters(&self) -> bool {
        !self.patterns.is_empty() || self.filter.is_some()
    }

    /// Apply patterns, then the custom filter, to one string
    pub fn scrub_text(&self, text: &str) -> String {
        let mut result = text.to_string();
        for pattern in &self.patterns {
            result = pattern.replace_all(&result, REDACTED).into_owned();
        }
        if let Some(filter) = &self.filter {
            result = filter(&result);
        }
        result
    }

    /// Recursively scrub every string in `value`, returning a new value
    pub fn scrub(&self, value: &Value) -> Value {
        match value {
            Value::String(s) => Value::String(self.scrub_text(s)),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.scrub(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.scrub(v)))
                    .collect::<Map<String, Value>>(),
            ),
            other => other.clone(),
        }
    }

    /// Redact a human-readable text field
    pub fn text_field(&self, text: &str) -> String {
        if self.blackout {
            REDACTED.to_string()
        } else if self.has_filters() {
            self.scrub_text(text)
        } else {
            text.to_string()
        }
    }

    /// Redact message content (string or list of parts)
    pub fn content_field(&self, content: &Value) -> Value {
        if self.blackout {
            Value::String(REDACTED.to_string())
        } else {
            self.structured_field(content)
        }
    }

    /// Scrub a structured field (tool calls, parameters). Blackout does not
    /// touch these; patterns do.
    pub fn structured_field(&self, value: &Value) -> Value {
        if self.has_filters() {
            self.scrub(value)
        } else {
            value.clone()
        }
    }
}
