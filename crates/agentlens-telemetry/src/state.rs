//! Per-session instrumentation settings
//!
//! An [`InstrumentationState`] is built once by `init` and shared read-only
//! through `Arc`. Each queued record carries the snapshot that was active when
//! it was captured, so a later `shutdown`/`init` never changes how an
//! already-captured call is delivered.

use regex::Regex;
use std::sync::Arc;

use crate::client::DeliveryClient;
use crate::redact::{PiiFilter, RedactionPipeline};

/// Settings for one active session
pub struct InstrumentationState {
    client: Arc<DeliveryClient>,
    agent_id: String,
    session_id: String,
    redaction: RedactionPipeline,
}

impl InstrumentationState {
    pub fn new(
        client: Arc<DeliveryClient>,
        agent_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self {
            client,
            agent_id: agent_id.into(),
            session_id: session_id.into(),
            redaction: RedactionPipeline::default(),
        }
    }

    /// Enable full blackout of text fields
    pub fn with_redact(mut self, redact: bool) -> Self {
        self.redaction = RedactionPipeline::new(
            redact,
            self.redaction.patterns().to_vec(),
            self.redaction.filter().cloned(),
        );
        self
    }

    /// Scrub matches of `patterns` from every emitted string
    pub fn with_pii_patterns(mut self, patterns: Vec<Regex>) -> Self {
        self.redaction = RedactionPipeline::new(
            self.redaction.is_blackout(),
            patterns,
            self.redaction.filter().cloned(),
        );
        self
    }

    /// Run `filter` over every emitted string after the patterns
    pub fn with_pii_filter(mut self, filter: PiiFilter) -> Self {
        self.redaction = RedactionPipeline::new(
            self.redaction.is_blackout(),
            self.redaction.patterns().to_vec(),
            Some(filter),
        );
        self
    }

    pub fn client(&self) -> &DeliveryClient {
        &self.client
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn redact(&self) -> bool {
        self.redaction.is_blackout()
    }

    pub fn redaction(&self) -> &RedactionPipeline {
        &self.redaction
    }
}

impl std::fmt::Debug for InstrumentationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstrumentationState")
            .field("agent_id", &self.agent_id)
            .field("session_id", &self.session_id)
            .field("redaction", &self.redaction)
            .finish_non_exhaustive()
    }
}
