//! # AgentLens Telemetry
//!
//! Capture-to-delivery leaves of the AgentLens SDK: everything that happens to
//! an LLM call after it has been captured.
//!
//! ## Pipeline
//!
//! ```text
//! CapturedCallRecord
//!   -> RedactionPipeline   (blackout or pattern scrubbing, on copies)
//!   -> EventSender         (inline, or queued to the agentlens-sender thread)
//!   -> DeliveryClient      (POST /api/events, classified retry)
//! ```
//!
//! ## Guarantees
//!
//! - **Fail-safe**: the instrumentation path never surfaces an error or panic
//!   to the host application
//! - **Non-blocking**: in async mode `send` only enqueues
//! - **FIFO**: records are delivered in the order they were sent
//! - **No mutation**: redaction never touches the captured record
//!
//! ## Configuration
//!
//! ```toml
//! # ~/.agentlens/config.toml, .agentlens/config.toml, .agentlens/config.local.toml
//! [agentlens]
//! server_url = "http://localhost:3400"
//! agent_id = "my-agent"
//! redact = false
//! ```
//!
//! ```bash
//! export AGENTLENS_API_KEY=...
//! export AGENTLENS_DISABLED=1   # or DO_NOT_TRACK=1
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod query;
pub mod record;
pub mod redact;
pub mod retry;
pub mod sender;
pub mod state;
pub mod transport;

pub use client::{DeliveryClient, HealthResult, LogLlmCallResult};
pub use config::{load_config, mask_key, resolve_api_key, resolve_url, AgentLensConfig};
pub use error::ApiError;
pub use events::{Event, EventBatch, EventType, Severity};
pub use query::{
    EventQuery, EventQueryResult, Session, SessionQuery, SessionQueryResult, StoredEvent,
    TimelineResult,
};
pub use record::{CapturedCallRecord, Message, TokenUsage, ToolCall};
pub use redact::{builtin_patterns, PiiFilter, RedactionPipeline, REDACTED};
pub use retry::{RetryDecision, RetryPolicy};
pub use sender::{EventSender, SenderState};
pub use state::InstrumentationState;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};

/// Re-export common types
pub type Result<T> = anyhow::Result<T>;
