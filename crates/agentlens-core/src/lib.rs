pub mod callsite;
pub mod interceptor;
pub mod pricing;
pub mod providers;
pub mod registry;
pub mod state;

pub use agentlens_telemetry as telemetry;
pub use callsite::{CallSite, CallSites, DispatchTable, Handler, ResolveError};
pub use interceptor::{Interceptor, LifecycleManager, PatchRecord, PatchTarget};
pub use registry::{ProviderFactory, ProviderRegistry};

use agentlens_telemetry::{
    load_config, mask_key, resolve_api_key, resolve_url, AgentLensConfig, CapturedCallRecord,
    DeliveryClient, EventSender, InstrumentationState, PiiFilter,
};
use anyhow::{Context, Result};
use regex::Regex;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// How long `shutdown` waits for queued events
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Which providers `init` instruments
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Integrations {
    /// Every registered provider whose call sites are available
    #[default]
    Auto,
    /// Only the named providers
    Only(Vec<String>),
    /// No automatic instrumentation
    Disabled,
}

/// Settings for [`init`]
#[derive(Clone)]
pub struct InitOptions {
    pub server_url: Option<String>,
    pub api_key: Option<String>,
    pub agent_id: String,
    /// Generated when not given
    pub session_id: Option<String>,
    pub cloud: bool,
    pub redact: bool,
    pub pii_patterns: Vec<Regex>,
    pub pii_filter: Option<PiiFilter>,
    pub sync_mode: bool,
    pub integrations: Integrations,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            server_url: None,
            api_key: None,
            agent_id: "default".to_string(),
            session_id: None,
            cloud: false,
            redact: false,
            pii_patterns: Vec::new(),
            pii_filter: None,
            sync_mode: false,
            integrations: Integrations::Auto,
        }
    }
}

impl From<&AgentLensConfig> for InitOptions {
    fn from(config: &AgentLensConfig) -> Self {
        Self {
            server_url: config.server_url.clone(),
            api_key: config.api_key.clone(),
            agent_id: config.agent_id.clone(),
            cloud: config.cloud,
            redact: config.redact,
            sync_mode: config.sync_mode,
            integrations: match &config.integrations {
                Some(names) => Integrations::Only(names.clone()),
                None => Integrations::Auto,
            },
            ..Self::default()
        }
    }
}

/// Start a session and instrument providers. Returns the session id.
///
/// If a session is already active it is left untouched and its id returned.
pub fn init(options: InitOptions) -> Result<String> {
    let _guard = state::lifecycle_lock();

    if let Some(existing) = state::active() {
        warn!("AgentLens: already initialized; call shutdown() before re-initializing");
        return Ok(existing.state.session_id().to_string());
    }

    let url = resolve_url(options.server_url.as_deref(), options.cloud);
    let api_key = resolve_api_key(options.api_key.as_deref());
    let client = DeliveryClient::new(&url, api_key)
        .with_context(|| format!("Failed to create AgentLens client for {}", url))?;

    let session_id = options
        .session_id
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let mut instrumentation =
        InstrumentationState::new(Arc::new(client), options.agent_id, session_id.clone())
            .with_redact(options.redact)
            .with_pii_patterns(options.pii_patterns);
    if let Some(filter) = options.pii_filter {
        instrumentation = instrumentation.with_pii_filter(filter);
    }

    let sender = EventSender::new(options.sync_mode).context("Failed to create event sender")?;
    sender.start();

    state::install(state::ActiveSession {
        state: Arc::new(instrumentation),
        sender,
    });

    let registry = ProviderRegistry::global();
    let activated = match &options.integrations {
        Integrations::Auto => registry.activate(None),
        Integrations::Only(names) => {
            let names: Vec<&str> = names.iter().map(String::as_str).collect();
            registry.activate(Some(&names))
        }
        Integrations::Disabled => Vec::new(),
    };

    info!(
        "AgentLens: session {} started against {} (providers: [{}])",
        session_id,
        url,
        activated.join(", ")
    );
    Ok(session_id)
}

/// Load configuration and [`init`] from it. Returns `None` when disabled.
pub fn init_from_config() -> Result<Option<String>> {
    let config = load_config().context("Failed to load AgentLens configuration")?;
    if !config.enabled {
        info!("AgentLens: disabled by configuration");
        return Ok(None);
    }
    init(InitOptions::from(&config)).map(Some)
}

/// Flush pending events, stop delivery, remove instrumentation and clear the
/// session. No-op when not initialized.
pub fn shutdown() {
    let _guard = state::lifecycle_lock();

    let Some(session) = state::active() else {
        return;
    };

    if !session.sender.flush(SHUTDOWN_FLUSH_TIMEOUT) {
        warn!(
            "AgentLens: events still pending after {:?}",
            SHUTDOWN_FLUSH_TIMEOUT
        );
    }
    session.sender.stop();
    ProviderRegistry::global().deactivate(None);
    state::take();

    info!("AgentLens: session {} shut down", session.state.session_id());
}

/// Id of the active session
pub fn current_session_id() -> Option<String> {
    state::active().map(|s| s.state.session_id().to_string())
}

fn client_from_config(config: &AgentLensConfig, server_url: Option<&str>) -> Result<DeliveryClient> {
    let url = match server_url {
        Some(url) => url.to_string(),
        None => config.resolved_url(),
    };
    DeliveryClient::new(&url, config.resolved_api_key())
        .with_context(|| format!("Failed to create AgentLens client for {}", url))
}

/// Check collector health
pub async fn cmd_health(server_url: Option<&str>) -> Result<()> {
    use owo_colors::OwoColorize;

    let config = load_config()?;
    let client = client_from_config(&config, server_url)?;
    let url = server_url.map(str::to_string).unwrap_or_else(|| config.resolved_url());

    let health = client
        .health()
        .await
        .with_context(|| format!("AgentLens server at {} is not reachable", url))?;

    println!(
        "{} {} {}",
        "✓".bright_green(),
        "AgentLens server".green().bold(),
        url.bright_white()
    );
    println!("   status:  {}", health.status);
    println!("   version: {}", health.version);
    Ok(())
}

/// Show the resolved configuration
pub fn cmd_config() -> Result<()> {
    use comfy_table::presets::UTF8_FULL;
    use comfy_table::{Cell, Color, Row, Table};
    use owo_colors::OwoColorize;

    let config = load_config()?;

    println!();
    println!("{} {}", "▸".bright_cyan(), "AgentLens Configuration".bright_cyan().bold());
    println!();

    let api_key = match config.resolved_api_key() {
        Some(key) => mask_key(&key),
        None => "not set".to_string(),
    };
    let integrations = match &config.integrations {
        Some(names) if names.is_empty() => "none".to_string(),
        Some(names) => names.join(", "),
        None => "all".to_string(),
    };

    let rows = [
        ("Enabled", config.enabled.to_string()),
        ("Server URL", config.resolved_url()),
        ("API key", api_key),
        ("Agent ID", config.agent_id.clone()),
        ("Redact", config.redact.to_string()),
        ("Sync mode", config.sync_mode.to_string()),
        ("Integrations", integrations),
    ];

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    for (name, value) in rows {
        table.add_row(Row::from(vec![
            Cell::new(name).fg(Color::Cyan),
            Cell::new(value).fg(Color::White),
        ]));
    }

    println!("{}", table);
    println!();
    Ok(())
}

/// Deliver a recorded LLM call from a JSON file
pub async fn cmd_log_call(
    file: &Path,
    session_id: Option<String>,
    agent_id: Option<String>,
    redact: bool,
) -> Result<()> {
    use owo_colors::OwoColorize;

    let content = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let record: CapturedCallRecord = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse LLM call record: {}", file.display()))?;

    let config = load_config()?;
    let client = client_from_config(&config, None)?;
    let session_id = session_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let agent_id = agent_id.unwrap_or_else(|| config.agent_id.clone());

    let result = client
        .log_llm_call(&session_id, &agent_id, &record, redact || config.redact)
        .await
        .context("Failed to log LLM call")?;

    println!(
        "{} {} {}",
        "✓".bright_green(),
        "Logged call".green().bold(),
        result.call_id.bright_white()
    );
    println!("   session: {}", session_id);
    println!("   model:   {}/{}", record.provider, record.model);
    Ok(())
}
