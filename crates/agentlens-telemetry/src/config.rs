//! AgentLens configuration loading and resolution

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Local collector URL used when nothing else is configured
pub const DEFAULT_SERVER_URL: &str = "http://localhost:3400";

/// Hosted collector URL selected by `cloud = true`
pub const CLOUD_SERVER_URL: &str = "https://api.agentlens.ai";

pub const ENV_SERVER_URL: &str = "AGENTLENS_SERVER_URL";
pub const ENV_API_KEY: &str = "AGENTLENS_API_KEY";
pub const ENV_AGENT_ID: &str = "AGENTLENS_AGENT_ID";
pub const ENV_REDACT: &str = "AGENTLENS_REDACT";
pub const ENV_DISABLED: &str = "AGENTLENS_DISABLED";

/// SDK configuration
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AgentLensConfig {
    /// Whether instrumentation is enabled (default: true)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Collector URL; see [`resolve_url`]
    pub server_url: Option<String>,

    /// Collector API key; see [`resolve_api_key`]
    pub api_key: Option<String>,

    #[serde(default = "default_agent_id")]
    pub agent_id: String,

    /// Send to the hosted collector
    #[serde(default)]
    pub cloud: bool,

    /// Replace all message content with `[REDACTED]`
    #[serde(default)]
    pub redact: bool,

    /// Deliver on the calling thread instead of a background worker
    #[serde(default)]
    pub sync_mode: bool,

    /// Providers to instrument (None = all registered)
    pub integrations: Option<Vec<String>>,
}

impl Default for AgentLensConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            server_url: None,
            api_key: None,
            agent_id: default_agent_id(),
            cloud: false,
            redact: false,
            sync_mode: false,
            integrations: None,
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_agent_id() -> String {
    "default".to_string()
}

impl AgentLensConfig {
    /// Collector URL after applying precedence rules
    pub fn resolved_url(&self) -> String {
        resolve_url(self.server_url.as_deref(), self.cloud)
    }

    /// API key after applying precedence rules
    pub fn resolved_api_key(&self) -> Option<String> {
        resolve_api_key(self.api_key.as_deref())
    }
}

/// Load configuration with precedence:
/// 1. Environment variables (highest priority)
/// 2. Local config (.agentlens/config.local.toml)
/// 3. Project config (.agentlens/config.toml)
/// 4. User config (~/.agentlens/config.toml)
/// 5. Defaults
pub fn load_config() -> Result<AgentLensConfig> {
    load_config_from(dirs::home_dir().as_deref(), Path::new("."))
}

/// Same as [`load_config`] with explicit home and project directories
pub fn load_config_from(home_dir: Option<&Path>, project_dir: &Path) -> Result<AgentLensConfig> {
    let mut config = AgentLensConfig::default();

    // Load from user config
    if let Some(home_dir) = home_dir {
        let user_config = home_dir.join(".agentlens/config.toml");
        if user_config.exists() {
            match load_config_from_file(&user_config) {
                Ok(cfg) => merge_config(&mut config, cfg),
                Err(e) => warn!("AgentLens: ignoring user config: {:#}", e),
            }
        }
    }

    // Load from project config, then local config
    for name in ["config.toml", "config.local.toml"] {
        let path = project_dir.join(".agentlens").join(name);
        if path.exists() {
            match load_config_from_file(&path) {
                Ok(cfg) => merge_config(&mut config, cfg),
                Err(e) => warn!("AgentLens: ignoring {}: {:#}", path.display(), e),
            }
        }
    }

    apply_env_overrides(&mut config);

    Ok(config)
}

/// Keys present in one config file; absent keys leave lower layers alone
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
struct PartialConfig {
    enabled: Option<bool>,
    server_url: Option<String>,
    api_key: Option<String>,
    agent_id: Option<String>,
    cloud: Option<bool>,
    redact: Option<bool>,
    sync_mode: Option<bool>,
    integrations: Option<Vec<String>>,
}

/// Load the `[agentlens]` table from a TOML file
fn load_config_from_file(path: &Path) -> Result<PartialConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;

    #[derive(Deserialize)]
    struct FullConfig {
        #[serde(default)]
        agentlens: Option<PartialConfig>,
    }

    let full_config: FullConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;

    Ok(full_config.agentlens.unwrap_or_default())
}

/// Apply every key set in a higher-precedence file onto `base`
fn merge_config(base: &mut AgentLensConfig, new: PartialConfig) {
    if let Some(enabled) = new.enabled {
        base.enabled = enabled;
    }
    if let Some(cloud) = new.cloud {
        base.cloud = cloud;
    }
    if let Some(redact) = new.redact {
        base.redact = redact;
    }
    if let Some(sync_mode) = new.sync_mode {
        base.sync_mode = sync_mode;
    }
    if let Some(agent_id) = new.agent_id {
        base.agent_id = agent_id;
    }
    if new.server_url.is_some() {
        base.server_url = new.server_url;
    }
    if new.api_key.is_some() {
        base.api_key = new.api_key;
    }
    if new.integrations.is_some() {
        base.integrations = new.integrations;
    }
}

/// Apply environment variable overrides
fn apply_env_overrides(config: &mut AgentLensConfig) {
    if env_flag(ENV_DISABLED) || env::var("DO_NOT_TRACK").is_ok() {
        config.enabled = false;
    }

    if let Some(agent_id) = env_value(ENV_AGENT_ID) {
        config.agent_id = agent_id;
    }

    if env_flag(ENV_REDACT) {
        config.redact = true;
    }
}

fn env_value(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// `1`, `true`, `yes` (any case) count as set
fn env_flag(name: &str) -> bool {
    env_value(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Resolve the collector URL: explicit > cloud > `AGENTLENS_SERVER_URL` > localhost
pub fn resolve_url(explicit: Option<&str>, cloud: bool) -> String {
    if let Some(url) = explicit.filter(|u| !u.is_empty()) {
        return url.to_string();
    }
    if cloud {
        return CLOUD_SERVER_URL.to_string();
    }
    env_value(ENV_SERVER_URL).unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
}

/// Resolve the API key: explicit > `AGENTLENS_API_KEY`
pub fn resolve_api_key(explicit: Option<&str>) -> Option<String> {
    explicit
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .or_else(|| env_value(ENV_API_KEY))
}

/// Mask a key for display, keeping the last four characters
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
