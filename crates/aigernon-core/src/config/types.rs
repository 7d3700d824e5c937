use std::collections::BTreeMap;
use std::path::PathBuf;

use aigernon_security::{IntegrityConfig, RateLimitConfig};
use aigernon_tools::ToolsConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
    #[serde(default)]
    pub security: SecurityConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

pub(crate) fn default_agent_name() -> String {
    "Aigernon".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AgentConfig {
    #[serde(default = "default_agent_name")]
    pub name: String,
    /// Directory holding identity files and memory; `~/.aigernon/workspace` when unset.
    #[serde(default)]
    pub workspace: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            name: default_agent_name(),
            workspace: None,
        }
    }
}

impl AgentConfig {
    #[must_use]
    pub fn resolved_workspace(&self) -> PathBuf {
        self.workspace.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".aigernon")
                .join("workspace")
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SecurityConfig {
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub integrity: IntegrityConfig,
}

/// Per-channel access lists, keyed by channel name:
///
/// ```toml
/// [channels.telegram]
/// allow_from = ["123456|alice"]
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelsConfig {
    #[serde(flatten)]
    pub entries: BTreeMap<String, ChannelAccess>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ChannelAccess {
    /// Allowed sender ids; empty admits everyone.
    #[serde(default)]
    pub allow_from: Vec<String>,
}

impl ChannelsConfig {
    /// Allowlists by channel, as the ingress gate consumes them.
    #[must_use]
    pub fn allowlists(&self) -> BTreeMap<String, Vec<String>> {
        self.entries
            .iter()
            .map(|(name, access)| (name.clone(), access.allow_from.clone()))
            .collect()
    }
}
