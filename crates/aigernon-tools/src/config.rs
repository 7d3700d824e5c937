use std::path::PathBuf;

use aigernon_security::{AuditConfig, SanitizerConfig};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    60
}

/// Top-level configuration for tool execution.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ToolsConfig {
    #[serde(default)]
    pub shell: ShellConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub sanitizer: SanitizerConfig,
}

/// Shell tool configuration: timeout, guard lists and workspace restriction.
///
/// `allow_prefixes` replaces the built-in prefix list when set.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShellConfig {
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    #[serde(default)]
    pub deny_patterns: Vec<String>,
    #[serde(default)]
    pub allow_patterns: Vec<String>,
    #[serde(default)]
    pub allow_prefixes: Option<Vec<String>>,
    #[serde(default)]
    pub restrict_to_workspace: bool,
    #[serde(default = "default_true")]
    pub use_allowlist: bool,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
            working_dir: None,
            deny_patterns: Vec::new(),
            allow_patterns: Vec::new(),
            allow_prefixes: None,
            restrict_to_workspace: false,
            use_allowlist: true,
        }
    }
}
