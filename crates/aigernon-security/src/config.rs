use std::path::PathBuf;

use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

fn default_max_requests() -> usize {
    30
}

fn default_window_seconds() -> u64 {
    60
}

fn default_burst_limit() -> usize {
    5
}

fn default_burst_window_seconds() -> u64 {
    5
}

/// Sliding-window limits applied per sender at message ingress.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_requests")]
    pub max_requests: usize,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: u64,
    #[serde(default = "default_burst_limit")]
    pub burst_limit: usize,
    #[serde(default = "default_burst_window_seconds")]
    pub burst_window_seconds: u64,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_seconds: default_window_seconds(),
            burst_limit: default_burst_limit(),
            burst_window_seconds: default_burst_window_seconds(),
            enabled: true,
        }
    }
}

/// Audit trail settings. `dir` defaults to `~/.aigernon/audit`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

impl AuditConfig {
    #[must_use]
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir
            .clone()
            .unwrap_or_else(|| crate::home_subdir("audit"))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SanitizerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default)]
    pub strict: bool,
}

impl Default for SanitizerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strict: false,
        }
    }
}

/// File integrity monitoring. `state_dir` defaults to `~/.aigernon/security`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IntegrityConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub check_on_startup: bool,
    #[serde(default = "default_true")]
    pub auto_alert: bool,
    #[serde(default)]
    pub state_dir: Option<PathBuf>,
}

impl Default for IntegrityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_on_startup: true,
            auto_alert: true,
            state_dir: None,
        }
    }
}

impl IntegrityConfig {
    #[must_use]
    pub fn resolved_state_dir(&self) -> PathBuf {
        self.state_dir
            .clone()
            .unwrap_or_else(|| crate::home_subdir("security"))
    }
}
