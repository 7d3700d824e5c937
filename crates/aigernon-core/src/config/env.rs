use std::path::PathBuf;

use super::Config;

fn parse_list(v: &str) -> Vec<String> {
    v.split(',')
        .map(|s| s.trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    pub(crate) fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_tools();
        self.apply_env_overrides_security();
        if let Ok(v) = std::env::var("AIGERNON_WORKSPACE") {
            self.agent.workspace = Some(PathBuf::from(v));
        }
    }

    fn apply_env_overrides_tools(&mut self) {
        if let Ok(v) = std::env::var("AIGERNON_TOOLS_TIMEOUT")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.tools.shell.timeout = secs;
        }
        if let Ok(v) = std::env::var("AIGERNON_TOOLS_WORKING_DIR") {
            self.tools.shell.working_dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("AIGERNON_TOOLS_RESTRICT_TO_WORKSPACE")
            && let Ok(restrict) = v.parse::<bool>()
        {
            self.tools.shell.restrict_to_workspace = restrict;
        }
        if let Ok(v) = std::env::var("AIGERNON_TOOLS_USE_ALLOWLIST")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.tools.shell.use_allowlist = enabled;
        }
        if let Ok(v) = std::env::var("AIGERNON_TOOLS_ALLOW_PREFIXES") {
            self.tools.shell.allow_prefixes = Some(parse_list(&v));
        }
    }

    fn apply_env_overrides_security(&mut self) {
        if let Ok(v) = std::env::var("AIGERNON_AUDIT_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.tools.audit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("AIGERNON_AUDIT_DIR") {
            self.tools.audit.dir = Some(PathBuf::from(v));
        }
        if let Ok(v) = std::env::var("AIGERNON_SANITIZER_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.tools.sanitizer.enabled = enabled;
        }
        if let Ok(v) = std::env::var("AIGERNON_SANITIZER_STRICT")
            && let Ok(strict) = v.parse::<bool>()
        {
            self.tools.sanitizer.strict = strict;
        }
        if let Ok(v) = std::env::var("AIGERNON_RATE_LIMIT_ENABLED")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.security.rate_limit.enabled = enabled;
        }
        if let Ok(v) = std::env::var("AIGERNON_RATE_LIMIT_MAX_REQUESTS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.security.rate_limit.max_requests = n;
        }
        if let Ok(v) = std::env::var("AIGERNON_RATE_LIMIT_WINDOW_SECONDS")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.security.rate_limit.window_seconds = secs;
        }
    }
}
