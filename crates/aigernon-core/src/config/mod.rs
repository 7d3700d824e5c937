mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::Path;

use anyhow::{Context, bail};

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str::<Self>(&content).context("failed to parse config file")?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Reject settings that would disable a limit by setting it to zero.
    ///
    /// # Errors
    ///
    /// Returns an error naming the first invalid setting.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.tools.shell.timeout == 0 {
            bail!("tools.shell.timeout must be greater than zero");
        }
        let rl = &self.security.rate_limit;
        if rl.max_requests == 0 {
            bail!("security.rate_limit.max_requests must be greater than zero");
        }
        if rl.window_seconds == 0 {
            bail!("security.rate_limit.window_seconds must be greater than zero");
        }
        if rl.burst_limit == 0 {
            bail!("security.rate_limit.burst_limit must be greater than zero");
        }
        if rl.burst_window_seconds == 0 {
            bail!("security.rate_limit.burst_window_seconds must be greater than zero");
        }
        Ok(())
    }
}
