//! Application bootstrap: config resolution and construction of the security stack.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use aigernon_security::{AuditLogger, InputSanitizer, IntegrityMonitor};
use aigernon_tools::{ExecTool, ReadFileTool, ToolRegistry, WriteFileTool};
use anyhow::Context;

use crate::config::Config;
use crate::ingress::IngressGate;

pub struct AppBuilder {
    config: Config,
    config_path: PathBuf,
}

impl AppBuilder {
    /// Resolve the config path from args and env, then load and validate it.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be read, parsed or validated.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::load(resolve_config_path())
    }

    /// # Errors
    ///
    /// Returns an error if the config cannot be read, parsed or validated.
    pub fn load(config_path: PathBuf) -> anyhow::Result<Self> {
        let config = Config::load(&config_path)?;
        config.validate()?;
        Ok(Self {
            config,
            config_path,
        })
    }

    #[must_use]
    pub fn from_config(config: Config, config_path: PathBuf) -> Self {
        Self {
            config,
            config_path,
        }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    #[must_use]
    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    #[must_use]
    pub fn workspace(&self) -> PathBuf {
        self.config.agent.resolved_workspace()
    }

    /// `None` when auditing is disabled.
    #[must_use]
    pub fn build_audit(&self) -> Option<Arc<AuditLogger>> {
        self.config
            .tools
            .audit
            .enabled
            .then(|| Arc::new(AuditLogger::from_config(&self.config.tools.audit)))
    }

    #[must_use]
    pub fn build_ingress(&self, audit: Option<Arc<AuditLogger>>) -> IngressGate {
        let gate = IngressGate::new(
            self.config.channels.allowlists(),
            self.config.security.rate_limit.clone(),
        );
        match audit {
            Some(logger) => gate.with_audit(logger),
            None => gate,
        }
    }

    /// Registry with `exec`, `read_file` and `write_file`, audited and
    /// sanitized as configured. The shell runs in the workspace unless a
    /// working directory is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if a configured guard pattern is not a valid regex.
    pub fn build_registry(&self, audit: Option<Arc<AuditLogger>>) -> anyhow::Result<ToolRegistry> {
        let workspace = self.workspace();

        let mut shell = self.config.tools.shell.clone();
        if shell.working_dir.is_none() {
            shell.working_dir = Some(workspace.clone());
        }
        let exec = ExecTool::new(&shell).context("invalid shell guard configuration")?;

        let mut registry = ToolRegistry::new();
        if let Some(logger) = audit {
            registry = registry.with_audit(logger);
        }
        if self.config.tools.sanitizer.enabled {
            registry =
                registry.with_sanitizer(InputSanitizer::from_config(&self.config.tools.sanitizer));
        }

        registry.register(exec);
        registry.register(ReadFileTool::new(&workspace));
        registry.register(WriteFileTool::new(&workspace));
        tracing::debug!("registered tools: {:?}", registry.tool_names());
        Ok(registry)
    }

    /// Monitor for the identity files and this config file. With `auto_alert`
    /// each violation is written to the audit trail.
    #[must_use]
    pub fn build_integrity(&self, audit: Option<Arc<AuditLogger>>) -> IntegrityMonitor {
        let integrity = &self.config.security.integrity;
        let monitor = IntegrityMonitor::new(
            &self.workspace(),
            Some(self.config_path.as_path()),
            integrity,
        );
        match audit {
            Some(logger) if integrity.auto_alert => {
                monitor.with_violation_handler(move |v| {
                    logger.log_integrity_alert(&v.file, &v.expected_hash, v.actual_or_marker());
                })
            }
            _ => monitor,
        }
    }

    /// Startup integrity pass: record baselines on first run, verify afterwards.
    ///
    /// Returns the number of violations found.
    pub fn check_integrity_on_startup(&self, monitor: &mut IntegrityMonitor) -> usize {
        let integrity = &self.config.security.integrity;
        if !integrity.enabled || !integrity.check_on_startup {
            return 0;
        }

        if monitor.status().tracked_files == 0 {
            match monitor.initialize() {
                Ok(hashes) => {
                    tracing::info!("integrity baselines recorded for {} file(s)", hashes.len());
                }
                Err(e) => tracing::error!("failed to initialize integrity baselines: {e}"),
            }
            return 0;
        }

        let violations = monitor.verify();
        for v in &violations {
            tracing::warn!("integrity violation: {} ({:?})", v.file, v.kind);
        }
        violations.len()
    }
}

pub fn resolve_config_path() -> PathBuf {
    let args: Vec<String> = std::env::args().collect();
    if let Some(path) = args.windows(2).find(|w| w[0] == "--config").map(|w| &w[1]) {
        return PathBuf::from(path);
    }
    if let Ok(path) = std::env::var("AIGERNON_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from("config/default.toml")
}
