//! Security primitives shared by the tool pipeline and channel ingress:
//! input sanitization, rate limiting, audit logging and file integrity.

pub mod audit;
pub mod config;
pub mod context;
pub mod integrity;
pub mod rate_limiter;
pub mod sanitizer;

use std::path::PathBuf;

pub use audit::{AuditEvent, AuditLogger, Severity, ToolCallOutcome, redact_params};
pub use config::{AuditConfig, IntegrityConfig, RateLimitConfig, SanitizerConfig};
pub use context::RequestContext;
pub use integrity::{IntegrityError, IntegrityMonitor, IntegrityStatus, Violation, ViolationKind};
pub use rate_limiter::{RateLimitStats, RateLimited, RateLimiter};
pub use sanitizer::{InputKind, InputSanitizer, SanitizationResult};

/// `~/.aigernon/<name>`, or `./.aigernon/<name>` when no home directory is known.
pub(crate) fn home_subdir(name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".aigernon")
        .join(name)
}
