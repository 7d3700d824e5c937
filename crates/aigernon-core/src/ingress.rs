//! Admission checks for inbound messages: sender allowlist, then rate limit.

use std::collections::BTreeMap;
use std::sync::Arc;

use aigernon_security::{AuditLogger, RateLimitConfig, RateLimited, RateLimiter};

#[derive(Debug, thiserror::Error)]
pub enum IngressRejection {
    #[error("sender {sender} is not allowed on channel {channel}")]
    NotAllowed { channel: String, sender: String },
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
}

impl IngressRejection {
    /// Text the channel may send back to the sender, if any.
    ///
    /// Allowlist denials are silent.
    #[must_use]
    pub fn reply(&self) -> Option<String> {
        match self {
            Self::NotAllowed { .. } => None,
            Self::RateLimited(limited) => Some(limited.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct IngressGate {
    allowlists: BTreeMap<String, Vec<String>>,
    limiter: RateLimiter,
    audit: Option<Arc<AuditLogger>>,
}

impl IngressGate {
    #[must_use]
    pub fn new(allowlists: BTreeMap<String, Vec<String>>, rate_limit: RateLimitConfig) -> Self {
        Self {
            allowlists,
            limiter: RateLimiter::new(rate_limit),
            audit: None,
        }
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    #[must_use]
    pub fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Whether `sender` may talk on `channel`.
    ///
    /// Composite ids such as `123456|alice` match when any non-empty part is listed.
    #[must_use]
    pub fn is_allowed(&self, channel: &str, sender: &str) -> bool {
        let Some(allow) = self.allowlists.get(channel) else {
            return true;
        };
        if allow.is_empty() || allow.iter().any(|a| a == sender) {
            return true;
        }
        sender.contains('|')
            && sender
                .split('|')
                .filter(|part| !part.is_empty())
                .any(|part| allow.iter().any(|a| a == part))
    }

    /// Admit a message or say why not. Every rejection is audited.
    ///
    /// # Errors
    ///
    /// Returns `NotAllowed` for senders missing from the channel allowlist and
    /// `RateLimited` when the sender exceeded the burst or window limit.
    pub fn admit(&self, channel: &str, sender: &str) -> Result<(), IngressRejection> {
        if !self.is_allowed(channel, sender) {
            tracing::warn!(channel, sender, "access denied: sender not in allowlist");
            if let Some(audit) = &self.audit {
                audit.log_access_denied(sender, channel, "not_in_allowlist");
            }
            return Err(IngressRejection::NotAllowed {
                channel: channel.to_owned(),
                sender: sender.to_owned(),
            });
        }

        if let Err(limited) = self.limiter.check(sender) {
            tracing::warn!(channel, sender, limit = limited.limit_type(), "rate limited");
            if let Some(audit) = &self.audit {
                audit.log_rate_limited(sender, channel, "message_rate");
            }
            return Err(limited.into());
        }

        Ok(())
    }
}
