use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError};

use aigernon_security::{AuditLogger, InputSanitizer, RequestContext, ToolCallOutcome};
use futures::FutureExt;
use serde_json::Value;

use crate::executor::{Tool, ToolError, ToolParams};

/// Identity of the caller a dispatch is made for.
pub type ToolContext = RequestContext;

/// Why a dispatch did not produce a tool result.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Tool '{0}' not found")]
    NotFound(String),

    #[error("Input blocked by security filter: {0}")]
    InputBlocked(String),

    #[error("Invalid parameters for tool '{tool}': {}", errors.join("; "))]
    InvalidParams { tool: String, errors: Vec<String> },

    #[error("Error executing {tool}: {source}")]
    Execution { tool: String, source: ToolError },
}

impl DispatchError {
    /// Text returned to the model.
    #[must_use]
    pub fn render(&self) -> String {
        match self {
            Self::Execution { .. } => self.to_string(),
            _ => format!("Error: {self}"),
        }
    }

    /// Error recorded in the audit trail.
    #[must_use]
    pub fn audit_message(&self) -> String {
        match self {
            Self::NotFound(_) => "Tool not found".to_owned(),
            Self::InputBlocked(reason) => format!("Input blocked: {reason}"),
            Self::InvalidParams { errors, .. } => format!("Validation: {}", errors.join("; ")),
            Self::Execution { source, .. } => source.to_string(),
        }
    }
}

/// Named tools plus the security pipeline every call goes through:
/// lookup, sanitization, validation, execution and audit.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
    audit: Option<Arc<AuditLogger>>,
    sanitizer: Option<InputSanitizer>,
    context: Mutex<ToolContext>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_names())
            .field("audit", &self.audit.is_some())
            .field("sanitizer", &self.sanitizer)
            .finish_non_exhaustive()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_audit(mut self, logger: Arc<AuditLogger>) -> Self {
        self.audit = Some(logger);
        self
    }

    #[must_use]
    pub fn with_sanitizer(mut self, sanitizer: InputSanitizer) -> Self {
        self.sanitizer = Some(sanitizer);
        self
    }

    /// Register a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_boxed(Box::new(tool));
    }

    pub fn register_boxed(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_owned();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::debug!("replaced tool {name}");
        }
    }

    /// Remove a tool; unknown names are ignored.
    pub fn unregister(&mut self, name: &str) {
        self.tools.remove(name);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(AsRef::as_ref)
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    #[must_use]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// OpenAI function-calling definitions of every registered tool.
    #[must_use]
    pub fn definitions(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.definition()).collect()
    }

    /// Update the shared audit context. Empty or missing values keep the
    /// current field.
    pub fn set_context(
        &self,
        user_id: Option<&str>,
        channel: Option<&str>,
        session_key: Option<&str>,
    ) {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .merge(user_id, channel, session_key);
    }

    #[must_use]
    pub fn context(&self) -> ToolContext {
        self.context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Dispatch with the shared context as it is when the call starts.
    pub async fn execute(&self, name: &str, params: ToolParams) -> String {
        let ctx = self.context();
        self.execute_in(&ctx, name, params).await
    }

    /// Dispatch on behalf of `ctx`. Never fails: errors are rendered as text.
    pub async fn execute_in(&self, ctx: &ToolContext, name: &str, params: ToolParams) -> String {
        match self.try_execute_in(ctx, name, params).await {
            Ok(result) => result,
            Err(e) => e.render(),
        }
    }

    /// Dispatch on behalf of `ctx`, keeping the failure typed.
    ///
    /// Every outcome, success or not, is recorded in the audit trail.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError` for an unknown tool, blocked input, invalid
    /// parameters or a failed execution.
    pub async fn try_execute_in(
        &self,
        ctx: &ToolContext,
        name: &str,
        params: ToolParams,
    ) -> Result<String, DispatchError> {
        let Some(tool) = self.tools.get(name) else {
            return Err(self.fail(ctx, name, &params, DispatchError::NotFound(name.to_owned())));
        };

        let params = match &self.sanitizer {
            Some(sanitizer) => {
                let result = sanitizer.sanitize_tool_params(name, &params);
                if !result.safe {
                    let reason = result.blocked_reason.unwrap_or_default();
                    tracing::warn!(tool = name, "input blocked: {reason}");
                    return Err(self.fail(ctx, name, &params, DispatchError::InputBlocked(reason)));
                }
                if !result.warnings.is_empty() {
                    tracing::debug!(tool = name, warnings = ?result.warnings, "input passed with warnings");
                }
                result.sanitized_value
            }
            None => params,
        };

        let errors = tool.validate_params(&params);
        if !errors.is_empty() {
            let err = DispatchError::InvalidParams {
                tool: name.to_owned(),
                errors,
            };
            return Err(self.fail(ctx, name, &params, err));
        }

        tracing::debug!(tool = name, "executing tool");
        let outcome = AssertUnwindSafe(tool.execute(params.clone()))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ToolError::Execution(panic_message(panic.as_ref()))));
        match outcome {
            Ok(result) => {
                if let Some(audit) = &self.audit {
                    audit.log_tool_call(name, &params, ctx, ToolCallOutcome::success(&result));
                }
                Ok(result)
            }
            Err(source) => {
                tracing::warn!(tool = name, "tool failed: {source}");
                let err = DispatchError::Execution {
                    tool: name.to_owned(),
                    source,
                };
                Err(self.fail(ctx, name, &params, err))
            }
        }
    }

    fn fail(
        &self,
        ctx: &ToolContext,
        name: &str,
        params: &ToolParams,
        err: DispatchError,
    ) -> DispatchError {
        if let Some(audit) = &self.audit {
            let message = err.audit_message();
            audit.log_tool_call(name, params, ctx, ToolCallOutcome::failure(&message));
        }
        err
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned());
    format!("tool panicked: {detail}")
}
