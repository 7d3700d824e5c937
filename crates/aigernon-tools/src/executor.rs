use std::future::Future;
use std::pin::Pin;

use serde_json::{Map, Value};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Named tool arguments as received from the model.
pub type ToolParams = Map<String, Value>;

/// Errors a tool may raise while executing. The display text is what the
/// registry reports back after `Error executing NAME: `.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("path not allowed outside workspace: {path}")]
    SandboxViolation { path: String },

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Execution(String),
}

/// Deserialize tool params into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned>(
    params: &ToolParams,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// A capability the agent can invoke by name.
///
/// The trait is object-safe so tools of different types can live in one
/// registry; `execute` returns a boxed future for the same reason.
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// JSON Schema of the accepted arguments, an object schema.
    fn parameters(&self) -> Value;

    /// Structural errors in `params`, empty if they are acceptable.
    ///
    /// Default: validate against [`parameters`](Self::parameters).
    fn validate_params(&self, params: &ToolParams) -> Vec<String> {
        crate::schema::validate(&self.parameters(), params)
    }

    fn execute<'a>(&'a self, params: ToolParams) -> BoxFuture<'a, Result<String, ToolError>>;

    /// OpenAI function-calling definition.
    fn definition(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name(),
                "description": self.description(),
                "parameters": self.parameters(),
            }
        })
    }
}
