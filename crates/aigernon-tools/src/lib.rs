//! Tool abstraction, the guarded shell tool, workspace file tools and the
//! registry that runs every call through sanitization, validation and audit.

pub mod config;
pub mod executor;
pub mod file;
pub mod guard;
pub mod registry;
pub mod schema;
pub mod shell;

pub use config::{ShellConfig, ToolsConfig};
pub use executor::{BoxFuture, Tool, ToolError, ToolParams, deserialize_params};
pub use file::{ReadFileTool, WriteFileTool};
pub use guard::{CommandGuard, GuardConfigError, GuardRejection};
pub use registry::{DispatchError, ToolContext, ToolRegistry};
pub use shell::ExecTool;
