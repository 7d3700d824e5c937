use std::path::{Path, PathBuf};

use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use crate::executor::{BoxFuture, Tool, ToolError, ToolParams, deserialize_params};

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ReadParams {
    /// File path, relative to the workspace or absolute inside it
    pub path: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct WriteParams {
    /// File path, relative to the workspace or absolute inside it
    pub path: String,
    /// Content to write; replaces the file
    pub content: String,
}

/// Paths a file tool may touch: anything under the workspace root.
#[derive(Debug, Clone)]
struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    fn new(workspace: &Path) -> Self {
        Self {
            root: workspace
                .canonicalize()
                .unwrap_or_else(|_| workspace.to_path_buf()),
        }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, ToolError> {
        let path = Path::new(path);
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let canonical = resolve_via_ancestors(&joined);
        if !canonical.starts_with(&self.root) {
            return Err(ToolError::SandboxViolation {
                path: canonical.display().to_string(),
            });
        }
        Ok(canonical)
    }
}

/// `read_file`: return the text content of a workspace file.
#[derive(Debug)]
pub struct ReadFileTool {
    sandbox: Sandbox,
}

impl ReadFileTool {
    #[must_use]
    pub fn new(workspace: &Path) -> Self {
        Self {
            sandbox: Sandbox::new(workspace),
        }
    }
}

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Read the contents of a file in the workspace."
    }

    fn parameters(&self) -> Value {
        crate::schema::params_schema::<ReadParams>()
    }

    fn execute<'a>(&'a self, params: ToolParams) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let params: ReadParams = deserialize_params(&params)?;
            let path = self.sandbox.resolve(&params.path)?;
            if !path.is_file() {
                return Err(ToolError::Execution(format!(
                    "File not found: {}",
                    params.path
                )));
            }
            Ok(tokio::fs::read_to_string(&path).await?)
        })
    }
}

/// `write_file`: create or replace a workspace file, creating parent directories.
#[derive(Debug)]
pub struct WriteFileTool {
    sandbox: Sandbox,
}

impl WriteFileTool {
    #[must_use]
    pub fn new(workspace: &Path) -> Self {
        Self {
            sandbox: Sandbox::new(workspace),
        }
    }
}

impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace, replacing it if it exists."
    }

    fn parameters(&self) -> Value {
        crate::schema::params_schema::<WriteParams>()
    }

    fn execute<'a>(&'a self, params: ToolParams) -> BoxFuture<'a, Result<String, ToolError>> {
        Box::pin(async move {
            let params: WriteParams = deserialize_params(&params)?;
            let path = self.sandbox.resolve(&params.path)?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&path, &params.content).await?;
            Ok(format!(
                "Wrote {} bytes to {}",
                params.content.len(),
                params.path
            ))
        })
    }
}

/// Canonicalize a path by walking up to the nearest existing ancestor.
fn resolve_via_ancestors(path: &Path) -> PathBuf {
    let mut existing = path;
    let mut suffix = PathBuf::new();
    while !existing.exists() {
        let (Some(parent), Some(name)) = (existing.parent(), existing.file_name()) else {
            break;
        };
        suffix = PathBuf::from(name).join(&suffix);
        existing = parent;
    }
    let base = existing
        .canonicalize()
        .unwrap_or_else(|_| existing.to_path_buf());
    if suffix.as_os_str().is_empty() {
        base
    } else {
        base.join(suffix)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn params(value: Value) -> ToolParams {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn write_then_read_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool::new(dir.path());
        let read = ReadFileTool::new(dir.path());

        let out = write
            .execute(params(json!({"path": "memory/MEMORY.md", "content": "remember"})))
            .await
            .unwrap();
        assert_eq!(out, "Wrote 8 bytes to memory/MEMORY.md");

        let content = read
            .execute(params(json!({"path": "memory/MEMORY.md"})))
            .await
            .unwrap();
        assert_eq!(content, "remember");
    }

    #[tokio::test]
    async fn read_absolute_path_inside_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("SOUL.md");
        std::fs::write(&file, "soul").unwrap();
        let read = ReadFileTool::new(dir.path());
        let content = read
            .execute(params(json!({"path": file.to_str().unwrap()})))
            .await
            .unwrap();
        assert_eq!(content, "soul");
    }

    #[tokio::test]
    async fn read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = ReadFileTool::new(dir.path())
            .execute(params(json!({"path": "nope.md"})))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "File not found: nope.md");
    }

    #[tokio::test]
    async fn paths_outside_workspace_rejected() {
        let workspace = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let target = outside.path().join("x.txt");

        let err = WriteFileTool::new(workspace.path())
            .execute(params(json!({"path": target.to_str().unwrap(), "content": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::SandboxViolation { .. }));
        assert!(!target.exists());
    }

    #[test]
    fn schemas() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool::new(dir.path());
        let schema = write.parameters();
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
        assert!(required.contains(&json!("path")));
        assert!(required.contains(&json!("content")));
        assert_eq!(ReadFileTool::new(dir.path()).name(), "read_file");
    }

    #[test]
    fn default_validation_catches_missing_content() {
        let dir = tempfile::tempdir().unwrap();
        let write = WriteFileTool::new(dir.path());
        assert_eq!(
            write.validate_params(&params(json!({"path": "a.md"}))),
            vec!["missing required content"]
        );
    }
}
