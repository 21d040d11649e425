use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};

use super::{HandlerOutput, TaskContext, TaskHandler};
use crate::types::{FileEdit, Task};

/// Applies the edits carried in a task payload:
///
/// ```yaml
/// payload:
///   edits:
///     - path: /src/foo.ts
///       content: "const x = 1;"
///     - path: /CHANGELOG.md
///       append: "- bump x\n"
/// ```
pub struct FileEditHandler;

impl FileEditHandler {
    pub fn new() -> Self {
        Self
    }

    fn parse_edit(edit: &Value, context: &TaskContext) -> Result<FileEdit> {
        let path = edit["path"]
            .as_str()
            .ok_or_else(|| anyhow!("Edit is missing a path"))?;

        let content = if let Some(content) = edit["content"].as_str() {
            content.to_string()
        } else if let Some(append) = edit["append"].as_str() {
            let existing = context
                .files
                .get(path)
                .cloned()
                .flatten()
                .unwrap_or_default();
            format!("{}{}", existing, append)
        } else {
            return Err(anyhow!("Edit for {} has neither content nor append", path));
        };

        Ok(FileEdit {
            path: path.to_string(),
            content,
        })
    }
}

impl Default for FileEditHandler {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TaskHandler for FileEditHandler {
    fn name(&self) -> &str {
        "file_edit"
    }

    async fn handle(&self, task: &Task, context: &TaskContext) -> Result<HandlerOutput> {
        let edits = match task.payload.as_ref().map(|p| &p["edits"]) {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| Self::parse_edit(item, context))
                .collect::<Result<Vec<_>>>()?,
            Some(Value::Null) | None => Vec::new(),
            Some(_) => return Err(anyhow!("Task payload edits must be a list")),
        };

        Ok(HandlerOutput {
            output: json!({
                "task_type": task.task_type,
                "edited": edits.iter().map(|e| e.path.clone()).collect::<Vec<_>>(),
            }),
            edits,
        })
    }
}
