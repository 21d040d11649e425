pub mod file_edit;

pub use file_edit::FileEditHandler;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;

use crate::types::{AgentId, FileEdit, Task};

/// What a handler sees of the world when it runs a task.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    pub agent_id: AgentId,
    /// Content of the task's declared files when the task was dispatched;
    /// `None` for files that did not exist yet.
    pub files: HashMap<String, Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct HandlerOutput {
    pub output: Value,
    pub edits: Vec<FileEdit>,
}

/// The business logic behind an agent. Implementations are opaque to the
/// coordinator, which only looks at the edits they return.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn handle(&self, task: &Task, context: &TaskContext) -> Result<HandlerOutput>;
}
