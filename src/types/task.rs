use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentType, TaskId};

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum TaskPriority {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

/// Unit of work handed to an agent by an external scheduler.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    #[serde(default = "generate_task_id")]
    pub id: TaskId,
    pub task_type: String,
    /// Files the task intends to modify; these are write-locked for its duration.
    #[serde(default)]
    pub files: Vec<String>,
    /// Capabilities an agent needs to take the task.
    #[serde(default)]
    pub requirements: Vec<String>,
    #[serde(default)]
    pub priority: TaskPriority,
    #[serde(default)]
    pub preferred_type: Option<AgentType>,
    #[serde(default)]
    pub payload: Option<Value>,
}

fn generate_task_id() -> TaskId {
    format!("task-{}", uuid::Uuid::new_v4())
}

impl Task {
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            id: generate_task_id(),
            task_type: task_type.into(),
            files: Vec::new(),
            requirements: Vec::new(),
            priority: TaskPriority::default(),
            preferred_type: None,
            payload: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_files<I, S>(mut self, files: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.files = files.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_requirements<I, S>(mut self, requirements: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.requirements = requirements.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_preferred_type(mut self, agent_type: AgentType) -> Self {
        self.preferred_type = Some(agent_type);
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEdit {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskResult {
    pub task_id: TaskId,
    pub success: bool,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub files_modified: Vec<FileEdit>,
}

impl TaskResult {
    pub fn succeeded(task_id: impl Into<String>, output: Value, files_modified: Vec<FileEdit>) -> Self {
        Self {
            task_id: task_id.into(),
            success: true,
            output: Some(output),
            error: None,
            files_modified,
        }
    }

    pub fn failed(task_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            success: false,
            output: None,
            error: Some(error.into()),
            files_modified: Vec::new(),
        }
    }

    pub fn modified_paths(&self) -> Vec<&str> {
        self.files_modified.iter().map(|f| f.path.as_str()).collect()
    }
}
