pub mod worker;

pub use worker::{WorkerAgent, WorkerOptions};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::capabilities::TaskContext;
use crate::types::{AgentId, AgentMetadata, AgentStatus, Task, TaskId, TaskResult};

/// Notifications an agent publishes about itself. The registry listens to
/// these to keep its metadata snapshot fresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AgentEvent {
    StatusChanged {
        agent_id: AgentId,
        status: AgentStatus,
    },
    TaskStarted {
        agent_id: AgentId,
        task_id: TaskId,
    },
    TaskCompleted {
        agent_id: AgentId,
        task_id: TaskId,
        success: bool,
    },
    Failed {
        agent_id: AgentId,
        message: String,
    },
}

impl AgentEvent {
    pub fn agent_id(&self) -> &str {
        match self {
            AgentEvent::StatusChanged { agent_id, .. }
            | AgentEvent::TaskStarted { agent_id, .. }
            | AgentEvent::TaskCompleted { agent_id, .. }
            | AgentEvent::Failed { agent_id, .. } => agent_id,
        }
    }
}

/// A live, independently scheduled worker.
///
/// Accessors are synchronous and cheap so the registry can read them while
/// holding its lock; hooks that may block on the outside world are async.
#[async_trait]
pub trait Agent: Send + Sync {
    fn id(&self) -> &str;

    /// Current metadata derived from the instance's own state.
    fn metadata(&self) -> AgentMetadata;

    fn status(&self) -> AgentStatus {
        self.metadata().status
    }

    fn is_healthy(&self) -> bool {
        !matches!(self.status(), AgentStatus::Error | AgentStatus::Offline)
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent>;

    /// Health probe used by the periodic sweep. May be slow; callers bound it
    /// with a timeout.
    async fn check_health(&self) -> bool {
        self.is_healthy()
    }

    async fn initialize(&self) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    async fn execute(&self, task: &Task, context: TaskContext) -> TaskResult;
}

impl std::fmt::Debug for dyn Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent").field("id", &self.id()).finish()
    }
}
