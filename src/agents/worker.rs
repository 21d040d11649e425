use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

use super::{Agent, AgentEvent};
use crate::capabilities::{TaskContext, TaskHandler};
use crate::definitions::AgentSpec;
use crate::types::{AgentMetadata, AgentStatus, Task, TaskId, TaskResult};

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerOptions {
    /// Tasks that make up a 100% workload.
    pub max_concurrent_tasks: usize,
    /// Handler failures in a row before the worker reports itself in error.
    pub max_consecutive_failures: u32,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 4,
            max_consecutive_failures: 3,
        }
    }
}

struct WorkerState {
    status: AgentStatus,
    active_tasks: Vec<TaskId>,
    last_active_at: DateTime<Utc>,
    consecutive_failures: u32,
    last_error: Option<String>,
}

/// Stock agent implementation: drives a [`TaskHandler`] and tracks its own
/// status and workload. Starts `offline` until initialized.
pub struct WorkerAgent {
    spec: AgentSpec,
    handler: Arc<dyn TaskHandler>,
    options: WorkerOptions,
    state: Mutex<WorkerState>,
    events: broadcast::Sender<AgentEvent>,
    created_at: DateTime<Utc>,
}

impl WorkerAgent {
    pub fn new(spec: AgentSpec, handler: Arc<dyn TaskHandler>, options: WorkerOptions) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let now = Utc::now();

        Self {
            spec,
            handler,
            options,
            state: Mutex::new(WorkerState {
                status: AgentStatus::Offline,
                active_tasks: Vec::new(),
                last_active_at: now,
                consecutive_failures: 0,
                last_error: None,
            }),
            events,
            created_at: now,
        }
    }

    pub fn last_error(&self) -> Option<String> {
        self.state.lock().last_error.clone()
    }

    fn workload_of(&self, active: usize) -> f32 {
        let capacity = self.options.max_concurrent_tasks.max(1) as f32;
        (active as f32 / capacity * 100.0).min(100.0)
    }

    fn emit(&self, event: AgentEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_status(&self, status: AgentStatus) {
        self.state.lock().status = status;
        self.emit(AgentEvent::StatusChanged {
            agent_id: self.spec.id.clone(),
            status,
        });
    }

    fn finish_task(&self, task_id: &str, error: Option<&str>) -> AgentStatus {
        let mut state = self.state.lock();
        state.active_tasks.retain(|t| t != task_id);
        state.last_active_at = Utc::now();

        match error {
            None => state.consecutive_failures = 0,
            Some(message) => {
                state.consecutive_failures += 1;
                state.last_error = Some(message.to_string());
            }
        }

        state.status = if state.consecutive_failures >= self.options.max_consecutive_failures {
            AgentStatus::Error
        } else if state.active_tasks.is_empty() {
            AgentStatus::Idle
        } else {
            AgentStatus::Working
        };
        state.status
    }
}

#[async_trait]
impl Agent for WorkerAgent {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn metadata(&self) -> AgentMetadata {
        let state = self.state.lock();
        AgentMetadata {
            id: self.spec.id.clone(),
            name: self.spec.name.clone(),
            agent_type: self.spec.config.agent_type(),
            status: state.status,
            capabilities: self.spec.capabilities.clone(),
            workload: self.workload_of(state.active_tasks.len()),
            config: self.spec.config.clone(),
            created_at: self.created_at,
            last_active_at: state.last_active_at,
            current_task: state.active_tasks.last().cloned(),
        }
    }

    fn status(&self) -> AgentStatus {
        self.state.lock().status
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    async fn initialize(&self) -> Result<()> {
        match self.handler.initialize().await {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    state.consecutive_failures = 0;
                    state.last_error = None;
                    state.last_active_at = Utc::now();
                }
                self.set_status(AgentStatus::Idle);
                Ok(())
            }
            Err(e) => {
                self.state.lock().last_error = Some(e.to_string());
                self.set_status(AgentStatus::Error);
                self.emit(AgentEvent::Failed {
                    agent_id: self.spec.id.clone(),
                    message: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        let result = self.handler.shutdown().await;
        self.set_status(AgentStatus::Offline);
        result
    }

    async fn execute(&self, task: &Task, context: TaskContext) -> TaskResult {
        {
            let mut state = self.state.lock();
            if matches!(state.status, AgentStatus::Error | AgentStatus::Offline) {
                return TaskResult::failed(
                    &task.id,
                    format!("Agent {} is {}", self.spec.id, state.status.as_str()),
                );
            }
            state.active_tasks.push(task.id.clone());
            state.status = AgentStatus::Working;
            state.last_active_at = Utc::now();
        }
        self.emit(AgentEvent::TaskStarted {
            agent_id: self.spec.id.clone(),
            task_id: task.id.clone(),
        });

        let outcome = self.handler.handle(task, &context).await;

        let (result, error) = match outcome {
            Ok(output) => (
                TaskResult::succeeded(&task.id, output.output, output.edits),
                None,
            ),
            Err(e) => {
                log::warn!("Agent {} failed task {}: {:#}", self.spec.id, task.id, e);
                let message = e.to_string();
                (TaskResult::failed(&task.id, message.clone()), Some(message))
            }
        };

        let status = self.finish_task(&task.id, error.as_deref());
        self.emit(AgentEvent::TaskCompleted {
            agent_id: self.spec.id.clone(),
            task_id: task.id.clone(),
            success: result.success,
        });
        self.emit(AgentEvent::StatusChanged {
            agent_id: self.spec.id.clone(),
            status,
        });

        result
    }
}
