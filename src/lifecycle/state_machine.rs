use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{ConcordError, Result};
use crate::types::AgentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleState {
    Created,
    Initializing,
    Running,
    Stopping,
    Stopped,
    Error,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LifecycleState::Created => "created",
            LifecycleState::Initializing => "initializing",
            LifecycleState::Running => "running",
            LifecycleState::Stopping => "stopping",
            LifecycleState::Stopped => "stopped",
            LifecycleState::Error => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    Initialize,
    Initialized,
    Stop,
    Stopped,
    Restart,
    Fail(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentLifecycle {
    pub agent_id: AgentId,
    pub state: LifecycleState,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub error_count: u32,
    pub last_error: Option<String>,
    pub restart_count: u32,
}

impl AgentLifecycle {
    pub fn new(agent_id: impl Into<AgentId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            state: LifecycleState::Created,
            created_at: Utc::now(),
            started_at: None,
            stopped_at: None,
            error_count: 0,
            last_error: None,
            restart_count: 0,
        }
    }
}

pub struct LifecycleStateMachine;

impl LifecycleStateMachine {
    pub fn transition(
        lifecycle: &mut AgentLifecycle,
        event: LifecycleEvent,
    ) -> Result<LifecycleState> {
        let new_state = match (lifecycle.state, &event) {
            (LifecycleState::Created | LifecycleState::Stopped, LifecycleEvent::Initialize) => {
                LifecycleState::Initializing
            }
            (LifecycleState::Initializing, LifecycleEvent::Initialized) => LifecycleState::Running,

            (LifecycleState::Running | LifecycleState::Error, LifecycleEvent::Stop) => {
                LifecycleState::Stopping
            }
            (LifecycleState::Running | LifecycleState::Error, LifecycleEvent::Restart) => {
                LifecycleState::Stopping
            }
            (LifecycleState::Stopping, LifecycleEvent::Stopped) => LifecycleState::Stopped,

            (_, LifecycleEvent::Fail(_)) => LifecycleState::Error,

            _ => {
                return Err(ConcordError::validation(format!(
                    "invalid lifecycle transition for {} from {} on {:?}",
                    lifecycle.agent_id, lifecycle.state, event
                )));
            }
        };

        let now = Utc::now();
        match &event {
            LifecycleEvent::Initialized => {
                lifecycle.started_at = Some(now);
                lifecycle.stopped_at = None;
            }
            LifecycleEvent::Stopped => lifecycle.stopped_at = Some(now),
            LifecycleEvent::Restart => lifecycle.restart_count += 1,
            LifecycleEvent::Fail(message) => {
                lifecycle.error_count += 1;
                lifecycle.last_error = Some(message.clone());
            }
            _ => {}
        }

        lifecycle.state = new_state;
        Ok(new_state)
    }
}
