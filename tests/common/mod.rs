#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Notify};

use concord::agents::{Agent, AgentEvent};
use concord::capabilities::TaskContext;
use concord::definitions::AgentSpec;
use concord::factory::AgentFactory;
use concord::types::{
    AgentConfig, AgentMetadata, AgentStatus, AgentType, FileEdit, Task, TaskResult,
};

/// Scriptable agent. Behaviour comes from the custom config settings:
/// `health_delay_ms`, `init_failures` and `gated`.
pub struct FakeAgent {
    id: String,
    metadata: Mutex<AgentMetadata>,
    events: broadcast::Sender<AgentEvent>,
    healthy: AtomicBool,
    health_delay: Duration,
    init_failures: AtomicUsize,
    gate: Option<Arc<Notify>>,
}

impl FakeAgent {
    pub fn from_spec(spec: AgentSpec) -> Self {
        let settings = match &spec.config {
            AgentConfig::Custom { settings, .. } => settings.clone(),
            _ => Value::Null,
        };
        let (events, _) = broadcast::channel(32);

        Self {
            id: spec.id.clone(),
            metadata: Mutex::new(AgentMetadata {
                id: spec.id.clone(),
                name: spec.name.clone(),
                agent_type: spec.agent_type(),
                status: AgentStatus::Offline,
                capabilities: spec.capabilities.clone(),
                workload: 0.0,
                config: spec.config.clone(),
                created_at: Utc::now(),
                last_active_at: Utc::now(),
                current_task: None,
            }),
            events,
            healthy: AtomicBool::new(true),
            health_delay: Duration::from_millis(settings["health_delay_ms"].as_u64().unwrap_or(0)),
            init_failures: AtomicUsize::new(settings["init_failures"].as_u64().unwrap_or(0) as usize),
            gate: settings["gated"]
                .as_bool()
                .unwrap_or(false)
                .then(|| Arc::new(Notify::new())),
        }
    }

    pub fn set_status(&self, status: AgentStatus, workload: f32) {
        {
            let mut metadata = self.metadata.lock();
            metadata.status = status;
            metadata.workload = workload;
        }
        let _ = self.events.send(AgentEvent::StatusChanged {
            agent_id: self.id.clone(),
            status,
        });
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.healthy.store(healthy, Ordering::SeqCst);
    }

    /// Let one gated `execute` call proceed.
    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.notify_one();
        }
    }
}

#[async_trait]
impl Agent for FakeAgent {
    fn id(&self) -> &str {
        &self.id
    }

    fn metadata(&self) -> AgentMetadata {
        self.metadata.lock().clone()
    }

    fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.events.subscribe()
    }

    async fn check_health(&self) -> bool {
        if !self.health_delay.is_zero() {
            tokio::time::sleep(self.health_delay).await;
        }
        self.healthy.load(Ordering::SeqCst)
    }

    async fn initialize(&self) -> anyhow::Result<()> {
        let remaining = self.init_failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.init_failures.store(remaining - 1, Ordering::SeqCst);
            self.set_status(AgentStatus::Error, 0.0);
            anyhow::bail!("simulated init failure");
        }
        self.healthy.store(true, Ordering::SeqCst);
        self.set_status(AgentStatus::Idle, 0.0);
        Ok(())
    }

    async fn shutdown(&self) -> anyhow::Result<()> {
        self.set_status(AgentStatus::Offline, 0.0);
        Ok(())
    }

    /// Writes `payload.content` to every file the task names.
    async fn execute(&self, task: &Task, context: TaskContext) -> TaskResult {
        self.set_status(AgentStatus::Working, 50.0);
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }

        let content = task
            .payload
            .as_ref()
            .and_then(|p| p["content"].as_str())
            .unwrap_or_default()
            .to_string();
        let edits = context
            .files
            .keys()
            .map(|path| FileEdit {
                path: path.clone(),
                content: content.clone(),
            })
            .collect();

        self.set_status(AgentStatus::Idle, 0.0);
        TaskResult::succeeded(&task.id, json!({ "agent": self.id }), edits)
    }
}

/// Keeps a typed handle on every fake the factory builds so tests can poke
/// at agents the registry only knows as `dyn Agent`.
#[derive(Clone, Default)]
pub struct FakeFleet {
    agents: Arc<Mutex<HashMap<String, Arc<FakeAgent>>>>,
}

impl FakeFleet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Arc<FakeAgent> {
        self.agents
            .lock()
            .get(id)
            .cloned()
            .unwrap_or_else(|| panic!("no fake agent {}", id))
    }

    /// A factory that builds fakes for the custom type `fake`.
    pub fn factory(&self) -> AgentFactory {
        let mut factory = AgentFactory::new();
        let agents = self.agents.clone();
        factory
            .register_type(
                AgentType::from_name("fake"),
                Arc::new(move |spec: AgentSpec| {
                    let agent = Arc::new(FakeAgent::from_spec(spec));
                    agents
                        .lock()
                        .entry(agent.id.clone())
                        .or_insert_with(|| agent.clone());
                    let agent: Arc<dyn Agent> = agent;
                    Ok(agent)
                }),
            )
            .unwrap();
        factory
    }
}

pub fn fake_spec(id: &str, capabilities: &[&str], settings: Value) -> AgentSpec {
    AgentSpec::new(
        id,
        AgentConfig::Custom {
            type_name: "fake".to_string(),
            settings,
        },
        capabilities.iter().map(|c| c.to_string()).collect(),
    )
}

pub fn edit_task(path: &str, content: &str, requirements: &[&str]) -> Task {
    Task::new("edit")
        .with_files([path])
        .with_requirements(requirements.iter().copied())
        .with_payload(json!({ "content": content }))
}
