use futures::future::join_all;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::state_machine::{AgentLifecycle, LifecycleEvent, LifecycleState, LifecycleStateMachine};
use crate::agents::Agent;
use crate::definitions::AgentSpec;
use crate::error::{ConcordError, ResourceKind, Result, Severity};
use crate::factory::AgentFactory;
use crate::registry::{AgentRegistry, UnregisterReport};
use crate::types::AgentId;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfig {
    pub health_check_interval_secs: u64,
    pub health_check_timeout_ms: u64,
    pub auto_recover: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            health_check_interval_secs: 30,
            health_check_timeout_ms: 2_000,
            auto_recover: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: AgentId,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkOutcome {
    pub succeeded: Vec<AgentId>,
    pub failed: Vec<BulkFailure>,
}

impl BulkOutcome {
    fn record(&mut self, id: AgentId, result: Result<()>) {
        match result {
            Ok(()) => self.succeeded.push(id),
            Err(e) => self.failed.push(BulkFailure {
                id,
                error: e.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepReport {
    pub healthy: Vec<AgentId>,
    pub unhealthy: Vec<AgentId>,
    pub timed_out: Vec<AgentId>,
    pub recovered: Option<BulkOutcome>,
}

/// Creates, starts, stops and restarts agents, keeping one lifecycle record
/// per managed agent alongside the registry entry.
pub struct AgentLifecycleManager {
    registry: Arc<AgentRegistry>,
    factory: AgentFactory,
    lifecycles: Mutex<HashMap<AgentId, AgentLifecycle>>,
    config: LifecycleConfig,
}

impl AgentLifecycleManager {
    pub fn new(registry: Arc<AgentRegistry>, factory: AgentFactory, config: LifecycleConfig) -> Self {
        Self {
            registry,
            factory,
            lifecycles: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        &self.registry
    }

    pub fn get_lifecycle(&self, id: &str) -> Option<AgentLifecycle> {
        self.lifecycles.lock().get(id).cloned()
    }

    pub fn lifecycles(&self) -> Vec<AgentLifecycle> {
        let mut all: Vec<AgentLifecycle> = self.lifecycles.lock().values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        all
    }

    fn apply(&self, id: &str, event: LifecycleEvent) -> Result<LifecycleState> {
        let mut lifecycles = self.lifecycles.lock();
        let lifecycle = lifecycles
            .get_mut(id)
            .ok_or_else(|| ConcordError::not_found(ResourceKind::Lifecycle, id))?;
        LifecycleStateMachine::transition(lifecycle, event)
    }

    fn state_of(&self, id: &str) -> Option<LifecycleState> {
        self.lifecycles.lock().get(id).map(|l| l.state)
    }

    pub async fn create_agent(&self, spec: AgentSpec) -> Result<Arc<dyn Agent>> {
        let id = spec.id.clone();
        let agent = self.factory.create(spec)?;

        let mut lifecycle = AgentLifecycle::new(id.clone());
        LifecycleStateMachine::transition(&mut lifecycle, LifecycleEvent::Initialize)?;

        self.registry.register(agent.clone())?;
        self.lifecycles.lock().insert(id.clone(), lifecycle);

        match agent.initialize().await {
            Ok(()) => {
                self.apply(&id, LifecycleEvent::Initialized)?;
                log::info!("Agent {} is running", id);
                Ok(agent)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                log::warn!("Agent {} failed to initialize: {}", id, message);
                self.apply(&id, LifecycleEvent::Fail(message.clone()))?;
                self.registry.update_metadata(&id);
                Err(ConcordError::system(
                    Severity::High,
                    format!("agent {} failed to initialize: {}", id, message),
                ))
            }
        }
    }

    pub async fn create_agents(&self, specs: Vec<AgentSpec>) -> BulkOutcome {
        let mut outcome = BulkOutcome::default();
        for spec in specs {
            let id = spec.id.clone();
            let result = self.create_agent(spec).await.map(|_| ());
            outcome.record(id, result);
        }
        outcome
    }

    pub async fn destroy_agent(&self, id: &str) -> Result<UnregisterReport> {
        self.apply(id, LifecycleEvent::Stop)?;

        let report = match self.registry.unregister(id).await {
            Ok(report) => report,
            Err(e) => {
                self.apply(id, LifecycleEvent::Fail(e.to_string()))?;
                return Err(e);
            }
        };

        self.apply(id, LifecycleEvent::Stopped)?;
        self.lifecycles.lock().remove(id);
        log::info!("Agent {} destroyed", id);
        Ok(report)
    }

    /// Stop and re-initialize an agent in place. The agent stays registered
    /// throughout.
    pub async fn restart_agent(&self, id: &str) -> Result<()> {
        let agent = self
            .registry
            .get_agent(id)
            .ok_or_else(|| ConcordError::agent_not_found(id))?;

        self.apply(id, LifecycleEvent::Restart)?;

        if let Err(e) = agent.shutdown().await {
            log::warn!("Agent {} did not shut down cleanly during restart: {:#}", id, e);
            if let Some(lifecycle) = self.lifecycles.lock().get_mut(id) {
                lifecycle.error_count += 1;
                lifecycle.last_error = Some(e.to_string());
            }
        }

        self.apply(id, LifecycleEvent::Stopped)?;
        self.apply(id, LifecycleEvent::Initialize)?;

        let result = agent.initialize().await;
        self.registry.update_metadata(id);

        match result {
            Ok(()) => {
                self.apply(id, LifecycleEvent::Initialized)?;
                log::info!("Agent {} restarted", id);
                Ok(())
            }
            Err(e) => {
                let message = format!("{:#}", e);
                self.apply(id, LifecycleEvent::Fail(message.clone()))?;
                Err(ConcordError::system(
                    Severity::High,
                    format!("agent {} failed to restart: {}", id, message),
                ))
            }
        }
    }

    pub async fn auto_recover_error_agents(&self) -> BulkOutcome {
        let failed: Vec<AgentId> = self
            .lifecycles
            .lock()
            .values()
            .filter(|l| l.state == LifecycleState::Error)
            .map(|l| l.agent_id.clone())
            .collect();

        let mut outcome = BulkOutcome::default();
        for id in failed {
            let result = self.restart_agent(&id).await;
            outcome.record(id, result);
        }

        if !outcome.failed.is_empty() {
            log::warn!(
                "Auto-recovery restarted {} agents, {} still failing",
                outcome.succeeded.len(),
                outcome.failed.len()
            );
        }
        outcome
    }

    pub async fn shutdown_all(&self) -> BulkOutcome {
        let ids: Vec<AgentId> = self.lifecycles().into_iter().map(|l| l.agent_id).collect();

        let mut outcome = BulkOutcome::default();
        for id in ids {
            let result = self.destroy_agent(&id).await.map(|_| ());
            outcome.record(id, result);
        }
        outcome
    }

    /// Probe every registered agent concurrently. Running agents that report
    /// unhealthy or miss the timeout move to `error`.
    pub async fn run_health_sweep(&self) -> SweepReport {
        let timeout = Duration::from_millis(self.config.health_check_timeout_ms);
        let agents = self.registry.all_agents();

        let probes = agents.iter().map(|agent| async move {
            let outcome = tokio::time::timeout(timeout, agent.check_health()).await;
            (agent.id().to_string(), outcome)
        });
        let results = join_all(probes).await;

        let mut report = SweepReport::default();
        for (id, outcome) in results {
            let reason = match outcome {
                Ok(true) => {
                    report.healthy.push(id);
                    continue;
                }
                Ok(false) => {
                    report.unhealthy.push(id.clone());
                    "health check failed".to_string()
                }
                Err(_) => {
                    report.timed_out.push(id.clone());
                    format!("health check timed out after {:?}", timeout)
                }
            };

            if self.state_of(&id) == Some(LifecycleState::Running) {
                log::warn!("Agent {}: {}", id, reason);
                if let Err(e) = self.apply(&id, LifecycleEvent::Fail(reason)) {
                    log::warn!("Could not mark agent {} as failed: {}", id, e);
                }
            }
        }

        if self.config.auto_recover {
            report.recovered = Some(self.auto_recover_error_agents().await);
        }
        report
    }

    /// Run the health sweep on a fixed interval until the handle is aborted.
    pub fn spawn_health_monitor(self: &Arc<Self>) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let period = Duration::from_secs(self.config.health_check_interval_secs.max(1));

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let report = manager.run_health_sweep().await;
                log::debug!(
                    "Health sweep: {} healthy, {} unhealthy, {} timed out",
                    report.healthy.len(),
                    report.unhealthy.len(),
                    report.timed_out.len()
                );
            }
        })
    }
}
