//! Agent registry: record store plus type/capability indices behind a single
//! lock, so readers never observe a store and index that disagree.

pub mod index;
pub mod store;

pub use index::AgentIndices;
pub use store::{AgentRecord, AgentRecordStore};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::agents::Agent;
use crate::error::{ConcordError, Result};
use crate::types::{AgentId, AgentMetadata, AgentStatus, AgentType};

const REGISTRY_EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RegistryEvent {
    Registered {
        agent_id: AgentId,
        agent_type: AgentType,
    },
    Unregistered {
        agent_id: AgentId,
    },
    MetadataUpdated {
        agent_id: AgentId,
        status: AgentStatus,
        workload: f32,
    },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DiscoveryCriteria {
    #[serde(default)]
    pub agent_type: Option<AgentType>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub max_workload: Option<f32>,
}

impl DiscoveryCriteria {
    pub fn matches(&self, metadata: &AgentMetadata) -> bool {
        self.agent_type
            .as_ref()
            .is_none_or(|t| &metadata.agent_type == t)
            && self.status.is_none_or(|s| metadata.status == s)
            && metadata.has_all_capabilities(&self.capabilities)
            && self.max_workload.is_none_or(|max| metadata.workload <= max)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    pub healthy: Vec<AgentId>,
    pub unhealthy: Vec<AgentId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnregisterReport {
    pub agent_id: AgentId,
    pub shutdown_requested: bool,
    /// Set when the agent's shutdown hook failed; unregistration still completed.
    pub shutdown_error: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    store: AgentRecordStore,
    indices: AgentIndices,
}

pub struct AgentRegistry {
    state: Arc<RwLock<RegistryState>>,
    subscriptions: Mutex<HashMap<AgentId, JoinHandle<()>>>,
    events: broadcast::Sender<RegistryEvent>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(REGISTRY_EVENT_CAPACITY);
        Self {
            state: Arc::new(RwLock::new(RegistryState::default())),
            subscriptions: Mutex::new(HashMap::new()),
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    pub fn register(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let metadata = agent.metadata();
        let agent_id = metadata.id.clone();
        let agent_type = metadata.agent_type.clone();

        {
            let mut state = self.state.write();
            if state.store.contains(&agent_id) {
                return Err(ConcordError::DuplicateAgent(agent_id));
            }
            validate_metadata(&metadata)?;
            state.indices.insert(&metadata);
            state.store.insert(agent.clone(), metadata);
            // under the state lock so unregister always finds the listener
            self.attach(&agent_id, agent.as_ref());
        }

        log::info!("Registered agent {} ({})", agent_id, agent_type);
        let _ = self.events.send(RegistryEvent::Registered {
            agent_id,
            agent_type,
        });
        Ok(())
    }

    /// Remove an agent. The record leaves the store and indices atomically
    /// before shutdown is requested, so concurrent callers see `NotFound`.
    pub async fn unregister(&self, id: &str) -> Result<UnregisterReport> {
        let record = {
            let mut state = self.state.write();
            let record = state
                .store
                .remove(id)
                .ok_or_else(|| ConcordError::agent_not_found(id))?;
            state.indices.remove(&record.metadata);
            if let Some(handle) = self.subscriptions.lock().remove(id) {
                handle.abort();
            }
            record
        };

        let shutdown_requested = record.instance.is_healthy();
        let shutdown_error = if shutdown_requested {
            match record.instance.shutdown().await {
                Ok(()) => None,
                Err(e) => {
                    log::warn!("Shutdown of agent {} failed during unregistration: {:#}", id, e);
                    Some(e.to_string())
                }
            }
        } else {
            None
        };

        log::info!("Unregistered agent {}", id);
        let _ = self.events.send(RegistryEvent::Unregistered {
            agent_id: id.to_string(),
        });

        Ok(UnregisterReport {
            agent_id: id.to_string(),
            shutdown_requested,
            shutdown_error,
        })
    }

    pub fn get_agent(&self, id: &str) -> Option<Arc<dyn Agent>> {
        self.state
            .read()
            .store
            .get(id)
            .map(|r| r.instance.clone())
    }

    pub fn get_metadata(&self, id: &str) -> Option<AgentMetadata> {
        let mut state = self.state.write();
        let record = state.store.get_mut(id)?;
        record.refresh();
        Some(record.metadata.clone())
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.state.read().store.contains(id)
    }

    pub fn len(&self) -> usize {
        self.state.read().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn agent_ids(&self) -> Vec<AgentId> {
        self.state
            .read()
            .store
            .ordered()
            .into_iter()
            .map(|r| r.metadata.id.clone())
            .collect()
    }

    pub fn all_agents(&self) -> Vec<Arc<dyn Agent>> {
        self.state
            .read()
            .store
            .ordered()
            .into_iter()
            .map(|r| r.instance.clone())
            .collect()
    }

    pub fn all_metadata(&self) -> Vec<AgentMetadata> {
        let mut state = self.state.write();
        state.store.refresh_all();
        state
            .store
            .ordered()
            .into_iter()
            .map(|r| r.metadata.clone())
            .collect()
    }

    pub fn get_agents_by_type(&self, agent_type: &AgentType) -> Vec<AgentMetadata> {
        let state = self.state.read();
        let ids = state.indices.ids_for_type(agent_type);
        state
            .store
            .ordered()
            .into_iter()
            .filter(|r| ids.contains(&r.metadata.id))
            .map(|r| r.metadata.clone())
            .collect()
    }

    pub fn get_agents_by_capability(&self, capability: &str) -> Vec<AgentMetadata> {
        let state = self.state.read();
        let ids = state.indices.ids_for_capability(capability);
        state
            .store
            .ordered()
            .into_iter()
            .filter(|r| ids.contains(&r.metadata.id))
            .map(|r| r.metadata.clone())
            .collect()
    }

    pub fn capabilities(&self) -> Vec<String> {
        self.state.read().indices.capabilities()
    }

    /// Snapshots of every agent matching all provided criteria, in
    /// registration order.
    pub fn discover(&self, criteria: &DiscoveryCriteria) -> Vec<AgentMetadata> {
        let mut state = self.state.write();
        state.store.refresh_all();

        let candidates = state.indices.ids_with_all(&criteria.capabilities);
        let type_ids = criteria
            .agent_type
            .as_ref()
            .map(|t| state.indices.ids_for_type(t));

        state
            .store
            .ordered()
            .into_iter()
            .filter(|r| candidates.as_ref().is_none_or(|c| c.contains(&r.metadata.id)))
            .filter(|r| type_ids.as_ref().is_none_or(|t| t.contains(&r.metadata.id)))
            .filter(|r| criteria.matches(&r.metadata))
            .map(|r| r.metadata.clone())
            .collect()
    }

    /// Pick an agent for work needing `required`.
    ///
    /// The earliest-registered idle match wins. Failing that, the match with
    /// the lowest workload (ties to earliest registration) in any status.
    pub fn find_best(
        &self,
        required: &[String],
        preferred_type: Option<&AgentType>,
    ) -> Option<Arc<dyn Agent>> {
        let mut state = self.state.write();
        state.store.refresh_all();

        let candidates = state.indices.ids_with_all(required);
        let matching: Vec<&AgentRecord> = state
            .store
            .ordered()
            .into_iter()
            .filter(|r| candidates.as_ref().is_none_or(|c| c.contains(&r.metadata.id)))
            .filter(|r| preferred_type.is_none_or(|t| &r.metadata.agent_type == t))
            .collect();

        if let Some(idle) = matching
            .iter()
            .find(|r| r.metadata.status == AgentStatus::Idle)
        {
            return Some(idle.instance.clone());
        }

        matching
            .into_iter()
            .min_by(|a, b| {
                a.metadata
                    .workload
                    .total_cmp(&b.metadata.workload)
                    .then(a.seq.cmp(&b.seq))
            })
            .map(|r| r.instance.clone())
    }

    /// Re-read live status, workload and current task for `id`. Unknown ids
    /// are ignored so this is safe from any event handler.
    pub fn update_metadata(&self, id: &str) {
        refresh_record(&self.state, &self.events, id);
    }

    pub fn health_check(&self) -> HealthReport {
        let state = self.state.read();
        let mut report = HealthReport::default();
        for record in state.store.ordered() {
            if record.instance.is_healthy() {
                report.healthy.push(record.metadata.id.clone());
            } else {
                report.unhealthy.push(record.metadata.id.clone());
            }
        }
        report
    }

    fn attach(&self, agent_id: &str, agent: &dyn Agent) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            log::debug!(
                "No runtime to follow events of {}; snapshot refreshes on query",
                agent_id
            );
            return;
        };

        let mut receiver = agent.subscribe();
        let state = Arc::clone(&self.state);
        let events = self.events.clone();
        let id = agent_id.to_string();

        let handle = runtime.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => refresh_record(&state, &events, event.agent_id()),
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        log::debug!("Agent {} event stream lagged by {}", id, skipped);
                        refresh_record(&state, &events, &id);
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        if let Some(stale) = self.subscriptions.lock().insert(agent_id.to_string(), handle) {
            stale.abort();
        }
    }

    #[cfg(test)]
    fn listener_count(&self) -> usize {
        self.subscriptions.lock().len()
    }
}

impl Default for AgentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AgentRegistry {
    fn drop(&mut self) {
        for (_, handle) in self.subscriptions.lock().drain() {
            handle.abort();
        }
    }
}

fn refresh_record(
    state: &RwLock<RegistryState>,
    events: &broadcast::Sender<RegistryEvent>,
    id: &str,
) {
    let updated = {
        let mut state = state.write();
        state.store.get_mut(id).map(|record| {
            record.refresh();
            (record.metadata.status, record.metadata.workload)
        })
    };

    if let Some((status, workload)) = updated {
        let _ = events.send(RegistryEvent::MetadataUpdated {
            agent_id: id.to_string(),
            status,
            workload,
        });
    }
}

fn validate_metadata(metadata: &AgentMetadata) -> Result<()> {
    if metadata.id.trim().is_empty() {
        return Err(ConcordError::validation("agent id must not be empty"));
    }
    if metadata.name.trim().is_empty() {
        return Err(ConcordError::validation(format!(
            "agent {} has an empty name",
            metadata.id
        )));
    }
    if !metadata.agent_type.is_valid() {
        return Err(ConcordError::validation(format!(
            "agent {} has invalid type {:?}",
            metadata.id,
            metadata.agent_type.as_str()
        )));
    }
    if metadata.capabilities.is_empty() {
        return Err(ConcordError::validation(format!(
            "agent {} declares no capabilities",
            metadata.id
        )));
    }
    if metadata.capabilities.iter().any(|c| c.trim().is_empty()) {
        return Err(ConcordError::validation(format!(
            "agent {} declares an empty capability",
            metadata.id
        )));
    }
    if !(0.0..=100.0).contains(&metadata.workload) {
        return Err(ConcordError::validation(format!(
            "agent {} reports workload {} outside 0-100",
            metadata.id, metadata.workload
        )));
    }
    Ok(())
}
