use std::collections::{HashMap, HashSet};

use crate::types::{AgentId, AgentMetadata, AgentType};

/// Secondary lookups over the record store. Mutated only together with the
/// store, under the registry's write lock.
#[derive(Debug, Default)]
pub struct AgentIndices {
    by_type: HashMap<AgentType, HashSet<AgentId>>,
    by_capability: HashMap<String, HashSet<AgentId>>,
}

impl AgentIndices {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, metadata: &AgentMetadata) {
        self.by_type
            .entry(metadata.agent_type.clone())
            .or_default()
            .insert(metadata.id.clone());

        for capability in &metadata.capabilities {
            self.by_capability
                .entry(capability.clone())
                .or_default()
                .insert(metadata.id.clone());
        }
    }

    pub fn remove(&mut self, metadata: &AgentMetadata) {
        if let Some(ids) = self.by_type.get_mut(&metadata.agent_type) {
            ids.remove(&metadata.id);
            if ids.is_empty() {
                self.by_type.remove(&metadata.agent_type);
            }
        }

        for capability in &metadata.capabilities {
            if let Some(ids) = self.by_capability.get_mut(capability) {
                ids.remove(&metadata.id);
                if ids.is_empty() {
                    self.by_capability.remove(capability);
                }
            }
        }
    }

    pub fn ids_for_type(&self, agent_type: &AgentType) -> HashSet<AgentId> {
        self.by_type.get(agent_type).cloned().unwrap_or_default()
    }

    pub fn ids_for_capability(&self, capability: &str) -> HashSet<AgentId> {
        self.by_capability
            .get(capability)
            .cloned()
            .unwrap_or_default()
    }

    /// Agents holding every capability in `required`; `None` when nothing is
    /// required, meaning "no restriction".
    pub fn ids_with_all(&self, required: &[String]) -> Option<HashSet<AgentId>> {
        let mut iter = required.iter();
        let first = iter.next()?;
        let mut ids = self.ids_for_capability(first);
        for capability in iter {
            if ids.is_empty() {
                break;
            }
            let other = self.by_capability.get(capability);
            ids.retain(|id| other.is_some_and(|set| set.contains(id)));
        }
        Some(ids)
    }

    pub fn capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self.by_capability.keys().cloned().collect();
        caps.sort();
        caps
    }
}
