use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::Agent;
use crate::types::{AgentId, AgentMetadata};

pub struct AgentRecord {
    pub instance: Arc<dyn Agent>,
    pub metadata: AgentMetadata,
    /// Registration sequence; lower means registered earlier.
    pub seq: u64,
}

impl AgentRecord {
    /// Copy the live fields from the instance into the snapshot.
    pub fn refresh(&mut self) {
        let live = self.instance.metadata();
        self.metadata.status = live.status;
        self.metadata.workload = live.workload;
        self.metadata.current_task = live.current_task;
        self.metadata.last_active_at = live.last_active_at;
    }
}

#[derive(Default)]
pub struct AgentRecordStore {
    records: HashMap<AgentId, AgentRecord>,
    next_seq: u64,
}

impl AgentRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn insert(&mut self, instance: Arc<dyn Agent>, metadata: AgentMetadata) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.records.insert(
            metadata.id.clone(),
            AgentRecord {
                instance,
                metadata,
                seq,
            },
        );
    }

    pub fn remove(&mut self, id: &str) -> Option<AgentRecord> {
        self.records.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&AgentRecord> {
        self.records.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut AgentRecord> {
        self.records.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All records in registration order.
    pub fn ordered(&self) -> Vec<&AgentRecord> {
        let mut records: Vec<&AgentRecord> = self.records.values().collect();
        records.sort_by_key(|r| r.seq);
        records
    }

    pub fn refresh_all(&mut self) {
        for record in self.records.values_mut() {
            record.refresh();
        }
    }
}
