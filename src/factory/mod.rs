use std::collections::HashMap;
use std::sync::Arc;

use crate::agents::{Agent, WorkerAgent, WorkerOptions};
use crate::capabilities::{FileEditHandler, TaskHandler};
use crate::definitions::AgentSpec;
use crate::error::{ConcordError, ResourceKind, Result};
use crate::types::AgentType;

pub type AgentConstructor = Arc<dyn Fn(AgentSpec) -> Result<Arc<dyn Agent>> + Send + Sync>;

/// Maps agent types to constructors. The lifecycle manager asks it for new
/// instances; it never touches the registry itself.
pub struct AgentFactory {
    constructors: HashMap<AgentType, AgentConstructor>,
}

impl AgentFactory {
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A factory that builds a [`WorkerAgent`] around the file-edit handler
    /// for every builtin type.
    pub fn with_worker_defaults(options: WorkerOptions) -> Self {
        let mut factory = Self::new();
        let handler: Arc<dyn TaskHandler> = Arc::new(FileEditHandler::new());

        for agent_type in AgentType::BUILTIN {
            let handler = handler.clone();
            let options = options.clone();
            factory.constructors.insert(
                agent_type,
                Arc::new(move |spec: AgentSpec| {
                    let agent: Arc<dyn Agent> =
                        Arc::new(WorkerAgent::new(spec, handler.clone(), options.clone()));
                    Ok(agent)
                }),
            );
        }

        factory
    }

    pub fn register_type(
        &mut self,
        agent_type: AgentType,
        constructor: AgentConstructor,
    ) -> Result<()> {
        if !agent_type.is_valid() {
            return Err(ConcordError::validation(format!(
                "invalid agent type name: {:?}",
                agent_type.as_str()
            )));
        }
        if self.constructors.contains_key(&agent_type) {
            return Err(ConcordError::validation(format!(
                "agent type {} already has a constructor",
                agent_type
            )));
        }

        log::debug!("Registered constructor for agent type {}", agent_type);
        self.constructors.insert(agent_type, constructor);
        Ok(())
    }

    /// Shorthand for custom types whose agents are workers around `handler`.
    pub fn register_handler(
        &mut self,
        agent_type: AgentType,
        handler: Arc<dyn TaskHandler>,
        options: WorkerOptions,
    ) -> Result<()> {
        self.register_type(
            agent_type,
            Arc::new(move |spec: AgentSpec| {
                let agent: Arc<dyn Agent> =
                    Arc::new(WorkerAgent::new(spec, handler.clone(), options.clone()));
                Ok(agent)
            }),
        )
    }

    pub fn supports(&self, agent_type: &AgentType) -> bool {
        self.constructors.contains_key(agent_type)
    }

    pub fn create(&self, spec: AgentSpec) -> Result<Arc<dyn Agent>> {
        let agent_type = spec.agent_type();
        let constructor = self
            .constructors
            .get(&agent_type)
            .ok_or_else(|| ConcordError::not_found(ResourceKind::AgentType, agent_type.as_str()))?;

        constructor(spec)
    }

    pub fn registered_types(&self) -> Vec<AgentType> {
        let mut types: Vec<AgentType> = self.constructors.keys().cloned().collect();
        types.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        types
    }
}

impl Default for AgentFactory {
    fn default() -> Self {
        Self::with_worker_defaults(WorkerOptions::default())
    }
}
