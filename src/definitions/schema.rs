use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::types::{AgentConfig, AgentId, AgentType, Task};

/// Declarative description of an agent to create.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    #[serde(default = "generate_agent_id")]
    pub id: AgentId,
    pub name: String,
    pub capabilities: Vec<String>,
    pub config: AgentConfig,
}

fn generate_agent_id() -> AgentId {
    uuid::Uuid::new_v4().to_string()
}

impl AgentSpec {
    pub fn new(name: impl Into<String>, config: AgentConfig, capabilities: Vec<String>) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            capabilities,
            config,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn agent_type(&self) -> AgentType {
        self.config.agent_type()
    }
}

/// A set of agents loaded from YAML:
///
/// ```yaml
/// agents:
///   - id: fe-1
///     name: Frontend
///     capabilities: [typescript, react]
///     config: { type: frontend, framework: react }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FleetDefinition {
    #[serde(default)]
    pub agents: Vec<AgentSpec>,
}

impl FleetDefinition {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid fleet definition")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fleet file {}", path.display()))?;
        Self::from_yaml(&raw)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskBatch {
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskBatch {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Invalid task batch")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read task file {}", path.display()))?;
        Self::from_yaml(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fleet_from_yaml() {
        let yaml = r#"
agents:
  - id: fe-1
    name: Frontend
    capabilities: [typescript, react]
    config:
      type: frontend
      framework: svelte
  - name: Reviewer
    capabilities: [review]
    config:
      type: code-review
"#;
        let fleet = FleetDefinition::from_yaml(yaml).unwrap();
        assert_eq!(fleet.agents.len(), 2);
        assert_eq!(fleet.agents[0].id, "fe-1");
        assert_eq!(fleet.agents[0].agent_type(), AgentType::Frontend);
        assert_eq!(fleet.agents[1].agent_type(), AgentType::CodeReview);
        assert!(!fleet.agents[1].id.is_empty());
    }

    #[test]
    fn test_task_batch_from_yaml() {
        let yaml = r#"
tasks:
  - id: t1
    task_type: write-code
    files: [/src/foo.ts]
    requirements: [typescript]
    priority: high
    payload:
      edits:
        - path: /src/foo.ts
          content: "const x=1;"
"#;
        let batch = TaskBatch::from_yaml(yaml).unwrap();
        assert_eq!(batch.tasks.len(), 1);
        assert_eq!(batch.tasks[0].files, vec!["/src/foo.ts".to_string()]);
    }

    #[test]
    fn test_bad_fleet_yaml() {
        assert!(FleetDefinition::from_yaml("agents: [{ name: x }]").is_err());
    }
}
