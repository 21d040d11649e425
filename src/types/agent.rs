use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{AgentId, AgentStatus, AgentType, TaskId};

/// Per-type agent configuration. The variant decides the agent type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum AgentConfig {
    Frontend {
        framework: String,
    },
    Backend {
        language: String,
        #[serde(default)]
        framework: Option<String>,
    },
    Testing {
        test_framework: String,
        #[serde(default = "default_coverage_threshold")]
        coverage_threshold: f32,
    },
    CodeReview {
        #[serde(default = "default_max_findings")]
        max_findings: usize,
        #[serde(default)]
        block_on_error: bool,
    },
    Documentation {
        format: String,
    },
    #[serde(rename = "devops")]
    DevOps {
        platform: String,
    },
    Custom {
        type_name: String,
        #[serde(default)]
        settings: Value,
    },
}

fn default_coverage_threshold() -> f32 {
    80.0
}

fn default_max_findings() -> usize {
    25
}

impl AgentConfig {
    pub fn agent_type(&self) -> AgentType {
        match self {
            AgentConfig::Frontend { .. } => AgentType::Frontend,
            AgentConfig::Backend { .. } => AgentType::Backend,
            AgentConfig::Testing { .. } => AgentType::Testing,
            AgentConfig::CodeReview { .. } => AgentType::CodeReview,
            AgentConfig::Documentation { .. } => AgentType::Documentation,
            AgentConfig::DevOps { .. } => AgentType::DevOps,
            // never resolved to a builtin; validation rejects builtin names
            AgentConfig::Custom { type_name, .. } => AgentType::Custom(type_name.clone()),
        }
    }

    /// A sensible configuration for each builtin type.
    pub fn default_for(agent_type: &AgentType) -> Self {
        match agent_type {
            AgentType::Frontend => AgentConfig::Frontend {
                framework: "react".to_string(),
            },
            AgentType::Backend => AgentConfig::Backend {
                language: "rust".to_string(),
                framework: None,
            },
            AgentType::Testing => AgentConfig::Testing {
                test_framework: "cargo-test".to_string(),
                coverage_threshold: default_coverage_threshold(),
            },
            AgentType::CodeReview => AgentConfig::CodeReview {
                max_findings: default_max_findings(),
                block_on_error: false,
            },
            AgentType::Documentation => AgentConfig::Documentation {
                format: "markdown".to_string(),
            },
            AgentType::DevOps => AgentConfig::DevOps {
                platform: "kubernetes".to_string(),
            },
            AgentType::Custom(name) => AgentConfig::Custom {
                type_name: name.clone(),
                settings: Value::Null,
            },
        }
    }
}

/// Snapshot of an agent as the registry sees it. Status, workload and the
/// current task are copied from the live instance and are never authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMetadata {
    pub id: AgentId,
    pub name: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub capabilities: Vec<String>,
    pub workload: f32,
    pub config: AgentConfig,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    pub current_task: Option<TaskId>,
}

impl AgentMetadata {
    pub fn has_capability(&self, capability: &str) -> bool {
        self.capabilities.iter().any(|c| c == capability)
    }

    pub fn has_all_capabilities<S: AsRef<str>>(&self, required: &[S]) -> bool {
        required.iter().all(|c| self.has_capability(c.as_ref()))
    }
}
