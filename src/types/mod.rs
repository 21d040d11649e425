pub mod agent;
pub mod conflict;
pub mod lock;
pub mod task;

pub use agent::{AgentConfig, AgentMetadata};
pub use conflict::{
    Conflict, ConflictHistoryEntry, ConflictResolution, ConflictSummary, ConflictType,
    ConflictVersion, HistoryFilter, OverwriteSource, ResolutionRequest, ResolutionSpec,
    ResolutionStrategy, ResolutionSuggestion, SuggestionType,
};
pub use lock::{FileLock, LockType};
pub use task::{FileEdit, Task, TaskPriority, TaskResult};

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

pub type AgentId = String;
pub type TaskId = String;
pub type ConflictId = uuid::Uuid;

static CUSTOM_TYPE_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_-]{0,63}$").expect("static pattern"));

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum AgentType {
    Frontend,
    Backend,
    Testing,
    CodeReview,
    Documentation,
    DevOps,
    Custom(String),
}

impl AgentType {
    pub const BUILTIN: [AgentType; 6] = [
        AgentType::Frontend,
        AgentType::Backend,
        AgentType::Testing,
        AgentType::CodeReview,
        AgentType::Documentation,
        AgentType::DevOps,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            AgentType::Frontend => "frontend",
            AgentType::Backend => "backend",
            AgentType::Testing => "testing",
            AgentType::CodeReview => "code-review",
            AgentType::Documentation => "documentation",
            AgentType::DevOps => "devops",
            AgentType::Custom(name) => name,
        }
    }

    pub fn from_name(name: &str) -> Self {
        match name {
            "frontend" => AgentType::Frontend,
            "backend" => AgentType::Backend,
            "testing" => AgentType::Testing,
            "code-review" => AgentType::CodeReview,
            "documentation" => AgentType::Documentation,
            "devops" => AgentType::DevOps,
            other => AgentType::Custom(other.to_string()),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self, AgentType::Custom(_))
    }

    /// Custom type names are lowercase identifiers that must not shadow a builtin.
    pub fn is_valid(&self) -> bool {
        match self {
            AgentType::Custom(name) => {
                CUSTOM_TYPE_NAME.is_match(name)
                    && !Self::BUILTIN.iter().any(|b| b.as_str() == name)
            }
            _ => true,
        }
    }
}

impl fmt::Display for AgentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_name(s))
    }
}

impl From<AgentType> for String {
    fn from(agent_type: AgentType) -> Self {
        agent_type.as_str().to_string()
    }
}

impl TryFrom<String> for AgentType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let agent_type = AgentType::from_name(&value);
        if agent_type.is_valid() {
            Ok(agent_type)
        } else {
            Err(format!("invalid agent type: {:?}", value))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Working,
    Error,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &str {
        match self {
            AgentStatus::Idle => "idle",
            AgentStatus::Working => "working",
            AgentStatus::Error => "error",
            AgentStatus::Offline => "offline",
        }
    }
}

impl FromStr for AgentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "idle" => Ok(AgentStatus::Idle),
            "working" => Ok(AgentStatus::Working),
            "error" => Ok(AgentStatus::Error),
            "offline" => Ok(AgentStatus::Offline),
            other => Err(format!("unknown agent status: {}", other)),
        }
    }
}
