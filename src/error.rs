use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::LockType;

pub type Result<T> = std::result::Result<T, ConcordError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Agent,
    AgentType,
    CapableAgent,
    Conflict,
    Lifecycle,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Agent => "agent",
            ResourceKind::AgentType => "agent type",
            ResourceKind::CapableAgent => "agent with capabilities",
            ResourceKind::Conflict => "conflict",
            ResourceKind::Lifecycle => "lifecycle record",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum ConcordError {
    #[error("agent already registered: {0}")]
    DuplicateAgent(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: ResourceKind, id: String },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{path} is locked ({held}) by {holder}")]
    LockContention {
        path: String,
        holder: String,
        held: LockType,
    },

    #[error("unknown resolution strategy: {0}")]
    UnknownStrategy(String),

    #[error("system error [{severity}]: {message}")]
    System { severity: Severity, message: String },
}

impl ConcordError {
    pub fn not_found(kind: ResourceKind, id: impl Into<String>) -> Self {
        ConcordError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn agent_not_found(id: impl Into<String>) -> Self {
        Self::not_found(ResourceKind::Agent, id)
    }

    pub fn conflict_not_found(id: impl ToString) -> Self {
        Self::not_found(ResourceKind::Conflict, id.to_string())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ConcordError::Validation(message.into())
    }

    pub fn system(severity: Severity, message: impl Into<String>) -> Self {
        ConcordError::System {
            severity,
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ConcordError::NotFound { .. })
    }

    pub fn is_lock_contention(&self) -> bool {
        matches!(self, ConcordError::LockContention { .. })
    }
}

impl From<std::io::Error> for ConcordError {
    fn from(err: std::io::Error) -> Self {
        ConcordError::system(Severity::High, format!("io: {}", err))
    }
}

impl From<serde_json::Error> for ConcordError {
    fn from(err: serde_json::Error) -> Self {
        ConcordError::system(Severity::Medium, format!("serialization: {}", err))
    }
}

impl From<sqlx::Error> for ConcordError {
    fn from(err: sqlx::Error) -> Self {
        ConcordError::system(Severity::High, format!("database: {}", err))
    }
}

impl From<anyhow::Error> for ConcordError {
    fn from(err: anyhow::Error) -> Self {
        ConcordError::system(Severity::Medium, format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = ConcordError::agent_not_found("agent-1");
        assert_eq!(err.to_string(), "agent not found: agent-1");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_lock_contention_message() {
        let err = ConcordError::LockContention {
            path: "/src/foo.ts".to_string(),
            holder: "agent-2".to_string(),
            held: LockType::Write,
        };
        assert_eq!(err.to_string(), "/src/foo.ts is locked (write) by agent-2");
        assert!(err.is_lock_contention());
    }

    #[test]
    fn test_io_error_becomes_system() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        match ConcordError::from(io) {
            ConcordError::System { severity, message } => {
                assert_eq!(severity, Severity::High);
                assert!(message.contains("disk full"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }
}
