use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::{AgentId, ConflictId};
use crate::error::{ConcordError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictType {
    ConcurrentModification,
    LockTimeout,
    MergeConflict,
}

impl ConflictType {
    pub fn as_str(&self) -> &str {
        match self {
            ConflictType::ConcurrentModification => "concurrent_modification",
            ConflictType::LockTimeout => "lock_timeout",
            ConflictType::MergeConflict => "merge_conflict",
        }
    }
}

/// One side of a conflict: who produced the content and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictVersion {
    pub agent_id: AgentId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl ConflictVersion {
    pub fn new(agent_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn at(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub id: ConflictId,
    pub file_path: String,
    pub conflict_type: ConflictType,
    pub involved_agents: Vec<AgentId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub resolved: bool,
    pub local: ConflictVersion,
    pub remote: ConflictVersion,
    /// Common ancestor, when the detector knew what both sides started from.
    pub base: Option<String>,
    /// Working merge buffer edited by whoever is resolving the conflict.
    pub merged: String,
}

impl Conflict {
    pub fn new(
        file_path: impl Into<String>,
        conflict_type: ConflictType,
        local: ConflictVersion,
        remote: ConflictVersion,
        base: Option<String>,
    ) -> Self {
        let file_path = file_path.into();
        let mut involved_agents = vec![local.agent_id.clone()];
        if remote.agent_id != local.agent_id {
            involved_agents.push(remote.agent_id.clone());
        }
        let description = match conflict_type {
            ConflictType::ConcurrentModification => format!(
                "{} and {} modified {} concurrently",
                local.agent_id, remote.agent_id, file_path
            ),
            ConflictType::LockTimeout => format!(
                "{} timed out waiting for the lock on {} held by {}",
                remote.agent_id, file_path, local.agent_id
            ),
            ConflictType::MergeConflict => format!(
                "automatic merge of {} left overlapping changes from {} and {}",
                file_path, local.agent_id, remote.agent_id
            ),
        };

        Self {
            id: ConflictId::new_v4(),
            file_path,
            conflict_type,
            involved_agents,
            description,
            created_at: Utc::now(),
            resolved: false,
            merged: local.content.clone(),
            local,
            remote,
            base,
        }
    }

    pub fn involves(&self, agent_id: &str) -> bool {
        self.involved_agents.iter().any(|a| a == agent_id)
    }

    pub fn summary(&self) -> ConflictSummary {
        ConflictSummary {
            id: self.id,
            file_path: self.file_path.clone(),
            conflict_type: self.conflict_type,
            involved_agents: self.involved_agents.clone(),
            description: self.description.clone(),
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Manual,
    AutoMerge,
    Overwrite,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &str {
        match self {
            ResolutionStrategy::Manual => "manual",
            ResolutionStrategy::AutoMerge => "auto_merge",
            ResolutionStrategy::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for ResolutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolutionStrategy {
    type Err = ConcordError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "manual" => Ok(ResolutionStrategy::Manual),
            "auto_merge" => Ok(ResolutionStrategy::AutoMerge),
            "overwrite" => Ok(ResolutionStrategy::Overwrite),
            other => Err(ConcordError::UnknownStrategy(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverwriteSource {
    Local,
    Remote,
    Latest,
}

impl FromStr for OverwriteSource {
    type Err = ConcordError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(OverwriteSource::Local),
            "remote" => Ok(OverwriteSource::Remote),
            "latest" | "latest-timestamp" | "latest_timestamp" => Ok(OverwriteSource::Latest),
            other => Err(ConcordError::validation(format!(
                "unknown overwrite source: {}",
                other
            ))),
        }
    }
}

/// A validated resolution request.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionSpec {
    Manual {
        content: String,
        resolved_by: Option<String>,
    },
    AutoMerge {
        resolved_by: Option<String>,
    },
    Overwrite {
        source: OverwriteSource,
        resolved_by: Option<String>,
    },
}

impl ResolutionSpec {
    pub fn manual(content: impl Into<String>) -> Self {
        ResolutionSpec::Manual {
            content: content.into(),
            resolved_by: None,
        }
    }

    pub fn auto_merge() -> Self {
        ResolutionSpec::AutoMerge { resolved_by: None }
    }

    pub fn overwrite(source: OverwriteSource) -> Self {
        ResolutionSpec::Overwrite {
            source,
            resolved_by: None,
        }
    }

    pub fn by(self, actor: impl Into<String>) -> Self {
        let actor = Some(actor.into());
        match self {
            ResolutionSpec::Manual { content, .. } => ResolutionSpec::Manual {
                content,
                resolved_by: actor,
            },
            ResolutionSpec::AutoMerge { .. } => ResolutionSpec::AutoMerge { resolved_by: actor },
            ResolutionSpec::Overwrite { source, .. } => ResolutionSpec::Overwrite {
                source,
                resolved_by: actor,
            },
        }
    }

    pub fn strategy(&self) -> ResolutionStrategy {
        match self {
            ResolutionSpec::Manual { .. } => ResolutionStrategy::Manual,
            ResolutionSpec::AutoMerge { .. } => ResolutionStrategy::AutoMerge,
            ResolutionSpec::Overwrite { .. } => ResolutionStrategy::Overwrite,
        }
    }

    pub fn resolved_by(&self) -> String {
        let explicit = match self {
            ResolutionSpec::Manual { resolved_by, .. }
            | ResolutionSpec::AutoMerge { resolved_by }
            | ResolutionSpec::Overwrite { resolved_by, .. } => resolved_by.clone(),
        };
        explicit.unwrap_or_else(|| match self {
            ResolutionSpec::AutoMerge { .. } => "system".to_string(),
            _ => "user".to_string(),
        })
    }
}

/// Wire form of a resolution request, as sent by a presentation layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResolutionRequest {
    pub strategy: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub resolved_by: Option<String>,
}

impl TryFrom<ResolutionRequest> for ResolutionSpec {
    type Error = ConcordError;

    fn try_from(request: ResolutionRequest) -> Result<Self> {
        let resolved_by = request.resolved_by;
        match request.strategy.parse::<ResolutionStrategy>()? {
            ResolutionStrategy::Manual => {
                let content = request.content.ok_or_else(|| {
                    ConcordError::validation("manual resolution requires content")
                })?;
                Ok(ResolutionSpec::Manual {
                    content,
                    resolved_by,
                })
            }
            ResolutionStrategy::AutoMerge => Ok(ResolutionSpec::AutoMerge { resolved_by }),
            ResolutionStrategy::Overwrite => {
                let source = match request.source.as_deref() {
                    Some(source) => source.parse()?,
                    None => OverwriteSource::Latest,
                };
                Ok(ResolutionSpec::Overwrite {
                    source,
                    resolved_by,
                })
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictResolution {
    pub strategy: ResolutionStrategy,
    pub resolved_by: String,
    pub resolved_at: DateTime<Utc>,
    pub content: String,
    #[serde(default)]
    pub source: Option<OverwriteSource>,
    /// Line indices an automatic merge could not reconcile.
    #[serde(default)]
    pub unresolved_lines: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    pub id: ConflictId,
    pub file_path: String,
    pub conflict_type: ConflictType,
    pub involved_agents: Vec<AgentId>,
    pub description: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictHistoryEntry {
    pub id: uuid::Uuid,
    pub conflict: ConflictSummary,
    pub resolution: ConflictResolution,
    pub time_to_resolve_ms: i64,
}

impl ConflictHistoryEntry {
    pub fn new(conflict: &Conflict, resolution: ConflictResolution) -> Self {
        let time_to_resolve_ms = resolution
            .resolved_at
            .signed_duration_since(conflict.created_at)
            .num_milliseconds()
            .max(0);
        Self {
            id: uuid::Uuid::new_v4(),
            conflict: conflict.summary(),
            resolution,
            time_to_resolve_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryFilter {
    #[serde(default)]
    pub from: Option<DateTime<Utc>>,
    #[serde(default)]
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agent_ids: Vec<AgentId>,
    /// Substrings matched against the conflicted file path.
    #[serde(default)]
    pub file_patterns: Vec<String>,
    #[serde(default)]
    pub strategies: Vec<ResolutionStrategy>,
}

impl HistoryFilter {
    pub fn matches(&self, entry: &ConflictHistoryEntry) -> bool {
        let resolved_at = entry.resolution.resolved_at;
        if self.from.is_some_and(|from| resolved_at < from) {
            return false;
        }
        if self.to.is_some_and(|to| resolved_at > to) {
            return false;
        }
        if !self.agent_ids.is_empty()
            && !entry
                .conflict
                .involved_agents
                .iter()
                .any(|a| self.agent_ids.contains(a))
        {
            return false;
        }
        if !self.file_patterns.is_empty()
            && !self
                .file_patterns
                .iter()
                .any(|p| entry.conflict.file_path.contains(p.as_str()))
        {
            return false;
        }
        if !self.strategies.is_empty() && !self.strategies.contains(&entry.resolution.strategy) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionType {
    AutoMerge,
    AcceptLocal,
    AcceptRemote,
    AcceptLatest,
    Manual,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionSuggestion {
    pub suggestion_type: SuggestionType,
    pub confidence: f32,
    pub description: String,
    pub reasoning: String,
    pub preview: Option<String>,
}

impl ResolutionSuggestion {
    /// The resolution spec that would apply this suggestion, if it is automatic.
    pub fn to_spec(&self) -> Option<ResolutionSpec> {
        match self.suggestion_type {
            SuggestionType::AutoMerge => Some(ResolutionSpec::auto_merge()),
            SuggestionType::AcceptLocal => Some(ResolutionSpec::overwrite(OverwriteSource::Local)),
            SuggestionType::AcceptRemote => {
                Some(ResolutionSpec::overwrite(OverwriteSource::Remote))
            }
            SuggestionType::AcceptLatest => {
                Some(ResolutionSpec::overwrite(OverwriteSource::Latest))
            }
            SuggestionType::Manual => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_conflict() -> Conflict {
        Conflict::new(
            "/src/foo.ts",
            ConflictType::ConcurrentModification,
            ConflictVersion::new("agent-a", "const x=1;"),
            ConflictVersion::new("agent-b", "const x=2;"),
            None,
        )
    }

    fn entry_with(strategy: ResolutionStrategy, resolved_at: DateTime<Utc>) -> ConflictHistoryEntry {
        ConflictHistoryEntry::new(
            &sample_conflict(),
            ConflictResolution {
                strategy,
                resolved_by: "user".to_string(),
                resolved_at,
                content: String::new(),
                source: None,
                unresolved_lines: vec![],
            },
        )
    }

    #[test]
    fn test_new_conflict_involves_both_agents() {
        let conflict = sample_conflict();
        assert_eq!(conflict.involved_agents, vec!["agent-a", "agent-b"]);
        assert_eq!(conflict.merged, "const x=1;");
        assert!(!conflict.resolved);
        assert!(conflict.description.contains("/src/foo.ts"));
    }

    #[test]
    fn test_unknown_strategy_rejected() {
        let request = ResolutionRequest {
            strategy: "rebase".to_string(),
            ..Default::default()
        };
        match ResolutionSpec::try_from(request) {
            Err(ConcordError::UnknownStrategy(s)) => assert_eq!(s, "rebase"),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_manual_request_requires_content() {
        let request = ResolutionRequest {
            strategy: "manual".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            ResolutionSpec::try_from(request),
            Err(ConcordError::Validation(_))
        ));
    }

    #[test]
    fn test_overwrite_request_parses_source() {
        let request = ResolutionRequest {
            strategy: "overwrite".to_string(),
            source: Some("latest-timestamp".to_string()),
            ..Default::default()
        };
        let spec = ResolutionSpec::try_from(request).unwrap();
        assert_eq!(spec, ResolutionSpec::overwrite(OverwriteSource::Latest));
        assert_eq!(spec.resolved_by(), "user");
        assert_eq!(ResolutionSpec::auto_merge().resolved_by(), "system");
    }

    #[test]
    fn test_history_filter() {
        let now = Utc::now();
        let entry = entry_with(ResolutionStrategy::Overwrite, now);

        assert!(HistoryFilter::default().matches(&entry));

        let by_agent = HistoryFilter {
            agent_ids: vec!["agent-b".to_string()],
            ..Default::default()
        };
        assert!(by_agent.matches(&entry));

        let other_agent = HistoryFilter {
            agent_ids: vec!["agent-z".to_string()],
            ..Default::default()
        };
        assert!(!other_agent.matches(&entry));

        let by_file = HistoryFilter {
            file_patterns: vec!["foo".to_string()],
            strategies: vec![ResolutionStrategy::Overwrite],
            ..Default::default()
        };
        assert!(by_file.matches(&entry));

        let wrong_strategy = HistoryFilter {
            strategies: vec![ResolutionStrategy::Manual],
            ..Default::default()
        };
        assert!(!wrong_strategy.matches(&entry));

        let too_late = HistoryFilter {
            from: Some(now + Duration::minutes(1)),
            ..Default::default()
        };
        assert!(!too_late.matches(&entry));
    }
}
