use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::detector::ConflictSet;
use super::merge::merge_three_way;
use crate::error::Result;
use crate::locks::FileLockTable;
use crate::storage::{HistoryStore, Workspace};
use crate::types::{
    Conflict, ConflictHistoryEntry, ConflictId, ConflictResolution, ConflictType,
    ConflictVersion, HistoryFilter, OverwriteSource, ResolutionRequest, ResolutionSpec,
};

/// Content a resolution would produce, without applying it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionPreview {
    pub content: String,
    pub source: Option<OverwriteSource>,
    pub unresolved_lines: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistoryStats {
    pub total: usize,
    pub by_strategy: BTreeMap<String, usize>,
    pub by_type: BTreeMap<String, usize>,
    pub mean_time_to_resolve_ms: Option<f64>,
}

impl HistoryStats {
    pub fn from_entries(entries: &[ConflictHistoryEntry]) -> Self {
        let mut stats = HistoryStats {
            total: entries.len(),
            ..Default::default()
        };
        for entry in entries {
            *stats
                .by_strategy
                .entry(entry.resolution.strategy.as_str().to_string())
                .or_default() += 1;
            *stats
                .by_type
                .entry(entry.conflict.conflict_type.as_str().to_string())
                .or_default() += 1;
        }
        if !entries.is_empty() {
            let total_ms: i64 = entries.iter().map(|e| e.time_to_resolve_ms).sum();
            stats.mean_time_to_resolve_ms = Some(total_ms as f64 / entries.len() as f64);
        }
        stats
    }
}

/// Compute the outcome of `spec` applied to `conflict`. Pure.
pub fn apply_strategy(conflict: &Conflict, spec: &ResolutionSpec) -> ResolutionPreview {
    match spec {
        ResolutionSpec::Manual { content, .. } => ResolutionPreview {
            content: content.clone(),
            source: None,
            unresolved_lines: Vec::new(),
        },
        ResolutionSpec::AutoMerge { .. } => {
            let outcome = merge_three_way(
                conflict.base.as_deref(),
                &conflict.local.content,
                &conflict.remote.content,
            );
            ResolutionPreview {
                content: outcome.content,
                source: None,
                unresolved_lines: outcome.unresolved,
            }
        }
        ResolutionSpec::Overwrite { source, .. } => {
            let chosen = match source {
                OverwriteSource::Local => &conflict.local,
                OverwriteSource::Remote => &conflict.remote,
                OverwriteSource::Latest => {
                    if conflict.local.timestamp > conflict.remote.timestamp {
                        &conflict.local
                    } else {
                        &conflict.remote
                    }
                }
            };
            ResolutionPreview {
                content: chosen.content.clone(),
                source: Some(*source),
                unresolved_lines: Vec::new(),
            }
        }
    }
}

pub struct ResolutionCoordinator {
    conflicts: Arc<ConflictSet>,
    workspace: Arc<Workspace>,
    history: Arc<dyn HistoryStore>,
    locks: Arc<FileLockTable>,
}

impl ResolutionCoordinator {
    pub fn new(
        conflicts: Arc<ConflictSet>,
        workspace: Arc<Workspace>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<FileLockTable>,
    ) -> Self {
        Self {
            conflicts,
            workspace,
            history,
            locks,
        }
    }

    pub fn conflicts(&self) -> &Arc<ConflictSet> {
        &self.conflicts
    }

    pub fn preview(&self, id: ConflictId, spec: &ResolutionSpec) -> Result<ResolutionPreview> {
        let conflict = self.conflicts.get(id)?;
        Ok(apply_strategy(&conflict, spec))
    }

    pub async fn resolve_request(
        &self,
        id: ConflictId,
        request: ResolutionRequest,
    ) -> Result<ConflictHistoryEntry> {
        let spec = ResolutionSpec::try_from(request)?;
        self.resolve(id, spec).await
    }

    /// Apply `spec`, write the result, record it in history and release the
    /// involved agents' locks on the file.
    ///
    /// The conflict leaves the active set before any work starts, so a
    /// concurrent call for the same id gets `NotFound`. If the write or the
    /// history append fails the conflict is put back.
    pub async fn resolve(&self, id: ConflictId, spec: ResolutionSpec) -> Result<ConflictHistoryEntry> {
        let mut conflict = self.conflicts.take(id)?;
        let applied = apply_strategy(&conflict, &spec);
        let resolved_by = spec.resolved_by();

        {
            let _guard = self.workspace.lock_path(&conflict.file_path).await;
            if let Err(e) = self
                .workspace
                .write(&conflict.file_path, &applied.content, &resolved_by)
                .await
            {
                self.conflicts.restore(conflict);
                return Err(e);
            }
        }

        conflict.resolved = true;
        let entry = ConflictHistoryEntry::new(
            &conflict,
            ConflictResolution {
                strategy: spec.strategy(),
                resolved_by,
                resolved_at: Utc::now(),
                content: applied.content.clone(),
                source: applied.source,
                unresolved_lines: applied.unresolved_lines.clone(),
            },
        );

        if let Err(e) = self.history.append(&entry).await {
            conflict.resolved = false;
            self.conflicts.restore(conflict);
            return Err(e);
        }

        for agent in &conflict.involved_agents {
            self.locks.release(&conflict.file_path, agent);
        }

        log::info!(
            "Resolved conflict {} on {} with {} ({} ms)",
            conflict.id,
            conflict.file_path,
            entry.resolution.strategy,
            entry.time_to_resolve_ms
        );

        if !applied.unresolved_lines.is_empty() {
            let mut follow_up = Conflict::new(
                &conflict.file_path,
                ConflictType::MergeConflict,
                ConflictVersion::new(&conflict.local.agent_id, &conflict.local.content)
                    .at(conflict.local.timestamp),
                ConflictVersion::new(&conflict.remote.agent_id, &conflict.remote.content)
                    .at(conflict.remote.timestamp),
                conflict.base.clone(),
            );
            follow_up.merged = applied.content;
            self.conflicts.open(follow_up);
        }

        Ok(entry)
    }

    pub async fn history(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>> {
        self.history.list(filter).await
    }

    pub async fn history_stats(&self) -> Result<HistoryStats> {
        let entries = self.history.list(&HistoryFilter::default()).await?;
        Ok(HistoryStats::from_entries(&entries))
    }
}
