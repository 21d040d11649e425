use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::writeback::{Baseline, WriteBack, WriteOutcome};
use crate::agents::Agent;
use crate::capabilities::TaskContext;
use crate::conflict::{
    ConflictSet, ConflictView, HistoryStats, ResolutionCoordinator, ResolutionPreview,
    SuggestionGenerator,
};
use crate::error::{ConcordError, ResourceKind, Result, Severity};
use crate::lifecycle::AgentLifecycleManager;
use crate::locks::FileLockTable;
use crate::registry::AgentRegistry;
use crate::storage::{FileSnapshot, HistoryStore, Workspace};
use crate::types::{
    AgentId, Conflict, ConflictHistoryEntry, ConflictId, FileLock, HistoryFilter, LockType,
    ResolutionRequest, ResolutionSpec, ResolutionSuggestion, Task, TaskId, TaskResult,
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskReport {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub result: TaskResult,
    pub written: Vec<String>,
    pub conflicts: Vec<Conflict>,
    /// Write-back failures; the task result itself is unaffected.
    pub errors: Vec<String>,
}

#[derive(Debug)]
pub struct TaskTicket {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    pub handle: JoinHandle<TaskReport>,
}

impl TaskTicket {
    pub async fn wait(self) -> Result<TaskReport> {
        self.handle.await.map_err(|e| {
            ConcordError::system(
                Severity::High,
                format!("task {} did not complete: {}", self.task_id, e),
            )
        })
    }
}

/// Ties the registry, lock table, workspace and conflict machinery together:
/// routes tasks to agents, writes their edits back and exposes the conflict
/// surface.
pub struct Orchestrator {
    lifecycle: Arc<AgentLifecycleManager>,
    writeback: WriteBack,
    resolver: ResolutionCoordinator,
}

impl Orchestrator {
    pub fn new(
        lifecycle: Arc<AgentLifecycleManager>,
        workspace: Arc<Workspace>,
        history: Arc<dyn HistoryStore>,
        locks: Arc<FileLockTable>,
    ) -> Self {
        let conflicts = Arc::new(ConflictSet::new());
        let resolver = ResolutionCoordinator::new(
            conflicts.clone(),
            workspace.clone(),
            history,
            locks.clone(),
        );

        Self {
            lifecycle,
            writeback: WriteBack {
                workspace,
                locks,
                conflicts,
            },
            resolver,
        }
    }

    pub fn registry(&self) -> &Arc<AgentRegistry> {
        self.lifecycle.registry()
    }

    pub fn lifecycle(&self) -> &Arc<AgentLifecycleManager> {
        &self.lifecycle
    }

    pub fn locks(&self) -> &Arc<FileLockTable> {
        &self.writeback.locks
    }

    pub fn workspace(&self) -> &Arc<Workspace> {
        &self.writeback.workspace
    }

    /// Pick an agent for `task`, lock its files and start it. The returned
    /// ticket resolves once the agent finished and its edits were written
    /// back.
    pub async fn dispatch(&self, task: Task) -> Result<TaskTicket> {
        let agent = self
            .registry()
            .find_best(&task.requirements, task.preferred_type.as_ref())
            .ok_or_else(|| {
                ConcordError::not_found(ResourceKind::CapableAgent, task.requirements.join(", "))
            })?;
        let agent_id = agent.id().to_string();

        self.lock_task_files(&task, &agent_id).await?;

        let mut snapshots = HashMap::new();
        for path in &task.files {
            match self.workspace().snapshot(path).await {
                Ok(snapshot) => {
                    snapshots.insert(path.clone(), snapshot);
                }
                Err(e) => {
                    self.release_paths(&task.files, &agent_id, &HashSet::new());
                    return Err(e);
                }
            }
        }

        log::info!("Dispatching task {} to {}", task.id, agent_id);

        let task_id = task.id.clone();
        let writeback = self.writeback.clone();
        let owner = agent_id.clone();
        let handle = tokio::spawn(async move {
            run_and_write_back(agent, owner, task, snapshots, writeback).await
        });

        Ok(TaskTicket {
            task_id,
            agent_id,
            handle,
        })
    }

    pub async fn run_task(&self, task: Task) -> Result<TaskReport> {
        self.dispatch(task).await?.wait().await
    }

    async fn lock_task_files(&self, task: &Task, agent_id: &str) -> Result<()> {
        if task.files.is_empty() {
            return Ok(());
        }

        let wait_ms = self.locks().config().lock_wait_ms;
        if wait_ms == 0 {
            return self
                .locks()
                .acquire_all(&task.files, LockType::Write, agent_id, None)
                .map(|_| ());
        }

        let wait = Duration::from_millis(wait_ms);
        let mut acquired = Vec::new();
        for path in &task.files {
            match self
                .locks()
                .acquire_with_wait(path, LockType::Write, agent_id, None, wait)
                .await
            {
                Ok(_) => acquired.push(path.clone()),
                Err(e) => {
                    self.release_paths(&acquired, agent_id, &HashSet::new());
                    if let ConcordError::LockContention { holder, .. } = &e {
                        self.writeback.lock_timed_out(agent_id, path, holder).await?;
                    }
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    fn release_paths(&self, paths: &[String], owner: &str, keep: &HashSet<String>) {
        release_paths(&self.writeback.locks, paths, owner, keep);
    }

    /// Write a single edit outside of a task. If another agent holds the
    /// file's lock, or wrote it since `expected_revision`, a conflict is
    /// opened instead.
    pub async fn propose_edit(
        &self,
        agent_id: &str,
        path: &str,
        content: &str,
        expected_revision: Option<u64>,
    ) -> Result<WriteOutcome> {
        let baseline = Baseline {
            revision: expected_revision,
            content: None,
            since: Utc::now(),
        };
        self.writeback.propose(agent_id, path, content, &baseline).await
    }

    pub fn active_conflicts(&self) -> Vec<ConflictView> {
        self.writeback
            .conflicts
            .active()
            .into_iter()
            .map(ConflictView::from)
            .collect()
    }

    pub fn get_conflict(&self, id: ConflictId) -> Result<ConflictView> {
        self.writeback.conflicts.get(id).map(ConflictView::from)
    }

    pub async fn history(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>> {
        self.resolver.history(filter).await
    }

    pub async fn history_stats(&self) -> Result<HistoryStats> {
        self.resolver.history_stats().await
    }

    pub async fn resolve(
        &self,
        id: ConflictId,
        request: ResolutionRequest,
    ) -> Result<ConflictHistoryEntry> {
        self.resolver.resolve_request(id, request).await
    }

    pub async fn resolve_with(
        &self,
        id: ConflictId,
        spec: ResolutionSpec,
    ) -> Result<ConflictHistoryEntry> {
        self.resolver.resolve(id, spec).await
    }

    pub fn preview(&self, id: ConflictId, request: ResolutionRequest) -> Result<ResolutionPreview> {
        let spec = ResolutionSpec::try_from(request)?;
        self.resolver.preview(id, &spec)
    }

    pub fn update_merged(&self, id: ConflictId, content: &str) -> Result<ConflictView> {
        self.writeback
            .conflicts
            .update_merged(id, content)
            .map(ConflictView::from)
    }

    pub fn suggestions(&self, id: ConflictId) -> Result<Vec<ResolutionSuggestion>> {
        let conflict = self.writeback.conflicts.get(id)?;
        Ok(SuggestionGenerator::generate(&conflict))
    }

    pub fn active_locks(&self) -> Vec<FileLock> {
        self.locks().active_locks()
    }
}

fn release_paths(locks: &FileLockTable, paths: &[String], owner: &str, keep: &HashSet<String>) {
    for path in paths.iter().filter(|p| !keep.contains(*p)) {
        locks.release(path, owner);
    }
}

async fn run_and_write_back(
    agent: Arc<dyn Agent>,
    agent_id: AgentId,
    task: Task,
    snapshots: HashMap<String, FileSnapshot>,
    writeback: WriteBack,
) -> TaskReport {
    let started_at = Utc::now();
    let context = TaskContext {
        agent_id: agent_id.clone(),
        files: snapshots
            .iter()
            .map(|(path, s)| (path.clone(), s.content.clone()))
            .collect(),
    };

    let result = agent.execute(&task, context).await;

    let mut report = TaskReport {
        task_id: task.id.clone(),
        agent_id: agent_id.clone(),
        result,
        written: Vec::new(),
        conflicts: Vec::new(),
        errors: Vec::new(),
    };

    if report.result.success {
        for edit in &report.result.files_modified {
            let baseline = match snapshots.get(&edit.path) {
                Some(snapshot) => Baseline::from_snapshot(snapshot, started_at),
                None => Baseline::since(started_at),
            };
            match writeback
                .apply(&agent_id, &edit.path, &edit.content, &baseline)
                .await
            {
                Ok(WriteOutcome::Written { .. }) => report.written.push(edit.path.clone()),
                Ok(WriteOutcome::Unchanged) => {}
                Ok(WriteOutcome::Conflicted { conflict }) => report.conflicts.push(conflict),
                Err(e) => {
                    log::warn!("Write-back of {} for task {} failed: {}", edit.path, task.id, e);
                    report.errors.push(format!("{}: {}", edit.path, e));
                }
            }
        }
    } else {
        log::warn!(
            "Task {} failed on {}: {}",
            task.id,
            agent_id,
            report.result.error.as_deref().unwrap_or("unknown error")
        );
    }

    // locks on conflicted files stay until the conflict is resolved
    let conflicted: HashSet<String> = report
        .conflicts
        .iter()
        .map(|c| c.file_path.clone())
        .collect();
    release_paths(&writeback.locks, &task.files, &agent_id, &conflicted);

    report
}
