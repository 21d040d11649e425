use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::conflict::ConflictSet;
use crate::error::Result;
use crate::locks::FileLockTable;
use crate::storage::{FileRevision, FileSnapshot, Workspace};
use crate::types::{Conflict, ConflictType, ConflictVersion};

/// What the writer last saw of a file.
#[derive(Debug, Clone)]
pub struct Baseline {
    /// Revision observed when work started; `None` when the file was not
    /// snapshotted, in which case any foreign write after `since` counts.
    pub revision: Option<u64>,
    pub content: Option<String>,
    pub since: DateTime<Utc>,
}

impl Baseline {
    pub fn from_snapshot(snapshot: &FileSnapshot, since: DateTime<Utc>) -> Self {
        Self {
            revision: Some(snapshot.revision.revision),
            content: snapshot.content.clone(),
            since,
        }
    }

    pub fn since(since: DateTime<Utc>) -> Self {
        Self {
            revision: None,
            content: None,
            since,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WriteOutcome {
    Written { revision: FileRevision },
    /// Someone else already wrote identical content.
    Unchanged,
    Conflicted { conflict: Conflict },
}

/// Checks for divergence and writes a single edit back to the workspace.
#[derive(Clone)]
pub struct WriteBack {
    pub workspace: Arc<Workspace>,
    pub locks: Arc<FileLockTable>,
    pub conflicts: Arc<ConflictSet>,
}

impl WriteBack {
    pub async fn apply(
        &self,
        writer: &str,
        path: &str,
        content: &str,
        baseline: &Baseline,
    ) -> Result<WriteOutcome> {
        let _guard = self.workspace.lock_path(path).await;
        self.write_guarded(writer, path, content, baseline).await
    }

    /// Like `apply`, but an exclusive lock held by anyone else turns the
    /// edit into a conflict. The holder is checked under the path guard.
    pub async fn propose(
        &self,
        writer: &str,
        path: &str,
        content: &str,
        baseline: &Baseline,
    ) -> Result<WriteOutcome> {
        let _guard = self.workspace.lock_path(path).await;

        let holder = self
            .locks
            .locks_for(path)
            .into_iter()
            .find(|l| l.owner != writer && !l.lock_type.is_shared());
        if let Some(lock) = holder {
            return self.contended(writer, path, content, &lock.owner).await;
        }

        self.write_guarded(writer, path, content, baseline).await
    }

    async fn write_guarded(
        &self,
        writer: &str,
        path: &str,
        content: &str,
        baseline: &Baseline,
    ) -> Result<WriteOutcome> {
        let current = self.workspace.revision(path);
        let foreign = current.last_writer.as_deref().is_some_and(|w| w != writer);
        let moved = match baseline.revision {
            Some(revision) => current.revision != revision,
            None => current.written_at.is_some_and(|at| at > baseline.since),
        };

        if foreign && moved {
            let on_disk = self.workspace.read(path).await?.unwrap_or_default();
            let holder = current.last_writer.clone().unwrap_or_default();
            let local = ConflictVersion::new(holder, on_disk)
                .at(current.written_at.unwrap_or(baseline.since));
            let remote = ConflictVersion::new(writer, content);

            return Ok(
                match self.conflicts.detect(
                    path,
                    ConflictType::ConcurrentModification,
                    local,
                    remote,
                    baseline.content.clone(),
                ) {
                    Some(conflict) => WriteOutcome::Conflicted { conflict },
                    None => WriteOutcome::Unchanged,
                },
            );
        }

        let revision = self.workspace.write(path, content, writer).await?;
        log::debug!("{} wrote {} (revision {})", writer, path, revision.revision);
        Ok(WriteOutcome::Written { revision })
    }

    /// An edit attempted while another agent holds the file's lock.
    pub async fn contended(&self, writer: &str, path: &str, content: &str, holder: &str) -> Result<WriteOutcome> {
        let on_disk = self.workspace.read(path).await?.unwrap_or_default();
        let local = ConflictVersion::new(holder, on_disk.clone());
        let remote = ConflictVersion::new(writer, content);

        Ok(
            match self.conflicts.detect(
                path,
                ConflictType::ConcurrentModification,
                local,
                remote,
                Some(on_disk),
            ) {
                Some(conflict) => WriteOutcome::Conflicted { conflict },
                None => WriteOutcome::Unchanged,
            },
        )
    }

    /// Record that `waiter` gave up waiting for `holder`'s lock on `path`.
    pub async fn lock_timed_out(&self, waiter: &str, path: &str, holder: &str) -> Result<Conflict> {
        let on_disk = self.workspace.read(path).await?.unwrap_or_default();
        Ok(self.conflicts.open(Conflict::new(
            path,
            ConflictType::LockTimeout,
            ConflictVersion::new(holder, on_disk.clone()),
            ConflictVersion::new(waiter, on_disk.clone()),
            Some(on_disk),
        )))
    }
}
