use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use super::traits::FileStore;
use crate::error::Result;
use crate::types::AgentId;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileRevision {
    /// Number of writes through this workspace; 0 for untouched files.
    pub revision: u64,
    pub last_writer: Option<AgentId>,
    pub written_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub path: String,
    pub content: Option<String>,
    pub revision: FileRevision,
}

/// File store plus per-path write bookkeeping, used to notice when a file
/// changed underneath a running task.
pub struct Workspace {
    store: Arc<dyn FileStore>,
    revisions: Mutex<HashMap<String, FileRevision>>,
    path_guards: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Workspace {
    pub fn new(store: Arc<dyn FileStore>) -> Self {
        Self {
            store,
            revisions: Mutex::new(HashMap::new()),
            path_guards: Mutex::new(HashMap::new()),
        }
    }

    pub async fn read(&self, path: &str) -> Result<Option<String>> {
        self.store.read(path).await
    }

    pub fn revision(&self, path: &str) -> FileRevision {
        self.revisions.lock().get(path).cloned().unwrap_or_default()
    }

    pub async fn snapshot(&self, path: &str) -> Result<FileSnapshot> {
        let revision = self.revision(path);
        let content = self.store.read(path).await?;
        Ok(FileSnapshot {
            path: path.to_string(),
            content,
            revision,
        })
    }

    /// Serialize write-back on one path. Hold the guard across the
    /// check-then-write sequence.
    pub async fn lock_path(&self, path: &str) -> OwnedMutexGuard<()> {
        let guard = {
            let mut guards = self.path_guards.lock();
            // clones only happen under this lock, so a count of 1 means idle
            guards.retain(|_, guard| Arc::strong_count(guard) > 1);
            guards
                .entry(path.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        guard.lock_owned().await
    }

    /// Write `content` and bump the path's revision.
    pub async fn write(&self, path: &str, content: &str, writer: &str) -> Result<FileRevision> {
        self.store.write(path, content).await?;

        let mut revisions = self.revisions.lock();
        let revision = revisions.entry(path.to_string()).or_default();
        revision.revision += 1;
        revision.last_writer = Some(writer.to_string());
        revision.written_at = Some(Utc::now());
        Ok(revision.clone())
    }
}

#[cfg(test)]
impl Workspace {
    fn tracked_guards(&self) -> usize {
        self.path_guards.lock().len()
    }
}
