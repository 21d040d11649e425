use async_trait::async_trait;

use crate::error::Result;
use crate::types::{ConflictHistoryEntry, HistoryFilter};

/// Append-only log of resolved conflicts.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn append(&self, entry: &ConflictHistoryEntry) -> Result<()>;

    /// Entries matching `filter`, in append order.
    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>>;
}

/// The shared file tree agents edit. Paths are workspace-relative strings
/// such as `/src/foo.ts`.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// `None` when the file does not exist.
    async fn read(&self, path: &str) -> Result<Option<String>>;

    async fn write(&self, path: &str, content: &str) -> Result<()>;
}
