use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use super::traits::{FileStore, HistoryStore};
use crate::error::Result;
use crate::types::{ConflictHistoryEntry, HistoryFilter};

#[derive(Clone, Default)]
pub struct InMemoryHistoryStore {
    entries: Arc<RwLock<Vec<ConflictHistoryEntry>>>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn append(&self, entry: &ConflictHistoryEntry) -> Result<()> {
        self.entries.write().push(entry.clone());
        Ok(())
    }

    async fn list(&self, filter: &HistoryFilter) -> Result<Vec<ConflictHistoryEntry>> {
        Ok(self
            .entries
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryFileStore {
    files: Arc<RwLock<HashMap<String, String>>>,
}

impl InMemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_files<I, P, C>(files: I) -> Self
    where
        I: IntoIterator<Item = (P, C)>,
        P: Into<String>,
        C: Into<String>,
    {
        let store = Self::new();
        {
            let mut map = store.files.write();
            for (path, content) in files {
                map.insert(path.into(), content.into());
            }
        }
        store
    }
}

#[async_trait]
impl FileStore for InMemoryFileStore {
    async fn read(&self, path: &str) -> Result<Option<String>> {
        Ok(self.files.read().get(path).cloned())
    }

    async fn write(&self, path: &str, content: &str) -> Result<()> {
        self.files
            .write()
            .insert(path.to_string(), content.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Conflict, ConflictResolution, ConflictType, ConflictVersion, ResolutionStrategy,
    };
    use chrono::Utc;

    fn entry(path: &str, strategy: ResolutionStrategy) -> ConflictHistoryEntry {
        let conflict = Conflict::new(
            path,
            ConflictType::ConcurrentModification,
            ConflictVersion::new("a", "1"),
            ConflictVersion::new("b", "2"),
            None,
        );
        ConflictHistoryEntry::new(
            &conflict,
            ConflictResolution {
                strategy,
                resolved_by: "user".to_string(),
                resolved_at: Utc::now(),
                content: "1".to_string(),
                source: None,
                unresolved_lines: vec![],
            },
        )
    }

    #[tokio::test]
    async fn test_history_filters() {
        let store = InMemoryHistoryStore::new();
        store
            .append(&entry("/src/a.rs", ResolutionStrategy::Manual))
            .await
            .unwrap();
        store
            .append(&entry("/docs/b.md", ResolutionStrategy::AutoMerge))
            .await
            .unwrap();

        let all = store.list(&HistoryFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].conflict.file_path, "/src/a.rs");

        let docs = store
            .list(&HistoryFilter {
                file_patterns: vec!["docs/".to_string()],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        let manual = store
            .list(&HistoryFilter {
                strategies: vec![ResolutionStrategy::Manual],
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(manual[0].conflict.file_path, "/src/a.rs");
    }

    #[tokio::test]
    async fn test_file_store() {
        let store = InMemoryFileStore::with_files([("/a", "x")]);
        assert_eq!(store.read("/a").await.unwrap().as_deref(), Some("x"));
        assert!(store.read("/b").await.unwrap().is_none());

        store.write("/b", "y").await.unwrap();
        assert_eq!(store.read("/b").await.unwrap().as_deref(), Some("y"));
    }
}
