use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{ConcordError, Result};
use crate::types::{Conflict, ConflictId, ConflictType, ConflictVersion};

/// The set of unresolved conflicts. Removal goes through [`ConflictSet::take`]
/// so that a conflict leaves the set exactly once.
#[derive(Default)]
pub struct ConflictSet {
    active: Mutex<HashMap<ConflictId, Conflict>>,
}

impl ConflictSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, conflict: Conflict) -> Conflict {
        log::warn!(
            "Conflict {} on {}: {}",
            conflict.id,
            conflict.file_path,
            conflict.description
        );
        self.active.lock().insert(conflict.id, conflict.clone());
        conflict
    }

    /// Open a conflict if the two versions diverge. Identical content is not
    /// a conflict.
    pub fn detect(
        &self,
        path: &str,
        conflict_type: ConflictType,
        local: ConflictVersion,
        remote: ConflictVersion,
        base: Option<String>,
    ) -> Option<Conflict> {
        if local.content == remote.content {
            log::debug!(
                "{} and {} wrote identical content to {}",
                local.agent_id,
                remote.agent_id,
                path
            );
            return None;
        }
        Some(self.open(Conflict::new(path, conflict_type, local, remote, base)))
    }

    /// Active conflicts, oldest first.
    pub fn active(&self) -> Vec<Conflict> {
        let mut conflicts: Vec<Conflict> = self.active.lock().values().cloned().collect();
        conflicts.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        conflicts
    }

    pub fn get(&self, id: ConflictId) -> Result<Conflict> {
        self.active
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ConcordError::conflict_not_found(id))
    }

    /// Remove a conflict for resolution. Only one caller ever gets it.
    pub fn take(&self, id: ConflictId) -> Result<Conflict> {
        self.active
            .lock()
            .remove(&id)
            .ok_or_else(|| ConcordError::conflict_not_found(id))
    }

    /// Put back a conflict whose resolution could not be completed.
    pub fn restore(&self, conflict: Conflict) {
        log::warn!("Restoring conflict {} after a failed resolution", conflict.id);
        self.active.lock().insert(conflict.id, conflict);
    }

    pub fn update_merged(&self, id: ConflictId, content: impl Into<String>) -> Result<Conflict> {
        let mut active = self.active.lock();
        let conflict = active
            .get_mut(&id)
            .ok_or_else(|| ConcordError::conflict_not_found(id))?;
        conflict.merged = content.into();
        Ok(conflict.clone())
    }

    pub fn find_by_path(&self, path: &str) -> Vec<Conflict> {
        self.active()
            .into_iter()
            .filter(|c| c.file_path == path)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.active.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn versions() -> (ConflictVersion, ConflictVersion) {
        (
            ConflictVersion::new("a", "one"),
            ConflictVersion::new("b", "two"),
        )
    }

    #[test]
    fn test_identical_content_is_not_a_conflict() {
        let set = ConflictSet::new();
        let found = set.detect(
            "/f",
            ConflictType::ConcurrentModification,
            ConflictVersion::new("a", "same"),
            ConflictVersion::new("b", "same"),
            None,
        );
        assert!(found.is_none());
        assert!(set.is_empty());
    }

    #[test]
    fn test_detect_opens_conflict() {
        let set = ConflictSet::new();
        let (local, remote) = versions();
        let conflict = set
            .detect("/f", ConflictType::ConcurrentModification, local, remote, None)
            .unwrap();

        assert_eq!(conflict.involved_agents, vec!["a", "b"]);
        assert!(!conflict.resolved);
        assert_eq!(set.get(conflict.id).unwrap(), conflict);
        assert_eq!(set.find_by_path("/f").len(), 1);
    }

    #[test]
    fn test_take_is_exactly_once() {
        let set = ConflictSet::new();
        let (local, remote) = versions();
        let conflict = set
            .detect("/f", ConflictType::ConcurrentModification, local, remote, None)
            .unwrap();

        assert!(set.take(conflict.id).is_ok());
        assert!(set.take(conflict.id).unwrap_err().is_not_found());
        assert!(set.get(conflict.id).unwrap_err().is_not_found());
    }

    #[test]
    fn test_concurrent_take_has_one_winner() {
        let set = Arc::new(ConflictSet::new());
        let (local, remote) = versions();
        let id = set
            .detect("/f", ConflictType::ConcurrentModification, local, remote, None)
            .unwrap()
            .id;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let set = set.clone();
                std::thread::spawn(move || set.take(id).is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_update_merged() {
        let set = ConflictSet::new();
        let (local, remote) = versions();
        let conflict = set
            .detect("/f", ConflictType::ConcurrentModification, local, remote, None)
            .unwrap();
        assert_eq!(conflict.merged, "one");

        let updated = set.update_merged(conflict.id, "edited").unwrap();
        assert_eq!(updated.merged, "edited");
        assert!(set
            .update_merged(uuid::Uuid::new_v4(), "x")
            .unwrap_err()
            .is_not_found());
    }
}
