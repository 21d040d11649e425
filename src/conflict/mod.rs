//! Conflict detection, three-way diffing, merging and resolution.

pub mod detector;
pub mod diff;
pub mod merge;
pub mod resolution;
pub mod suggestions;

pub use detector::ConflictSet;
pub use diff::{classify_lines, DiffSection, DiffStats, LineClass, ThreeWayDiff};
pub use merge::{has_markers, merge_three_way, MergeOutcome};
pub use resolution::{apply_strategy, HistoryStats, ResolutionCoordinator, ResolutionPreview};
pub use suggestions::SuggestionGenerator;

use serde::{Deserialize, Serialize};

use crate::types::Conflict;

/// An active conflict together with its line partition, as shown to
/// whoever resolves it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictView {
    #[serde(flatten)]
    pub conflict: Conflict,
    pub sections: Vec<DiffSection>,
    pub stats: DiffStats,
}

impl From<Conflict> for ConflictView {
    fn from(conflict: Conflict) -> Self {
        let diff = ThreeWayDiff::compute(
            &conflict.local.content,
            &conflict.remote.content,
            &conflict.merged,
        );
        Self {
            conflict,
            sections: diff.sections,
            stats: diff.stats,
        }
    }
}
