use regex::Regex;
use std::sync::LazyLock;

use super::merge::merge_three_way;
use crate::types::{Conflict, ResolutionSuggestion, SuggestionType};

static WHITESPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("static pattern"));

fn normalize_whitespace(content: &str) -> String {
    WHITESPACE.replace_all(content.trim(), " ").into_owned()
}

fn rank(kind: SuggestionType) -> u8 {
    match kind {
        SuggestionType::AutoMerge => 0,
        SuggestionType::AcceptLocal => 1,
        SuggestionType::AcceptRemote => 2,
        SuggestionType::AcceptLatest => 3,
        SuggestionType::Manual => 4,
    }
}

/// Heuristic, stateless resolution candidates for a conflict.
pub struct SuggestionGenerator;

impl SuggestionGenerator {
    /// Suggestions sorted by confidence, highest first.
    pub fn generate(conflict: &Conflict) -> Vec<ResolutionSuggestion> {
        let local = &conflict.local;
        let remote = &conflict.remote;
        let base = conflict.base.as_deref();

        let merge = merge_three_way(base, &local.content, &remote.content);
        let total_lines = local
            .content
            .lines()
            .count()
            .max(remote.content.lines().count())
            .max(1);
        let overlap = merge.unresolved.len() as f32 / total_lines as f32;

        let mut suggestions = Vec::new();

        let (merge_confidence, merge_reasoning) = if merge.clean {
            let confidence = if base.is_some() { 0.95 } else { 0.85 };
            (
                confidence,
                "Changes from both agents touch different lines and merge without overlap"
                    .to_string(),
            )
        } else {
            (
                (0.5 * (1.0 - overlap)).clamp(0.05, 0.5),
                format!(
                    "{} of {} lines were changed by both agents and need review",
                    merge.unresolved.len(),
                    total_lines
                ),
            )
        };
        suggestions.push(ResolutionSuggestion {
            suggestion_type: SuggestionType::AutoMerge,
            confidence: merge_confidence,
            description: "Merge both versions automatically".to_string(),
            reasoning: merge_reasoning,
            preview: Some(merge.content.clone()),
        });

        let whitespace_only =
            normalize_whitespace(&local.content) == normalize_whitespace(&remote.content);
        let local_untouched = base.is_some_and(|b| b == local.content);
        let remote_untouched = base.is_some_and(|b| b == remote.content);

        let (local_confidence, local_reasoning) = if remote_untouched {
            (0.8, "Only the local agent changed the file".to_string())
        } else if local.content.contains(remote.content.as_str()) {
            (0.55, "The local version contains the remote version".to_string())
        } else {
            (0.3, format!("Keeps the changes made by {}", local.agent_id))
        };
        suggestions.push(ResolutionSuggestion {
            suggestion_type: SuggestionType::AcceptLocal,
            confidence: local_confidence,
            description: format!("Keep the version from {}", local.agent_id),
            reasoning: local_reasoning,
            preview: Some(local.content.clone()),
        });

        let (remote_confidence, remote_reasoning) = if local_untouched {
            (0.8, "Only the remote agent changed the file".to_string())
        } else if remote.content.contains(local.content.as_str()) {
            (0.55, "The remote version contains the local version".to_string())
        } else {
            (0.3, format!("Keeps the changes made by {}", remote.agent_id))
        };
        suggestions.push(ResolutionSuggestion {
            suggestion_type: SuggestionType::AcceptRemote,
            confidence: remote_confidence,
            description: format!("Keep the version from {}", remote.agent_id),
            reasoning: remote_reasoning,
            preview: Some(remote.content.clone()),
        });

        let latest = if local.timestamp > remote.timestamp {
            local
        } else {
            remote
        };
        let (latest_confidence, latest_reasoning) = if whitespace_only {
            (0.9, "The versions differ only in whitespace".to_string())
        } else {
            (
                0.4,
                format!("{} wrote the most recent version", latest.agent_id),
            )
        };
        suggestions.push(ResolutionSuggestion {
            suggestion_type: SuggestionType::AcceptLatest,
            confidence: latest_confidence,
            description: "Keep the most recent version".to_string(),
            reasoning: latest_reasoning,
            preview: Some(latest.content.clone()),
        });

        let buffer_edited = conflict.merged != local.content;
        let (manual_confidence, manual_reasoning) = if buffer_edited {
            (0.75, "The merge buffer has been edited by hand".to_string())
        } else if merge.clean {
            (0.1, "No overlapping changes to review".to_string())
        } else {
            (
                (0.2 + 0.6 * overlap).min(0.8),
                "Overlapping edits need a human decision".to_string(),
            )
        };
        suggestions.push(ResolutionSuggestion {
            suggestion_type: SuggestionType::Manual,
            confidence: manual_confidence,
            description: "Resolve by hand".to_string(),
            reasoning: manual_reasoning,
            preview: Some(conflict.merged.clone()),
        });

        suggestions.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then(rank(a.suggestion_type).cmp(&rank(b.suggestion_type)))
        });
        suggestions
    }
}
