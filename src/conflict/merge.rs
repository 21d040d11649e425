use serde::{Deserialize, Serialize};

pub const LOCAL_MARKER: &str = "<<<<<<< local";
pub const SEPARATOR_MARKER: &str = "=======";
pub const REMOTE_MARKER: &str = ">>>>>>> remote";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeOutcome {
    pub content: String,
    /// Line indices (in the input numbering) that could not be merged and
    /// were left between conflict markers.
    pub unresolved: Vec<usize>,
    pub clean: bool,
}

enum Pick<'a> {
    Line(Option<&'a str>),
    Conflict(Option<&'a str>, Option<&'a str>),
}

/// Deterministic index-aligned three-way merge.
///
/// A line both sides agree on is kept. With a base, a line only one side
/// changed takes that side. Anything else is a conflict; consecutive
/// conflicting lines are emitted as one marker block.
pub fn merge_three_way(base: Option<&str>, local: &str, remote: &str) -> MergeOutcome {
    let local_lines: Vec<&str> = local.lines().collect();
    let remote_lines: Vec<&str> = remote.lines().collect();
    let base_lines: Option<Vec<&str>> = base.map(|b| b.lines().collect());

    let len = local_lines
        .len()
        .max(remote_lines.len())
        .max(base_lines.as_ref().map_or(0, Vec::len));

    let picks: Vec<Pick> = (0..len)
        .map(|i| {
            let l = local_lines.get(i).copied();
            let r = remote_lines.get(i).copied();
            if l == r {
                return Pick::Line(l);
            }
            match &base_lines {
                Some(base_lines) => {
                    let b = base_lines.get(i).copied();
                    if l == b {
                        Pick::Line(r)
                    } else if r == b {
                        Pick::Line(l)
                    } else {
                        Pick::Conflict(l, r)
                    }
                }
                None => Pick::Conflict(l, r),
            }
        })
        .collect();

    let mut out: Vec<&str> = Vec::with_capacity(len);
    let mut unresolved = Vec::new();
    let mut i = 0;
    while i < picks.len() {
        match picks[i] {
            Pick::Line(line) => {
                out.extend(line);
                i += 1;
            }
            Pick::Conflict(..) => {
                let mut ours = Vec::new();
                let mut theirs = Vec::new();
                while let Some(Pick::Conflict(l, r)) = picks.get(i) {
                    ours.extend(*l);
                    theirs.extend(*r);
                    unresolved.push(i);
                    i += 1;
                }
                out.push(LOCAL_MARKER);
                out.extend(ours);
                out.push(SEPARATOR_MARKER);
                out.extend(theirs);
                out.push(REMOTE_MARKER);
            }
        }
    }

    let mut content = out.join("\n");
    if !content.is_empty() && (local.ends_with('\n') || remote.ends_with('\n')) {
        content.push('\n');
    }

    MergeOutcome {
        clean: unresolved.is_empty(),
        content,
        unresolved,
    }
}

/// Whether `content` still carries conflict markers.
pub fn has_markers(content: &str) -> bool {
    content
        .lines()
        .any(|l| l == LOCAL_MARKER || l == SEPARATOR_MARKER || l == REMOTE_MARKER)
}
