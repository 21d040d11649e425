use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineClass {
    Unchanged,
    Change,
    Conflict,
}

/// Classify each line index of the three buffers. Indices past the end of a
/// buffer compare as absent, so a line present on one side only is a
/// conflict.
pub fn classify_lines(local: &[&str], remote: &[&str], merged: &[&str]) -> Vec<LineClass> {
    let len = local.len().max(remote.len()).max(merged.len());

    (0..len)
        .map(|i| {
            let l = local.get(i);
            let r = remote.get(i);
            let m = merged.get(i);
            if l != r {
                LineClass::Conflict
            } else if m != l {
                LineClass::Change
            } else {
                LineClass::Unchanged
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffSection {
    pub kind: LineClass,
    /// First line index covered by the section.
    pub start_line: usize,
    /// One past the last line index.
    pub end_line: usize,
    pub local_lines: Vec<String>,
    pub remote_lines: Vec<String>,
    pub merged_lines: Vec<String>,
}

impl DiffSection {
    pub fn len(&self) -> usize {
        self.end_line - self.start_line
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiffStats {
    pub total_lines: usize,
    pub unchanged_lines: usize,
    pub changed_lines: usize,
    pub conflicting_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreeWayDiff {
    pub sections: Vec<DiffSection>,
    pub stats: DiffStats,
}

impl ThreeWayDiff {
    pub fn compute(local: &str, remote: &str, merged: &str) -> Self {
        let local: Vec<&str> = local.lines().collect();
        let remote: Vec<&str> = remote.lines().collect();
        let merged: Vec<&str> = merged.lines().collect();

        let classes = classify_lines(&local, &remote, &merged);
        let mut stats = DiffStats {
            total_lines: classes.len(),
            ..Default::default()
        };
        for class in &classes {
            match class {
                LineClass::Unchanged => stats.unchanged_lines += 1,
                LineClass::Change => stats.changed_lines += 1,
                LineClass::Conflict => stats.conflicting_lines += 1,
            }
        }

        let slice = |lines: &[&str], start: usize, end: usize| -> Vec<String> {
            lines
                .iter()
                .skip(start)
                .take(end - start)
                .map(|l| l.to_string())
                .collect()
        };

        let mut sections = Vec::new();
        let mut start = 0;
        while start < classes.len() {
            let kind = classes[start];
            let end = classes[start..]
                .iter()
                .position(|c| *c != kind)
                .map_or(classes.len(), |offset| start + offset);

            sections.push(DiffSection {
                kind,
                start_line: start,
                end_line: end,
                local_lines: slice(&local, start, end),
                remote_lines: slice(&remote, start, end),
                merged_lines: slice(&merged, start, end),
            });
            start = end;
        }

        Self { sections, stats }
    }

    pub fn has_conflicts(&self) -> bool {
        self.stats.conflicting_lines > 0
    }

    pub fn conflicting_sections(&self) -> impl Iterator<Item = &DiffSection> {
        self.sections
            .iter()
            .filter(|s| s.kind == LineClass::Conflict)
    }
}
