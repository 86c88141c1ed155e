// crates/agnus/src/diff/mod.rs
// Diff types shared by the local diff engine and host-provided diffs

pub mod myers;
pub mod unified;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Origin of a single diff line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineOrigin {
    Context,
    Added,
    Removed,
}

/// One line inside a hunk with its pre/post-state line numbers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffLine {
    pub origin: LineOrigin,
    pub content: String,
    pub old_line: Option<u32>,
    pub new_line: Option<u32>,
}

/// A contiguous change region with context lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hunk {
    pub old_start: u32,
    pub old_lines: u32,
    pub new_start: u32,
    pub new_lines: u32,
    pub lines: Vec<DiffLine>,
}

impl Hunk {
    /// Standard unified hunk header
    pub fn header(&self) -> String {
        format!(
            "@@ -{},{} +{},{} @@",
            self.old_start, self.old_lines, self.new_start, self.new_lines
        )
    }
}

/// Change status of a file within a pull request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Added,
    Modified,
    Deleted,
    Renamed,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Deleted => "deleted",
            Self::Renamed => "renamed",
        };
        write!(f, "{}", s)
    }
}

/// Diff of a single file, either host-provided or locally computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<String>,
    pub status: FileStatus,
    pub additions: u32,
    pub deletions: u32,
    pub hunks: Vec<Hunk>,
}

impl FileDiff {
    /// Render this diff back to unified text so host diffs and locally
    /// computed diffs flow through a single pipeline.
    pub fn to_unified(&self) -> String {
        let old_name = self.old_path.as_deref().unwrap_or(&self.path);
        let mut out = String::new();
        out.push_str(&format!("diff --git a/{} b/{}\n", old_name, self.path));
        match self.status {
            FileStatus::Added => out.push_str(&format!("--- /dev/null\n+++ b/{}\n", self.path)),
            FileStatus::Deleted => out.push_str(&format!("--- a/{}\n+++ /dev/null\n", old_name)),
            _ => out.push_str(&format!("--- a/{}\n+++ b/{}\n", old_name, self.path)),
        }
        for hunk in &self.hunks {
            out.push_str(&hunk.header());
            out.push('\n');
            for line in &hunk.lines {
                let prefix = match line.origin {
                    LineOrigin::Context => ' ',
                    LineOrigin::Added => '+',
                    LineOrigin::Removed => '-',
                };
                out.push(prefix);
                out.push_str(&line.content);
                out.push('\n');
            }
        }
        out
    }
}

/// Render a set of file diffs as one unified diff document
pub fn render_unified(diffs: &[FileDiff]) -> String {
    diffs.iter().map(|d| d.to_unified()).collect()
}
