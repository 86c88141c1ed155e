// crates/agnus/src/diff/unified.rs
// Unified-diff parsing: changed paths, added-line tracking, stats, and the
// line-number annotation handed to the LLM

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::utils::normalize_diff_path;

static HUNK_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    // @@ -oldStart[,oldLines] +newStart[,newLines] @@
    Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").expect("hunk header regex")
});

/// Diff statistics derived directly from unified text
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiffStats {
    pub files: Vec<String>,
    pub files_changed: i64,
    pub lines_added: i64,
    pub lines_removed: i64,
}

/// Strip the `a/` or `b/` prefix a unified header carries
fn strip_side_prefix(path: &str) -> &str {
    path.strip_prefix("a/")
        .or_else(|| path.strip_prefix("b/"))
        .unwrap_or(path)
}

/// Extract changed file paths by matching `--- a/…` / `+++ b/…` header pairs.
/// Deleted files (`+++ /dev/null`) report their old path.
pub fn changed_paths(diff: &str) -> Vec<String> {
    let mut paths = Vec::new();
    let mut seen = HashSet::new();
    let mut pending_old: Option<String> = None;

    for line in diff.lines() {
        if let Some(old) = line.strip_prefix("--- ") {
            pending_old = (old != "/dev/null").then(|| strip_side_prefix(old).to_string());
        } else if let Some(new) = line.strip_prefix("+++ ") {
            let path = if new == "/dev/null" {
                pending_old.take()
            } else {
                pending_old.take();
                Some(strip_side_prefix(new).to_string())
            };
            if let Some(path) = path {
                let normalized = normalize_diff_path(&path);
                if seen.insert(normalized.clone()) {
                    paths.push(normalized);
                }
            }
        }
    }

    paths
}

/// Post-state line numbers of every `+` line, per file. The final safety net
/// for inline comment placement.
pub fn added_lines_by_file(diff: &str) -> HashMap<String, BTreeSet<u32>> {
    let mut result: HashMap<String, BTreeSet<u32>> = HashMap::new();
    let mut current_file: Option<String> = None;
    let mut new_line: u32 = 0;
    let mut in_hunk = false;

    for line in diff.lines() {
        if let Some(new) = line.strip_prefix("+++ ") {
            current_file = (new != "/dev/null")
                .then(|| normalize_diff_path(strip_side_prefix(new)));
            in_hunk = false;
        } else if let Some(caps) = HUNK_HEADER.captures(line) {
            new_line = caps[3].parse().unwrap_or(1);
            in_hunk = true;
        } else if in_hunk {
            if line.starts_with('+') {
                if let Some(file) = &current_file {
                    result.entry(file.clone()).or_default().insert(new_line);
                }
                new_line += 1;
            } else if line.starts_with('-') {
                // Removed lines do not advance the post-state counter
            } else {
                new_line += 1;
            }
        }
    }

    result
}

/// Derive diff statistics from a unified diff string without re-processing
/// the files themselves.
pub fn derive_stats(diff: &str) -> DiffStats {
    let mut stats = DiffStats::default();
    let mut seen = HashSet::new();

    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            if let Some(b_part) = line.split(" b/").last()
                && seen.insert(b_part.to_string())
            {
                stats.files.push(b_part.to_string());
            }
        } else if line.starts_with('+') && !line.starts_with("+++") {
            stats.lines_added += 1;
        } else if line.starts_with('-') && !line.starts_with("---") {
            stats.lines_removed += 1;
        }
    }

    stats.files_changed = stats.files.len() as i64;
    stats
}

/// Annotate a unified diff for the LLM: every added line carries an explicit
/// `[Line N]` marker with its post-state line number, removed lines stay
/// unmarked (context only), and unchanged lines are omitted entirely.
pub fn annotate_for_llm(diff: &str) -> String {
    let mut out = String::new();
    let mut new_line: u32 = 0;
    let mut in_hunk = false;

    for line in diff.lines() {
        if line.starts_with("diff --git ") {
            in_hunk = false;
            continue;
        }
        if let Some(new) = line.strip_prefix("+++ ") {
            in_hunk = false;
            if new != "/dev/null" {
                out.push_str(&format!(
                    "\n### File: {}\n",
                    normalize_diff_path(strip_side_prefix(new))
                ));
            }
            continue;
        }
        if line.starts_with("--- ") {
            continue;
        }
        if let Some(caps) = HUNK_HEADER.captures(line) {
            new_line = caps[3].parse().unwrap_or(1);
            in_hunk = true;
            continue;
        }
        if !in_hunk {
            continue;
        }
        if let Some(content) = line.strip_prefix('+') {
            out.push_str(&format!("+ [Line {}] {}\n", new_line, content));
            new_line += 1;
        } else if let Some(content) = line.strip_prefix('-') {
            out.push_str(&format!("- {}\n", content));
        } else {
            new_line += 1;
        }
    }

    out
}
