// crates/agnus/src/diff/myers.rs
// Myers O(N·D) line diff with FNV-1a hash-cached equality and a bounded
// edit distance falling back to full replacement

use std::collections::HashMap;

use super::{DiffLine, FileDiff, FileStatus, Hunk, LineOrigin};

/// Context lines kept on each side of a change when building hunks
const HUNK_CONTEXT: usize = 3;

/// One step of the edit script, carrying 0-indexed line positions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edit {
    Equal { old: usize, new: usize },
    Remove { old: usize },
    Add { new: usize },
}

/// FNV-1a 32-bit hash used to make line comparisons cheap
fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c9dc5;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Line table with precomputed hashes; equality checks compare hashes first
/// and fall back to the full string on a collision.
struct Lines<'a> {
    old: &'a [&'a str],
    new: &'a [&'a str],
    old_hashes: Vec<u32>,
    new_hashes: Vec<u32>,
}

impl<'a> Lines<'a> {
    fn new(old: &'a [&'a str], new: &'a [&'a str]) -> Self {
        Self {
            old,
            new,
            old_hashes: old.iter().map(|l| fnv1a_32(l.as_bytes())).collect(),
            new_hashes: new.iter().map(|l| fnv1a_32(l.as_bytes())).collect(),
        }
    }

    fn eq(&self, old_idx: usize, new_idx: usize) -> bool {
        self.old_hashes[old_idx] == self.new_hashes[new_idx]
            && self.old[old_idx] == self.new[new_idx]
    }
}

/// Cheap lower bound on the edit distance: every line occurring more often
/// in one side than the other must be added or removed. Lets hopeless inputs
/// skip straight to the full-replacement fallback.
fn distance_lower_bound(old: &[&str], new: &[&str]) -> usize {
    let mut counts: HashMap<&str, i64> = HashMap::new();
    for line in old {
        *counts.entry(line).or_insert(0) += 1;
    }
    for line in new {
        *counts.entry(line).or_insert(0) -= 1;
    }
    counts.values().map(|c| c.unsigned_abs() as usize).sum()
}

/// Full-replacement edit script: everything removed, everything added
fn full_replacement(old_len: usize, new_len: usize) -> Vec<Edit> {
    let mut edits = Vec::with_capacity(old_len + new_len);
    for old in 0..old_len {
        edits.push(Edit::Remove { old });
    }
    for new in 0..new_len {
        edits.push(Edit::Add { new });
    }
    edits
}

/// Compute the line edit script between two snapshots.
///
/// `max_distance` bounds the actual edit distance, not the size product, so
/// a small edit in a large file is always diffed precisely; exceeding the
/// bound degrades to full replacement.
pub fn diff_lines(old: &[&str], new: &[&str], max_distance: usize) -> Vec<Edit> {
    let lines = Lines::new(old, new);

    // Trim the common prefix and suffix before running Myers
    let mut prefix = 0;
    while prefix < old.len() && prefix < new.len() && lines.eq(prefix, prefix) {
        prefix += 1;
    }
    let mut suffix = 0;
    while suffix < old.len() - prefix
        && suffix < new.len() - prefix
        && lines.eq(old.len() - 1 - suffix, new.len() - 1 - suffix)
    {
        suffix += 1;
    }

    let mid_old = old.len() - prefix - suffix;
    let mid_new = new.len() - prefix - suffix;

    let middle = if mid_old == 0 && mid_new == 0 {
        Vec::new()
    } else if distance_lower_bound(
        &old[prefix..old.len() - suffix],
        &new[prefix..new.len() - suffix],
    ) > max_distance
    {
        full_replacement(mid_old, mid_new)
    } else {
        myers(&lines, prefix, mid_old, mid_new, max_distance)
            .unwrap_or_else(|| full_replacement(mid_old, mid_new))
    };

    let mut edits = Vec::with_capacity(prefix + middle.len() + suffix);
    for i in 0..prefix {
        edits.push(Edit::Equal { old: i, new: i });
    }
    for edit in middle {
        edits.push(match edit {
            Edit::Equal { old, new } => Edit::Equal {
                old: old + prefix,
                new: new + prefix,
            },
            Edit::Remove { old } => Edit::Remove { old: old + prefix },
            Edit::Add { new } => Edit::Add { new: new + prefix },
        });
    }
    for i in 0..suffix {
        edits.push(Edit::Equal {
            old: old.len() - suffix + i,
            new: new.len() - suffix + i,
        });
    }
    edits
}

/// Greedy forward Myers over the trimmed middle region. Returns None when
/// the edit distance exceeds `max_distance`.
fn myers(lines: &Lines, offset: usize, n: usize, m: usize, max_distance: usize) -> Option<Vec<Edit>> {
    let bound = (n + m).min(max_distance);
    if bound == 0 {
        // Non-empty middle with a zero distance budget cannot make progress
        return None;
    }
    let width = 2 * bound + 1;
    let koff = bound as isize;

    let eq = |x: usize, y: usize| lines.eq(offset + x, offset + y);

    // v[k + koff] = furthest x on diagonal k; per-depth snapshots drive the
    // backtrack
    let mut v: Vec<i32> = vec![0; width];
    let mut trace: Vec<Vec<i32>> = Vec::new();

    for d in 0..=bound as isize {
        trace.push(v.clone());
        let mut k = -d;
        while k <= d {
            let idx = (k + koff) as usize;
            let mut x = if k == -d || (k != d && v[idx - 1] < v[idx + 1]) {
                v[idx + 1] as usize
            } else {
                v[idx - 1] as usize + 1
            };
            let mut y = (x as isize - k) as usize;
            while x < n && y < m && eq(x, y) {
                x += 1;
                y += 1;
            }
            v[idx] = x as i32;
            if x >= n && y >= m {
                return Some(backtrack(&trace, d, koff, n, m));
            }
            k += 2;
        }
    }

    None
}

/// Walk the trace backwards from (n, m) reconstructing the edit script
fn backtrack(trace: &[Vec<i32>], depth: isize, koff: isize, n: usize, m: usize) -> Vec<Edit> {
    let mut edits: Vec<Edit> = Vec::new();
    let mut x = n as isize;
    let mut y = m as isize;

    for d in (1..=depth).rev() {
        let v = &trace[d as usize];
        let k = x - y;
        let prev_k = if k == -d || (k != d && v[(k - 1 + koff) as usize] < v[(k + 1 + koff) as usize])
        {
            k + 1
        } else {
            k - 1
        };
        let prev_x = v[(prev_k + koff) as usize] as isize;
        let prev_y = prev_x - prev_k;

        while x > prev_x && y > prev_y {
            x -= 1;
            y -= 1;
            edits.push(Edit::Equal {
                old: x as usize,
                new: y as usize,
            });
        }
        if x == prev_x {
            y -= 1;
            edits.push(Edit::Add { new: y as usize });
        } else {
            x -= 1;
            edits.push(Edit::Remove { old: x as usize });
        }
    }

    while x > 0 && y > 0 {
        x -= 1;
        y -= 1;
        edits.push(Edit::Equal {
            old: x as usize,
            new: y as usize,
        });
    }

    edits.reverse();
    edits
}

/// Apply an edit script to the old snapshot (test oracle: must equal new)
pub fn apply_edits(old: &[&str], new: &[&str], edits: &[Edit]) -> Vec<String> {
    let mut out = Vec::new();
    for edit in edits {
        match edit {
            Edit::Equal { old: i, .. } => out.push(old[*i].to_string()),
            Edit::Add { new: j } => out.push(new[*j].to_string()),
            Edit::Remove { .. } => {}
        }
    }
    out
}

/// Group an edit script into hunks with fixed leading/trailing context,
/// merging hunks whose context windows would overlap.
pub fn build_hunks(old: &[&str], new: &[&str], edits: &[Edit]) -> Vec<Hunk> {
    if edits.iter().all(|e| matches!(e, Edit::Equal { .. })) {
        return Vec::new();
    }

    // Script positions of non-equal edits
    let change_positions: Vec<usize> = edits
        .iter()
        .enumerate()
        .filter(|(_, e)| !matches!(e, Edit::Equal { .. }))
        .map(|(i, _)| i)
        .collect();

    // Merge change runs whose context windows would overlap or touch
    let mut groups: Vec<(usize, usize)> = Vec::new();
    let mut start = change_positions[0];
    let mut end = change_positions[0];
    for &pos in &change_positions[1..] {
        if pos - end <= 2 * HUNK_CONTEXT + 1 {
            end = pos;
        } else {
            groups.push((start, end));
            start = pos;
            end = pos;
        }
    }
    groups.push((start, end));

    // Cumulative old/new line counts before each script position (1-indexed
    // hunk starts derive from these)
    let mut old_before = vec![0u32; edits.len() + 1];
    let mut new_before = vec![0u32; edits.len() + 1];
    for (i, edit) in edits.iter().enumerate() {
        let (od, nd) = match edit {
            Edit::Equal { .. } => (1, 1),
            Edit::Remove { .. } => (1, 0),
            Edit::Add { .. } => (0, 1),
        };
        old_before[i + 1] = old_before[i] + od;
        new_before[i + 1] = new_before[i] + nd;
    }

    let mut hunks = Vec::with_capacity(groups.len());
    for (group_start, group_end) in groups {
        let slice_start = group_start.saturating_sub(HUNK_CONTEXT);
        let slice_end = (group_end + HUNK_CONTEXT + 1).min(edits.len());

        let mut lines = Vec::with_capacity(slice_end - slice_start);
        let mut old_count = 0u32;
        let mut new_count = 0u32;
        for edit in &edits[slice_start..slice_end] {
            match edit {
                Edit::Equal { old: i, new: j } => {
                    lines.push(DiffLine {
                        origin: LineOrigin::Context,
                        content: old[*i].to_string(),
                        old_line: Some(*i as u32 + 1),
                        new_line: Some(*j as u32 + 1),
                    });
                    old_count += 1;
                    new_count += 1;
                }
                Edit::Remove { old: i } => {
                    lines.push(DiffLine {
                        origin: LineOrigin::Removed,
                        content: old[*i].to_string(),
                        old_line: Some(*i as u32 + 1),
                        new_line: None,
                    });
                    old_count += 1;
                }
                Edit::Add { new: j } => {
                    lines.push(DiffLine {
                        origin: LineOrigin::Added,
                        content: new[*j].to_string(),
                        old_line: None,
                        new_line: Some(*j as u32 + 1),
                    });
                    new_count += 1;
                }
            }
        }

        // Unified convention: a side with zero lines anchors at the line
        // before the hunk
        let old_start = if old_count > 0 {
            old_before[slice_start] + 1
        } else {
            old_before[slice_start]
        };
        let new_start = if new_count > 0 {
            new_before[slice_start] + 1
        } else {
            new_before[slice_start]
        };

        hunks.push(Hunk {
            old_start,
            old_lines: old_count,
            new_start,
            new_lines: new_count,
            lines,
        });
    }

    hunks
}

/// Diff two file snapshots into a `FileDiff`, used when the host cannot
/// provide a unified diff itself.
pub fn compute_file_diff(
    path: &str,
    old_text: &str,
    new_text: &str,
    max_distance: usize,
) -> FileDiff {
    let old: Vec<&str> = if old_text.is_empty() {
        Vec::new()
    } else {
        old_text.lines().collect()
    };
    let new: Vec<&str> = if new_text.is_empty() {
        Vec::new()
    } else {
        new_text.lines().collect()
    };

    let edits = diff_lines(&old, &new, max_distance);
    let hunks = build_hunks(&old, &new, &edits);

    let additions = hunks
        .iter()
        .flat_map(|h| &h.lines)
        .filter(|l| l.origin == LineOrigin::Added)
        .count() as u32;
    let deletions = hunks
        .iter()
        .flat_map(|h| &h.lines)
        .filter(|l| l.origin == LineOrigin::Removed)
        .count() as u32;

    let status = if old.is_empty() && !new.is_empty() {
        FileStatus::Added
    } else if !old.is_empty() && new.is_empty() {
        FileStatus::Deleted
    } else {
        FileStatus::Modified
    };

    FileDiff {
        path: path.to_string(),
        old_path: None,
        status,
        additions,
        deletions,
        hunks,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_applies(old: &[&str], new: &[&str], max_d: usize) {
        let edits = diff_lines(old, new, max_d);
        let applied = apply_edits(old, new, &edits);
        let expected: Vec<String> = new.iter().map(|s| s.to_string()).collect();
        assert_eq!(applied, expected);
    }

    #[test]
    fn test_equal_inputs_empty_hunks() {
        let lines = ["a", "b", "c"];
        let edits = diff_lines(&lines, &lines, 8000);
        assert!(edits.iter().all(|e| matches!(e, Edit::Equal { .. })));
        assert!(build_hunks(&lines, &lines, &edits).is_empty());
    }

    #[test]
    fn test_single_line_replacement_scenario() {
        let old = ["a", "b", "c", "d", "e", "f"];
        let new = ["a", "b", "X", "d", "e", "f"];
        let diff = compute_file_diff("src/sample.txt", &old.join("\n"), &new.join("\n"), 8000);

        assert_eq!(diff.additions, 1);
        assert_eq!(diff.deletions, 1);
        assert_eq!(diff.hunks.len(), 1);

        let hunk = &diff.hunks[0];
        let removed: Vec<&DiffLine> = hunk
            .lines
            .iter()
            .filter(|l| l.origin == LineOrigin::Removed)
            .collect();
        let added: Vec<&DiffLine> = hunk
            .lines
            .iter()
            .filter(|l| l.origin == LineOrigin::Added)
            .collect();
        assert_eq!(removed.len(), 1);
        assert_eq!(removed[0].content, "c");
        assert_eq!(removed[0].old_line, Some(3));
        assert_eq!(added.len(), 1);
        assert_eq!(added[0].content, "X");
        assert_eq!(added[0].new_line, Some(3));

        // Two lines of leading and trailing context (bounded by file edges)
        let leading: Vec<&DiffLine> = hunk
            .lines
            .iter()
            .take_while(|l| l.origin == LineOrigin::Context)
            .collect();
        let trailing: Vec<&DiffLine> = hunk
            .lines
            .iter()
            .rev()
            .take_while(|l| l.origin == LineOrigin::Context)
            .collect();
        assert_eq!(leading.len(), 2);
        assert_eq!(trailing.len(), 3);
        assert_eq!(hunk.header(), "@@ -1,6 +1,6 @@");
    }

    #[test]
    fn test_apply_edits_various() {
        assert_applies(&["a", "b", "c"], &["a", "c"], 8000);
        assert_applies(&[], &["x", "y"], 8000);
        assert_applies(&["x", "y"], &[], 8000);
        assert_applies(&["a", "b"], &["b", "a"], 8000);
        assert_applies(
            &["fn main() {", "  old();", "}"],
            &["fn main() {", "  new();", "  extra();", "}"],
            8000,
        );
    }

    #[test]
    fn test_apply_edits_after_fallback() {
        // Force the fallback path with a tiny distance limit
        let old = ["a", "b", "c", "d"];
        let new = ["w", "x", "y", "z"];
        assert_applies(&old, &new, 1);
    }

    #[test]
    fn test_small_edit_in_large_file_stays_precise() {
        let old: Vec<String> = (0..5000).map(|i| format!("line {}", i)).collect();
        let mut new = old.clone();
        new[2500] = "changed".to_string();
        let old_refs: Vec<&str> = old.iter().map(|s| s.as_str()).collect();
        let new_refs: Vec<&str> = new.iter().map(|s| s.as_str()).collect();

        // Edit distance is 2 regardless of file size, far under the bound
        let edits = diff_lines(&old_refs, &new_refs, 8000);
        let changes = edits
            .iter()
            .filter(|e| !matches!(e, Edit::Equal { .. }))
            .count();
        assert_eq!(changes, 2);

        let hunks = build_hunks(&old_refs, &new_refs, &edits);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].old_start, 2498);
    }

    #[test]
    fn test_nearby_changes_merge_into_one_hunk() {
        let old = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let new = ["a", "B", "c", "d", "e", "F", "g", "h"];
        let edits = diff_lines(&old, &new, 8000);
        let hunks = build_hunks(&old, &new, &edits);
        assert_eq!(hunks.len(), 1);
    }

    #[test]
    fn test_distant_changes_separate_hunks() {
        let mut old: Vec<String> = (0..40).map(|i| format!("l{}", i)).collect();
        let mut new = old.clone();
        new[2] = "first".to_string();
        new[35] = "second".to_string();
        old.truncate(40);
        let old_refs: Vec<&str> = old.iter().map(|s| s.as_str()).collect();
        let new_refs: Vec<&str> = new.iter().map(|s| s.as_str()).collect();

        let edits = diff_lines(&old_refs, &new_refs, 8000);
        let hunks = build_hunks(&old_refs, &new_refs, &edits);
        assert_eq!(hunks.len(), 2);
    }

    #[test]
    fn test_pure_addition_hunk_header() {
        let old = ["a", "b"];
        let new = ["a", "b", "c", "d"];
        let edits = diff_lines(&old, &new, 8000);
        let hunks = build_hunks(&old, &new, &edits);
        assert_eq!(hunks.len(), 1);
        assert_eq!(hunks[0].new_lines - hunks[0].old_lines, 2);
    }

    #[test]
    fn test_added_and_deleted_file_status() {
        let added = compute_file_diff("new.ts", "", "hello\nworld", 8000);
        assert_eq!(added.status, FileStatus::Added);
        assert_eq!(added.additions, 2);
        assert_eq!(added.deletions, 0);

        let deleted = compute_file_diff("old.ts", "hello\nworld", "", 8000);
        assert_eq!(deleted.status, FileStatus::Deleted);
        assert_eq!(deleted.additions, 0);
        assert_eq!(deleted.deletions, 2);
    }

    #[test]
    fn test_fnv1a_known_vectors() {
        // Reference values for the 32-bit FNV-1a function
        assert_eq!(fnv1a_32(b""), 0x811c9dc5);
        assert_eq!(fnv1a_32(b"a"), 0xe40c292c);
    }

    #[test]
    fn test_hash_collision_falls_back_to_string_compare() {
        // Different strings never compare equal even if hashes were to
        // collide; equality requires the string check to pass
        let lines = Lines::new(&["abc"], &["abd"]);
        assert!(!lines.eq(0, 0));
    }
}
