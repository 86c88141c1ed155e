// crates/agnus/src/review/dedup.rs
// Path validation, line validation, and content-addressed deduplication of
// review comments

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;

use crate::utils::normalize_diff_path;
use crate::vcs::{PrComment, ReviewComment};

/// Phrases that mark a finding as dismissed. Recognised only on replies to
/// a comment, never on the comment body itself: dismissal keywords inside
/// the bot's own findings must not suppress re-posting them.
pub const DISMISSAL_PHRASES: &[&str] = &[
    "dismiss",
    "false positive",
    "not an issue",
    "won't fix",
    "wontfix",
    "working as intended",
    "intended behavior",
];

static FINGERPRINT_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<!-- agnus:fp:([0-9a-f]{16}) -->").expect("marker regex"));

/// Content-addressed comment id: SHA-256 of path, line and body, truncated
/// to 16 hex characters
pub fn comment_fingerprint(path: &str, line: u32, body: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(line.to_string().as_bytes());
    hasher.update(body.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

/// Invisible marker embedded in posted comment bodies so replays recognise
/// their own findings
pub fn fingerprint_marker(fingerprint: &str) -> String {
    format!("<!-- agnus:fp:{} -->", fingerprint)
}

/// Extract an embedded fingerprint marker from an existing comment body
pub fn extract_marker(body: &str) -> Option<String> {
    FINGERPRINT_MARKER
        .captures(body)
        .map(|caps| caps[1].to_string())
}

/// Did any reply dismiss this comment?
fn is_dismissed(comment: &PrComment) -> bool {
    comment.replies.iter().any(|reply| {
        let lowered = reply.to_lowercase();
        DISMISSAL_PHRASES.iter().any(|phrase| lowered.contains(phrase))
    })
}

/// Fingerprints of comments already on the PR, including dismissed ones.
/// A finding whose fingerprint appears here is never posted again.
pub struct CommentGate {
    known: HashSet<String>,
}

impl CommentGate {
    /// Build the gate from the PR's existing comments.
    ///
    /// Embedded markers are preferred; comments without one (posted before
    /// markers existed) fall back to recomputing the content hash.
    pub fn from_existing(comments: &[PrComment]) -> Self {
        let mut known = HashSet::new();
        for comment in comments {
            if let Some(fingerprint) = extract_marker(&comment.body) {
                known.insert(fingerprint);
            } else if let (Some(path), Some(line)) = (&comment.path, comment.line) {
                known.insert(comment_fingerprint(path, line, comment.body.trim()));
            }
            // Dismissed findings also stay suppressed; the dismissal lives
            // on a reply
            if is_dismissed(comment)
                && let Some(fingerprint) = extract_marker(&comment.body)
            {
                known.insert(fingerprint);
            }
        }
        Self { known }
    }

    pub fn contains(&self, fingerprint: &str) -> bool {
        self.known.contains(fingerprint)
    }
}

/// Validate comment paths and lines against the diff, then deduplicate.
///
/// - Paths are normalised (leading `/` stripped) and looked up in the
///   diff's file map; misses are hallucinated paths and are dropped.
/// - Lines must be `+` lines in that file's hunks.
/// - Fingerprints already on the PR are skipped.
/// - Within the batch, later duplicates of the same (path, line, body) drop.
pub fn validate_and_dedup(
    comments: Vec<ReviewComment>,
    diff_files: &[String],
    added_lines: &HashMap<String, BTreeSet<u32>>,
    gate: &CommentGate,
) -> Vec<ReviewComment> {
    let file_map: HashMap<String, &String> = diff_files
        .iter()
        .map(|path| (normalize_diff_path(path), path))
        .collect();

    let mut seen_in_batch: HashSet<String> = HashSet::new();
    let mut result = Vec::new();

    for mut comment in comments {
        let normalized = normalize_diff_path(&comment.path);
        let Some(original) = file_map.get(&normalized) else {
            tracing::warn!(
                path = %comment.path,
                "Comment references a file not present in the diff; dropping"
            );
            continue;
        };
        comment.path = (*original).clone();

        let on_added_line = added_lines
            .get(&normalized)
            .is_some_and(|lines| lines.contains(&comment.line));
        if !on_added_line {
            tracing::warn!(
                path = %comment.path,
                line = comment.line,
                "Comment line is not an added line in the diff; dropping"
            );
            continue;
        }

        let fingerprint = comment_fingerprint(&normalized, comment.line, &comment.body);
        if gate.contains(&fingerprint) {
            tracing::debug!(
                path = %comment.path,
                line = comment.line,
                "Skipping comment already present on the PR"
            );
            continue;
        }
        if !seen_in_batch.insert(fingerprint) {
            continue;
        }

        result.push(comment);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcs::Severity;

    fn comment(path: &str, line: u32, body: &str) -> ReviewComment {
        ReviewComment {
            path: path.to_string(),
            line,
            body: body.to_string(),
            severity: Severity::Info,
            confidence: None,
            suggestion: None,
        }
    }

    fn added(entries: &[(&str, &[u32])]) -> HashMap<String, BTreeSet<u32>> {
        entries
            .iter()
            .map(|(path, lines)| (path.to_string(), lines.iter().copied().collect()))
            .collect()
    }

    #[test]
    fn test_fingerprint_stable_and_distinct() {
        let a = comment_fingerprint("src/a.ts", 3, "body");
        assert_eq!(a, comment_fingerprint("src/a.ts", 3, "body"));
        assert_eq!(a.len(), 16);
        assert_ne!(a, comment_fingerprint("src/a.ts", 4, "body"));
        assert_ne!(a, comment_fingerprint("src/b.ts", 3, "body"));
        assert_ne!(a, comment_fingerprint("src/a.ts", 3, "other"));
    }

    #[test]
    fn test_marker_roundtrip() {
        let fp = comment_fingerprint("src/a.ts", 3, "body");
        let marker = fingerprint_marker(&fp);
        assert_eq!(extract_marker(&marker), Some(fp));
        assert_eq!(extract_marker("no marker here"), None);
    }

    #[test]
    fn test_hallucinated_path_dropped() {
        let files = vec!["src/a.ts".to_string()];
        let added = added(&[("src/a.ts", &[10])]);
        let gate = CommentGate::from_existing(&[]);

        let kept = validate_and_dedup(
            vec![
                comment("src/b.ts", 10, "hallucinated file"),
                comment("src/a.ts", 10, "real file"),
            ],
            &files,
            &added,
            &gate,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, "src/a.ts");
    }

    #[test]
    fn test_leading_slash_normalised() {
        let files = vec!["src/a.ts".to_string()];
        let added = added(&[("src/a.ts", &[10])]);
        let gate = CommentGate::from_existing(&[]);

        let kept = validate_and_dedup(
            vec![comment("/src/a.ts", 10, "slash prefixed")],
            &files,
            &added,
            &gate,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].path, "src/a.ts");
    }

    #[test]
    fn test_line_not_added_dropped() {
        let files = vec!["src/a.ts".to_string()];
        let added = added(&[("src/a.ts", &[10, 11])]);
        let gate = CommentGate::from_existing(&[]);

        let kept = validate_and_dedup(
            vec![
                comment("src/a.ts", 10, "on an added line"),
                comment("src/a.ts", 99, "context line"),
            ],
            &files,
            &added,
            &gate,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].line, 10);
    }

    #[test]
    fn test_replay_posts_nothing_new() {
        let files = vec!["src/a.ts".to_string()];
        let added = added(&[("src/a.ts", &[10])]);
        let body = "Validate the token first.";
        let fp = comment_fingerprint("src/a.ts", 10, body);

        // First run: empty gate, comment passes
        let gate = CommentGate::from_existing(&[]);
        let first = validate_and_dedup(vec![comment("src/a.ts", 10, body)], &files, &added, &gate);
        assert_eq!(first.len(), 1);

        // Second run: the posted comment (with marker) is on the PR
        let posted = PrComment {
            id: 1,
            body: format!("{}\n{}", body, fingerprint_marker(&fp)),
            path: Some("src/a.ts".to_string()),
            line: Some(10),
            replies: vec![],
        };
        let gate = CommentGate::from_existing(&[posted]);
        let second = validate_and_dedup(vec![comment("src/a.ts", 10, body)], &files, &added, &gate);
        assert!(second.is_empty());
    }

    #[test]
    fn test_dismissal_on_reply_only() {
        let body = "Consider a null check.";
        let fp = comment_fingerprint("src/a.ts", 10, body);

        // Dismissal phrase inside the comment body itself does not suppress
        let self_describing = PrComment {
            id: 1,
            body: "This might be a false positive but worth checking.".to_string(),
            path: Some("src/a.ts".to_string()),
            line: Some(5),
            replies: vec![],
        };
        let gate = CommentGate::from_existing(&[self_describing]);
        assert!(!gate.contains(&fp));

        // Dismissal on a reply suppresses the finding
        let dismissed = PrComment {
            id: 2,
            body: format!("{}\n{}", body, fingerprint_marker(&fp)),
            path: Some("src/a.ts".to_string()),
            line: Some(10),
            replies: vec!["This is a false positive, the check happens upstream.".to_string()],
        };
        let gate = CommentGate::from_existing(&[dismissed]);
        assert!(gate.contains(&fp));
    }

    #[test]
    fn test_within_batch_duplicates_dropped() {
        let files = vec!["src/a.ts".to_string()];
        let added = added(&[("src/a.ts", &[10])]);
        let gate = CommentGate::from_existing(&[]);

        let kept = validate_and_dedup(
            vec![
                comment("src/a.ts", 10, "same finding"),
                comment("src/a.ts", 10, "same finding"),
                comment("src/a.ts", 10, "different finding"),
            ],
            &files,
            &added,
            &gate,
        );
        assert_eq!(kept.len(), 2);
    }
}
