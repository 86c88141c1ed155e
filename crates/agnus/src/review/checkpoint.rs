// crates/agnus/src/review/checkpoint.rs
// Per-PR checkpoint: the last reviewed commit, persisted as a
// sentinel-wrapped JSON inside a host comment

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::vcs::PrComment;

/// Sentinel marking a checkpoint comment
pub const CHECKPOINT_PREFIX: &str = "<!-- AGNUSAI_CHECKPOINT:";
pub const CHECKPOINT_SUFFIX: &str = "-->";

/// Record of the last completed review on a PR
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub sha: String,
    pub timestamp: i64,
    pub files_reviewed: Vec<String>,
    pub comment_count: usize,
    pub verdict: String,
}

impl Checkpoint {
    pub fn new(
        sha: impl Into<String>,
        files_reviewed: Vec<String>,
        comment_count: usize,
        verdict: impl Into<String>,
    ) -> Self {
        Self {
            sha: sha.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            files_reviewed,
            comment_count,
            verdict: verdict.into(),
        }
    }

    /// Encode as a host comment body: the sentinel-wrapped JSON followed by
    /// a human-readable summary
    pub fn encode(&self, summary: &str) -> Result<String> {
        let json = serde_json::to_string(self)?;
        Ok(format!(
            "{} {} {}\n{}",
            CHECKPOINT_PREFIX, json, CHECKPOINT_SUFFIX, summary
        ))
    }
}

/// Result of scanning a PR's comments for a checkpoint
#[derive(Debug)]
pub enum CheckpointScan {
    Found {
        checkpoint: Checkpoint,
        comment_id: i64,
    },
    /// A sentinel was present but its JSON did not parse; callers fall back
    /// to a full review instead of silently ignoring it
    Malformed {
        comment_id: i64,
    },
    Absent,
}

/// Extract a checkpoint from one comment body, if the sentinel is present
fn parse_comment(body: &str) -> Option<std::result::Result<Checkpoint, serde_json::Error>> {
    let start = body.find(CHECKPOINT_PREFIX)?;
    let after_prefix = &body[start + CHECKPOINT_PREFIX.len()..];
    let end = after_prefix.find(CHECKPOINT_SUFFIX)?;
    let json = after_prefix[..end].trim();
    Some(serde_json::from_str(json))
}

/// Scan a PR's comments for the checkpoint marker
pub fn find_checkpoint(comments: &[PrComment]) -> CheckpointScan {
    for comment in comments {
        match parse_comment(&comment.body) {
            Some(Ok(checkpoint)) => {
                return CheckpointScan::Found {
                    checkpoint,
                    comment_id: comment.id,
                };
            }
            Some(Err(e)) => {
                tracing::warn!(
                    comment_id = comment.id,
                    error = %e,
                    "Malformed checkpoint JSON; falling back to full review"
                );
                return CheckpointScan::Malformed {
                    comment_id: comment.id,
                };
            }
            None => {}
        }
    }
    CheckpointScan::Absent
}

#[cfg(test)]
mod tests {
    use super::*;

    fn comment(id: i64, body: &str) -> PrComment {
        PrComment {
            id,
            body: body.to_string(),
            ..PrComment::default()
        }
    }

    #[test]
    fn test_roundtrip() {
        let checkpoint = Checkpoint::new(
            "abc123",
            vec!["src/a.ts".to_string(), "src/b.ts".to_string()],
            4,
            "comment",
        );
        let body = checkpoint.encode("Reviewed 2 files, 4 comments.").unwrap();
        assert!(body.starts_with(CHECKPOINT_PREFIX));
        assert!(body.contains("Reviewed 2 files"));
        // Wire format uses camelCase keys
        assert!(body.contains("\"filesReviewed\""));
        assert!(body.contains("\"commentCount\""));

        match find_checkpoint(&[comment(7, &body)]) {
            CheckpointScan::Found {
                checkpoint: parsed,
                comment_id,
            } => {
                assert_eq!(comment_id, 7);
                assert_eq!(parsed, checkpoint);
            }
            other => panic!("expected Found, got {:?}", other),
        }
    }

    #[test]
    fn test_corrupted_json_is_malformed() {
        let checkpoint = Checkpoint::new("abc123", vec![], 0, "approve");
        let body = checkpoint.encode("summary").unwrap();
        // Corrupt one character inside the JSON payload
        let corrupted = body.replacen("\"sha\"", "\"sh@\"", 1);

        match find_checkpoint(&[comment(9, &corrupted)]) {
            CheckpointScan::Malformed { comment_id } => assert_eq!(comment_id, 9),
            other => panic!("expected Malformed, got {:?}", other),
        }
    }

    #[test]
    fn test_absent_when_no_sentinel() {
        let scan = find_checkpoint(&[
            comment(1, "just a regular comment"),
            comment(2, "LGTM"),
        ]);
        assert!(matches!(scan, CheckpointScan::Absent));
    }

    #[test]
    fn test_first_checkpoint_wins() {
        let first = Checkpoint::new("sha-1", vec![], 1, "comment");
        let second = Checkpoint::new("sha-2", vec![], 2, "comment");
        let comments = [
            comment(1, &first.encode("s1").unwrap()),
            comment(2, &second.encode("s2").unwrap()),
        ];
        match find_checkpoint(&comments) {
            CheckpointScan::Found { checkpoint, .. } => assert_eq!(checkpoint.sha, "sha-1"),
            other => panic!("expected Found, got {:?}", other),
        }
    }
}
