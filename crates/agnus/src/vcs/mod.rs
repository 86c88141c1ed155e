// crates/agnus/src/vcs/mod.rs
// Abstract VCS host contract: PR metadata, diffs, comments, votes

use anyhow::Result;
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::diff::FileDiff;

/// Pull request metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub id: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub head_sha: String,
    pub base_sha: String,
    pub source_branch: String,
    pub target_branch: String,
}

/// A file in a pull request with its inferred language
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: String,
    pub language: Option<String>,
}

/// A comment already present on a pull request
#[derive(Debug, Clone, Default)]
pub struct PrComment {
    pub id: i64,
    pub body: String,
    pub path: Option<String>,
    pub line: Option<u32>,
    /// Bodies of replies to this comment (dismissals are recognised here,
    /// never on the comment body itself)
    pub replies: Vec<String>,
}

/// Severity of a review comment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Review verdict; hosts map it onto their vote scale
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approve,
    RequestChanges,
    Comment,
}

impl ReviewVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::RequestChanges => "request_changes",
            Self::Comment => "comment",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "approve" => Some(Self::Approve),
            "request_changes" => Some(Self::RequestChanges),
            "comment" => Some(Self::Comment),
            _ => None,
        }
    }
}

impl fmt::Display for ReviewVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An inline review comment ready for posting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    pub path: String,
    pub line: u32,
    pub body: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

/// A full review: summary, inline comments and the verdict
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewResult {
    pub summary: String,
    pub comments: Vec<ReviewComment>,
    pub verdict: ReviewVerdict,
}

/// Operations the review core requires from a VCS host.
///
/// Implementations exist per host; partial posting is tolerated (comments
/// already posted remain when a later call fails).
#[async_trait]
pub trait VcsClient: Send + Sync {
    /// Fetch PR metadata
    async fn get_pr(&self, pr_id: &str) -> Result<PullRequest>;

    /// Fetch the diff, optionally restricted to commits since a checkpoint
    /// sha. Hosts without server-side diffs fetch the two snapshots and run
    /// the local diff engine.
    async fn get_diff(&self, pr_id: &str, since_sha: Option<&str>) -> Result<Vec<FileDiff>>;

    /// List the files touched by the PR
    async fn get_files(&self, pr_id: &str) -> Result<Vec<FileInfo>>;

    /// Fetch a file at a commit; empty on 404 (non-fatal)
    async fn get_file_content(&self, path: &str, git_ref: &str) -> Result<Vec<u8>>;

    /// Post a single inline comment
    async fn add_inline_comment(
        &self,
        pr_id: &str,
        path: &str,
        line: u32,
        body: &str,
        severity: Severity,
    ) -> Result<()>;

    /// Post all inline comments plus the summary and set the host vote
    /// where supported
    async fn submit_review(&self, pr_id: &str, review: &ReviewResult) -> Result<()>;

    /// List existing comments (checkpoint discovery and dedup)
    async fn get_comments(&self, pr_id: &str) -> Result<Vec<PrComment>>;

    /// Post a standalone PR comment, returning its id
    async fn post_comment(&self, pr_id: &str, body: &str) -> Result<i64>;

    /// Update an existing PR comment in place
    async fn update_comment(&self, pr_id: &str, comment_id: i64, body: &str) -> Result<()>;
}

static TICKET_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        Regex::new(r"\b[A-Z]+-\d+\b").expect("jira pattern"),
        Regex::new(r"\bAB#\d+\b").expect("azure pattern"),
        Regex::new(r"#\d+\b").expect("issue pattern"),
    ]
});

/// Ticket keys referenced in PR title/description
pub fn linked_tickets(text: &str) -> Vec<String> {
    let mut tickets = Vec::new();
    for pattern in TICKET_PATTERNS.iter() {
        for m in pattern.find_iter(text) {
            let key = m.as_str().to_string();
            if !tickets.contains(&key) {
                tickets.push(key);
            }
        }
    }
    tickets
}

/// Infer a language label from a file extension
pub fn infer_language(path: &str) -> Option<&'static str> {
    match path.rsplit('.').next()? {
        "ts" | "tsx" => Some("typescript"),
        "js" | "jsx" => Some("javascript"),
        "py" => Some("python"),
        "java" => Some("java"),
        "cs" => Some("csharp"),
        "go" => Some("go"),
        "rs" => Some("rust"),
        "rb" => Some("ruby"),
        "json" => Some("json"),
        "yml" | "yaml" => Some("yaml"),
        "toml" => Some("toml"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linked_tickets() {
        let text = "PROJ-123: fix login\n\nCloses #42 and AB#777, relates to PROJ-123";
        let tickets = linked_tickets(text);
        assert!(tickets.contains(&"PROJ-123".to_string()));
        assert!(tickets.contains(&"AB#777".to_string()));
        assert!(tickets.contains(&"#42".to_string()));
        // Duplicates collapse
        assert_eq!(
            tickets.iter().filter(|t| t.as_str() == "PROJ-123").count(),
            1
        );
    }

    #[test]
    fn test_verdict_roundtrip() {
        for verdict in [
            ReviewVerdict::Approve,
            ReviewVerdict::RequestChanges,
            ReviewVerdict::Comment,
        ] {
            assert_eq!(ReviewVerdict::parse(verdict.as_str()), Some(verdict));
        }
        assert_eq!(ReviewVerdict::parse("ship_it"), None);
    }

    #[test]
    fn test_infer_language() {
        assert_eq!(infer_language("src/app.tsx"), Some("typescript"));
        assert_eq!(infer_language("svc/main.go"), Some("go"));
        assert_eq!(infer_language("README"), None);
    }
}
