// crates/agnus/src/review/prompt.rs
// Prompt assembly for a single review

use crate::config::ReviewSettings;
use crate::utils::truncate_at_boundary;
use crate::vcs::PullRequest;

/// Fixed system preamble defining the required output format
const SYSTEM_PREAMBLE: &str = "\
You are an expert code reviewer. Review the pull request diff below and \
report genuine problems: bugs, security issues, race conditions, broken \
error handling, and misleading code. Do not restate the diff, do not pad \
with praise, and do not comment on files that are not shown.

Output format (exactly):

SUMMARY: <one-paragraph overall assessment>
[File: <path>, Line: <N>]
<finding body, one finding per marker>
...
VERDICT: approve | request_changes | comment

Rules:
- <N> is the post-state line number shown in the [Line N] markers of the diff.
- Prefix severe findings with \"Critical:\" and significant ones with \"Major:\".
- Propose concrete fixes in ```suggestion blocks when a small change resolves the finding.";

/// Confidence-scoring instructions appended to every prompt
const CONFIDENCE_INSTRUCTIONS: &str = "\
End every finding body with [Confidence: X.X] on a 0.0-1.0 scale:
- 0.9-1.0: certain, verifiable from the diff alone
- 0.7-0.8: likely real, minor assumptions about surrounding code
- 0.5-0.6: plausible but depends on unseen code
- below 0.5: speculative
Report only what you would defend in a human review.";

/// Notice injected when the diff was cut at the size limit
const TRUNCATION_NOTICE: &str = "\
NOTE: the diff was truncated at the size limit. Files and lines beyond this \
point are NOT shown; do not comment on anything outside the visible diff.";

/// Assemble the full review prompt.
///
/// `annotated_diff` already carries [Line N] markers; `context` is the
/// rendered Codebase Context section (may be empty when no graph is
/// available); `skills` are the matched rule snippets.
pub fn build_prompt(
    pr: &PullRequest,
    annotated_diff: &str,
    context: &str,
    skills: &[String],
    settings: &ReviewSettings,
) -> String {
    let mut prompt = String::with_capacity(annotated_diff.len() + context.len() + 2048);

    prompt.push_str(SYSTEM_PREAMBLE);
    prompt.push_str("\n\n");

    if !skills.is_empty() {
        prompt.push_str("## Project review rules\n");
        for skill in skills {
            prompt.push_str(skill);
            prompt.push('\n');
        }
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "## Pull request\nTitle: {}\nAuthor: {}\n",
        pr.title, pr.author
    ));
    if !pr.description.trim().is_empty() {
        prompt.push_str(&format!(
            "Description: {}\n",
            truncate_at_boundary(pr.description.trim(), 2_000)
        ));
    }
    prompt.push('\n');

    let truncated = annotated_diff.len() > settings.max_diff_size;
    let diff = truncate_at_boundary(annotated_diff, settings.max_diff_size);
    prompt.push_str("## Diff\n");
    prompt.push_str(diff);
    prompt.push('\n');
    if truncated {
        prompt.push('\n');
        prompt.push_str(TRUNCATION_NOTICE);
        prompt.push('\n');
    }

    if !context.trim().is_empty() {
        prompt.push('\n');
        prompt.push_str(context);
        prompt.push_str(
            "\nUse this context to judge impact and call out breakage in callers, \
             but do not mention the context section itself in your findings.\n",
        );
    }

    prompt.push('\n');
    prompt.push_str(CONFIDENCE_INSTRUCTIONS);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pr() -> PullRequest {
        PullRequest {
            id: "42".to_string(),
            title: "Fix token refresh".to_string(),
            description: "Handles the expiry race.".to_string(),
            author: "dev".to_string(),
            head_sha: "abc".to_string(),
            base_sha: "def".to_string(),
            source_branch: "fix/refresh".to_string(),
            target_branch: "main".to_string(),
        }
    }

    #[test]
    fn test_prompt_contains_sections() {
        let settings = ReviewSettings::default();
        let prompt = build_prompt(
            &pr(),
            "+ [Line 3] let x = 1;",
            "## Codebase Context\n- foo (function) fn foo()\n",
            &["Never log secrets.".to_string()],
            &settings,
        );

        assert!(prompt.contains("SUMMARY:"));
        assert!(prompt.contains("VERDICT:"));
        assert!(prompt.contains("[Confidence: X.X]"));
        assert!(prompt.contains("Project review rules"));
        assert!(prompt.contains("Never log secrets."));
        assert!(prompt.contains("Fix token refresh"));
        assert!(prompt.contains("[Line 3]"));
        assert!(prompt.contains("Codebase Context"));
        assert!(!prompt.contains("NOTE: the diff was truncated"));
    }

    #[test]
    fn test_truncation_notice() {
        let settings = ReviewSettings {
            max_diff_size: 50,
            ..ReviewSettings::default()
        };
        let big_diff = "+ [Line 1] x\n".repeat(100);
        let prompt = build_prompt(&pr(), &big_diff, "", &[], &settings);
        assert!(prompt.contains("NOTE: the diff was truncated"));
        assert!(prompt.contains("do not comment on anything outside the visible diff"));
    }

    #[test]
    fn test_empty_context_degrades_to_flat_diff() {
        let settings = ReviewSettings::default();
        let prompt = build_prompt(&pr(), "+ [Line 1] x", "", &[], &settings);
        assert!(!prompt.contains("Codebase Context"));
    }
}
