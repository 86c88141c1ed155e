// crates/agnus/src/review/parser.rs
// Parses the LLM's structured review output into summary, comments and
// verdict

use regex::Regex;
use std::sync::LazyLock;

use crate::vcs::{ReviewComment, ReviewVerdict, Severity};

/// Default summary length when the SUMMARY marker is missing
const FALLBACK_SUMMARY_CHARS: usize = 500;

static FILE_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    // [File: src/a.ts, Line: 42]
    Regex::new(r"\[File:\s*([^,\]]+?)\s*,\s*Line:\s*(-?\d+)\s*\]").expect("file marker regex")
});

static CONFIDENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Confidence:\s*([0-9]*\.?[0-9]+)\s*\]").expect("confidence regex")
});

static VERDICT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^\s*VERDICT:\s*(approve|request_changes|comment)\s*$").expect("verdict regex")
});

static SUGGESTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```suggestion\n(.*?)```").expect("suggestion regex")
});

/// Parsed review response
#[derive(Debug)]
pub struct ParsedReview {
    pub summary: String,
    pub comments: Vec<ReviewComment>,
    pub verdict: ReviewVerdict,
}

/// Parse the LLM response.
///
/// Expected shape:
/// ```text
/// SUMMARY: <text>
/// [File: <path>, Line: <N>]
/// <body including [Confidence: X.X]>
/// VERDICT: approve | request_changes | comment
/// ```
pub fn parse_response(raw: &str) -> ParsedReview {
    let summary = extract_summary(raw);
    let verdict = extract_verdict(raw);
    let comments = extract_comments(raw);

    if comments.is_empty() && looks_truncated(raw) {
        tracing::warn!("Response contains no comment markers and may be truncated");
    }

    ParsedReview {
        summary,
        comments,
        verdict,
    }
}

fn extract_summary(raw: &str) -> String {
    if let Some(start) = raw.find("SUMMARY:") {
        let after = &raw[start + "SUMMARY:".len()..];
        let end = FILE_MARKER
            .find(after)
            .map(|m| m.start())
            .or_else(|| after.find("VERDICT:"))
            .unwrap_or(after.len());
        let summary = after[..end].trim();
        if !summary.is_empty() {
            return summary.to_string();
        }
    }
    crate::utils::truncate_at_boundary(raw.trim(), FALLBACK_SUMMARY_CHARS).to_string()
}

fn extract_verdict(raw: &str) -> ReviewVerdict {
    match VERDICT
        .captures(raw)
        .and_then(|caps| ReviewVerdict::parse(&caps[1]))
    {
        Some(verdict) => verdict,
        None => {
            tracing::warn!("Response missing VERDICT marker; defaulting to comment");
            ReviewVerdict::Comment
        }
    }
}

fn extract_comments(raw: &str) -> Vec<ReviewComment> {
    let mut comments = Vec::new();

    let markers: Vec<_> = FILE_MARKER.captures_iter(raw).collect();
    for (i, caps) in markers.iter().enumerate() {
        let Some(whole) = caps.get(0) else { continue };
        let body_start = whole.end();
        let body_end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or_else(|| {
                raw[body_start..]
                    .find("VERDICT:")
                    .map(|pos| body_start + pos)
                    .unwrap_or(raw.len())
            });

        let path = caps[1].trim().to_string();
        let line: i64 = match caps[2].parse() {
            Ok(line) => line,
            Err(_) => {
                tracing::warn!(path = %path, "Unparseable line number; dropping comment");
                continue;
            }
        };
        if line < 1 {
            tracing::warn!(path = %path, line, "Line number below 1; dropping comment");
            continue;
        }

        let raw_body = raw[body_start..body_end].trim();
        if raw_body.is_empty() {
            continue;
        }

        let confidence = CONFIDENCE
            .captures(raw_body)
            .and_then(|c| c[1].parse::<f32>().ok())
            .map(|c| c.clamp(0.0, 1.0));
        let body = CONFIDENCE.replace_all(raw_body, "").trim().to_string();
        if body.is_empty() {
            continue;
        }

        let suggestion = SUGGESTION
            .captures(&body)
            .map(|c| c[1].trim_end().to_string());

        comments.push(ReviewComment {
            path,
            line: line as u32,
            severity: derive_severity(&body),
            body,
            confidence,
            suggestion,
        });
    }

    comments
}

/// Severity from keywords: "Critical" is an error, "Major" a warning,
/// anything else informational
fn derive_severity(body: &str) -> Severity {
    if body.contains("Critical") {
        Severity::Error
    } else if body.contains("Major") {
        Severity::Warning
    } else {
        Severity::Info
    }
}

/// Heuristic for a response cut off mid-generation
fn looks_truncated(raw: &str) -> bool {
    let trimmed = raw.trim_end();
    !trimmed.is_empty() && !trimmed.contains("VERDICT:") && !trimmed.ends_with('.')
}
