// crates/agnus/src/review/filter.rs
// Precision filter: drop comments below the confidence threshold

use crate::vcs::ReviewComment;

/// Apply the confidence threshold.
///
/// Comments at or above the threshold pass; comments without a confidence
/// score pass for backwards compatibility; everything else is dropped.
/// Returns the survivors and the number dropped.
pub fn apply_precision_filter(
    comments: Vec<ReviewComment>,
    threshold: f32,
) -> (Vec<ReviewComment>, usize) {
    let before = comments.len();
    let kept: Vec<ReviewComment> = comments
        .into_iter()
        .filter(|comment| match comment.confidence {
            Some(confidence) => confidence >= threshold,
            None => true,
        })
        .collect();
    let dropped = before - kept.len();
    if dropped > 0 {
        tracing::debug!(dropped, threshold, "Precision filter dropped comments");
    }
    (kept, dropped)
}
