// crates/agnus/src/review/mod.rs
// Review orchestrator: drives a single PR review end to end

pub mod checkpoint;
pub mod dedup;
pub mod filter;
pub mod parser;
pub mod prompt;
pub mod skills;

use std::sync::Arc;

use crate::config::{ReviewSettings, ignore as ignore_rules};
use crate::diff::render_unified;
use crate::diff::unified::{added_lines_by_file, annotate_for_llm};
use crate::embeddings::EmbeddingClient;
use crate::error::{AgnusError, Result};
use crate::feedback::FeedbackSigner;
use crate::llm::LlmClient;
use crate::retriever::Retriever;
use crate::storage::Storage;
use crate::vcs::{ReviewResult, ReviewVerdict, VcsClient};

use self::checkpoint::{Checkpoint, CheckpointScan, find_checkpoint};
use self::dedup::{CommentGate, comment_fingerprint, fingerprint_marker, validate_and_dedup};
use self::filter::apply_precision_filter;
use self::parser::parse_response;
use self::prompt::build_prompt;
use self::skills::{Skill, matching_skills};

/// Summary used when every finding was filtered or validated away
const NO_ISSUES_SUMMARY: &str = "No significant issues found.";

/// Outcome of one review run
#[derive(Debug)]
pub struct ReviewOutcome {
    pub posted: usize,
    pub dropped: usize,
    pub summary: String,
    pub verdict: ReviewVerdict,
    /// True when an incremental run found no commits since the checkpoint
    pub skipped_no_new_commits: bool,
}

impl ReviewOutcome {
    fn skipped() -> Self {
        Self {
            posted: 0,
            dropped: 0,
            summary: "No new commits since the last review.".to_string(),
            verdict: ReviewVerdict::Comment,
            skipped_no_new_commits: true,
        }
    }
}

/// Drives a single PR review: fetch, retrieve, prompt, parse, filter,
/// validate, deduplicate, post, checkpoint.
pub struct ReviewOrchestrator {
    vcs: Arc<dyn VcsClient>,
    llm: Arc<dyn LlmClient>,
    retriever: Option<Arc<Retriever>>,
    storage: Option<Arc<Storage>>,
    embeddings: Option<Arc<EmbeddingClient>>,
    signer: Option<FeedbackSigner>,
    skills: Vec<Skill>,
    settings: ReviewSettings,
    repo_id: String,
}

impl ReviewOrchestrator {
    pub fn new(
        vcs: Arc<dyn VcsClient>,
        llm: Arc<dyn LlmClient>,
        settings: ReviewSettings,
        repo_id: impl Into<String>,
    ) -> Self {
        Self {
            vcs,
            llm,
            retriever: None,
            storage: None,
            embeddings: None,
            signer: None,
            skills: Vec::new(),
            settings,
            repo_id: repo_id.into(),
        }
    }

    /// Attach a retriever; without one the review degrades to flat-diff mode
    pub fn with_retriever(mut self, retriever: Arc<Retriever>) -> Self {
        self.retriever = Some(retriever);
        self
    }

    /// Attach storage so reviews, comments and embeddings persist
    pub fn with_storage(mut self, storage: Arc<Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    /// Attach an embedding client for comment-history RAG
    pub fn with_embeddings(mut self, embeddings: Arc<EmbeddingClient>) -> Self {
        self.embeddings = Some(embeddings);
        self
    }

    /// Attach a feedback signer; without one feedback links are omitted
    pub fn with_signer(mut self, signer: FeedbackSigner) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Attach loaded skill snippets
    pub fn with_skills(mut self, skills: Vec<Skill>) -> Self {
        self.skills = skills;
        self
    }

    /// Full review of the PR's entire diff
    pub async fn review_pr(&self, pr_id: &str) -> Result<ReviewOutcome> {
        self.run(pr_id, false).await
    }

    /// Incremental review: only commits since the stored checkpoint
    pub async fn review_pr_incremental(&self, pr_id: &str) -> Result<ReviewOutcome> {
        self.run(pr_id, true).await
    }

    async fn run(&self, pr_id: &str, incremental: bool) -> Result<ReviewOutcome> {
        let pr = self
            .vcs
            .get_pr(pr_id)
            .await
            .map_err(|e| AgnusError::Vcs(e.to_string()))?;
        let existing_comments = self
            .vcs
            .get_comments(pr_id)
            .await
            .map_err(|e| AgnusError::Vcs(e.to_string()))?;

        // The checkpoint pins the incremental boundary; a full review still
        // reuses its comment for the upsert
        let mut since_sha: Option<String> = None;
        let mut checkpoint_comment_id: Option<i64> = None;
        match find_checkpoint(&existing_comments) {
            CheckpointScan::Found {
                checkpoint,
                comment_id,
            } => {
                checkpoint_comment_id = Some(comment_id);
                if incremental {
                    if checkpoint.sha == pr.head_sha {
                        tracing::info!(pr = pr_id, sha = %pr.head_sha, "No new commits since checkpoint");
                        return Ok(ReviewOutcome::skipped());
                    }
                    since_sha = Some(checkpoint.sha);
                }
            }
            CheckpointScan::Malformed { comment_id } => {
                // Warned inside find_checkpoint; fall back to a full review
                checkpoint_comment_id = Some(comment_id);
            }
            CheckpointScan::Absent => {}
        }

        let diffs = self
            .vcs
            .get_diff(pr_id, since_sha.as_deref())
            .await
            .map_err(|e| AgnusError::Vcs(e.to_string()))?;

        // Binary, lock and generated files receive no comments; config/data
        // files stay in
        let reviewable: Vec<_> = diffs
            .into_iter()
            .filter(|d| ignore_rules::is_reviewable(&d.path))
            .collect();
        let changed_files: Vec<String> = reviewable.iter().map(|d| d.path.clone()).collect();

        if reviewable.is_empty() {
            tracing::info!(pr = pr_id, "No reviewable files in diff");
            return Ok(ReviewOutcome {
                posted: 0,
                dropped: 0,
                summary: NO_ISSUES_SUMMARY.to_string(),
                verdict: ReviewVerdict::Comment,
                skipped_no_new_commits: false,
            });
        }

        let unified = render_unified(&reviewable);

        // Review context from the graph, or flat-diff degradation
        let context_md = match &self.retriever {
            Some(retriever) => retriever
                .build_context(&unified, self.settings.depth)
                .await?
                .render(),
            None => String::new(),
        };

        let matched_skills = matching_skills(&self.skills, &changed_files);
        let annotated = annotate_for_llm(&unified);
        let prompt = build_prompt(&pr, &annotated, &context_md, &matched_skills, &self.settings);

        let raw = self
            .llm
            .generate(&prompt)
            .await
            .map_err(|e| AgnusError::Llm(e.to_string()))?;

        let parsed = parse_response(&raw);
        let had_findings = !parsed.comments.is_empty();

        let (kept, filter_dropped) =
            apply_precision_filter(parsed.comments, self.settings.confidence_threshold);

        let added = added_lines_by_file(&unified);
        let gate = CommentGate::from_existing(&existing_comments);
        let kept_count = kept.len();
        let valid = validate_and_dedup(kept, &changed_files, &added, &gate);
        let dropped = filter_dropped + (kept_count - valid.len());

        let summary = if had_findings && valid.is_empty() {
            NO_ISSUES_SUMMARY.to_string()
        } else {
            parsed.summary
        };

        // Persist and decorate before posting so feedback links carry ids
        let mut decorated = Vec::with_capacity(valid.len());
        let posted_count = valid.len();
        for mut comment in valid {
            let fingerprint = comment_fingerprint(
                &crate::utils::normalize_diff_path(&comment.path),
                comment.line,
                &comment.body,
            );

            let stored_id = if let Some(storage) = &self.storage {
                match storage
                    .insert_review_comment(
                        &self.repo_id,
                        pr_id,
                        &fingerprint,
                        &comment.path,
                        comment.line,
                        &comment.body,
                        comment.severity.as_str(),
                        comment.confidence,
                    )
                    .await
                {
                    Ok(id) => {
                        if let Some(embeddings) = &self.embeddings {
                            self.embed_comment(storage, embeddings, id, &comment.body).await;
                        }
                        Some(id)
                    }
                    Err(e) => {
                        return Err(AgnusError::Storage(e.to_string()));
                    }
                }
            } else {
                None
            };

            let mut body = comment.body.clone();
            if let (Some(signer), Some(id)) = (&self.signer, stored_id)
                && let Some(links) = signer.feedback_footer(id)
            {
                body.push_str("\n\n");
                body.push_str(&links);
            }
            body.push('\n');
            body.push_str(&fingerprint_marker(&fingerprint));
            comment.body = body;
            decorated.push(comment);
        }

        let review = ReviewResult {
            summary: summary.clone(),
            comments: decorated,
            verdict: parsed.verdict,
        };
        self.vcs
            .submit_review(pr_id, &review)
            .await
            .map_err(|e| AgnusError::Vcs(e.to_string()))?;

        if let Some(storage) = &self.storage
            && let Err(e) = storage
                .insert_review(
                    &self.repo_id,
                    pr_id,
                    &pr.head_sha,
                    parsed.verdict.as_str(),
                    &summary,
                    posted_count,
                )
                .await
        {
            tracing::warn!(error = %e, "Failed to persist review record");
        }

        self.upsert_checkpoint(pr_id, &pr.head_sha, &changed_files, posted_count, parsed.verdict, &summary, checkpoint_comment_id)
            .await;

        Ok(ReviewOutcome {
            posted: posted_count,
            dropped,
            summary,
            verdict: parsed.verdict,
            skipped_no_new_commits: false,
        })
    }

    async fn embed_comment(
        &self,
        storage: &Storage,
        embeddings: &EmbeddingClient,
        comment_id: i64,
        body: &str,
    ) {
        if let Err(e) = storage.ensure_vector_dim(embeddings.dimensions()).await {
            tracing::warn!(error = %e, "Vector store unavailable; comment not embedded");
            return;
        }
        match embeddings.embed(body).await {
            Ok(vector) => {
                if let Err(e) = storage
                    .upsert_comment_embedding(comment_id, &self.repo_id, vector)
                    .await
                {
                    tracing::warn!(comment_id, error = %e, "Failed to store comment embedding");
                }
            }
            Err(e) => {
                tracing::warn!(comment_id, error = %e, "Failed to embed comment body");
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert_checkpoint(
        &self,
        pr_id: &str,
        head_sha: &str,
        files: &[String],
        comment_count: usize,
        verdict: ReviewVerdict,
        summary: &str,
        existing_comment_id: Option<i64>,
    ) {
        let checkpoint = Checkpoint::new(
            head_sha,
            files.to_vec(),
            comment_count,
            verdict.as_str(),
        );
        let body = match checkpoint.encode(summary) {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to encode checkpoint");
                return;
            }
        };

        let result = match existing_comment_id {
            Some(comment_id) => self.vcs.update_comment(pr_id, comment_id, &body).await,
            None => self.vcs.post_comment(pr_id, &body).await.map(|_| ()),
        };
        if let Err(e) = result {
            tracing::warn!(pr = pr_id, error = %e, "Failed to upsert checkpoint comment");
        }
    }
}
