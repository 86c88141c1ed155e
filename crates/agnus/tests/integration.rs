//! End-to-end tests for the review pipeline: indexing, retrieval and the
//! review orchestrator, using mock VCS and LLM implementations and an
//! in-memory database.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

use agnus::cache::GraphCache;
use agnus::config::ReviewSettings;
use agnus::diff::myers::compute_file_diff;
use agnus::diff::{FileDiff, render_unified};
use agnus::graph::SymbolGraph;
use agnus::indexer::{Indexer, ProgressSender};
use agnus::llm::{LlmClient, Provider};
use agnus::retriever::{Retriever, ReviewDepth};
use agnus::review::ReviewOrchestrator;
use agnus::storage::Storage;
use agnus::vcs::{
    FileInfo, PrComment, PullRequest, ReviewResult, Severity, VcsClient, infer_language,
};

// ============================================================================
// Mocks
// ============================================================================

#[derive(Default)]
struct MockVcsState {
    comments: Vec<PrComment>,
    next_comment_id: i64,
    submitted_reviews: Vec<ReviewResult>,
}

struct MockVcs {
    pr: PullRequest,
    diffs: Vec<FileDiff>,
    state: Mutex<MockVcsState>,
}

impl MockVcs {
    fn new(pr: PullRequest, diffs: Vec<FileDiff>) -> Self {
        Self {
            pr,
            diffs,
            state: Mutex::new(MockVcsState {
                next_comment_id: 1,
                ..MockVcsState::default()
            }),
        }
    }

    async fn inline_comment_count(&self) -> usize {
        self.state
            .lock()
            .await
            .comments
            .iter()
            .filter(|c| c.path.is_some())
            .count()
    }

    async fn all_comments(&self) -> Vec<PrComment> {
        self.state.lock().await.comments.clone()
    }
}

#[async_trait]
impl VcsClient for MockVcs {
    async fn get_pr(&self, _pr_id: &str) -> Result<PullRequest> {
        Ok(self.pr.clone())
    }

    async fn get_diff(&self, _pr_id: &str, _since_sha: Option<&str>) -> Result<Vec<FileDiff>> {
        Ok(self.diffs.clone())
    }

    async fn get_files(&self, _pr_id: &str) -> Result<Vec<FileInfo>> {
        Ok(self
            .diffs
            .iter()
            .map(|d| FileInfo {
                path: d.path.clone(),
                language: infer_language(&d.path).map(|l| l.to_string()),
            })
            .collect())
    }

    async fn get_file_content(&self, _path: &str, _git_ref: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn add_inline_comment(
        &self,
        _pr_id: &str,
        path: &str,
        line: u32,
        body: &str,
        _severity: Severity,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let id = state.next_comment_id;
        state.next_comment_id += 1;
        state.comments.push(PrComment {
            id,
            body: body.to_string(),
            path: Some(path.to_string()),
            line: Some(line),
            replies: vec![],
        });
        Ok(())
    }

    async fn submit_review(&self, pr_id: &str, review: &ReviewResult) -> Result<()> {
        for comment in &review.comments {
            self.add_inline_comment(pr_id, &comment.path, comment.line, &comment.body, comment.severity)
                .await?;
        }
        self.state.lock().await.submitted_reviews.push(review.clone());
        Ok(())
    }

    async fn get_comments(&self, _pr_id: &str) -> Result<Vec<PrComment>> {
        Ok(self.state.lock().await.comments.clone())
    }

    async fn post_comment(&self, _pr_id: &str, body: &str) -> Result<i64> {
        let mut state = self.state.lock().await;
        let id = state.next_comment_id;
        state.next_comment_id += 1;
        state.comments.push(PrComment {
            id,
            body: body.to_string(),
            path: None,
            line: None,
            replies: vec![],
        });
        Ok(id)
    }

    async fn update_comment(&self, _pr_id: &str, comment_id: i64, body: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(comment) = state.comments.iter_mut().find(|c| c.id == comment_id) {
            comment.body = body.to_string();
        }
        Ok(())
    }
}

struct MockLlm {
    response: String,
    calls: AtomicUsize,
}

impl MockLlm {
    fn new(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            calls: AtomicUsize::new(0),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn generate(&self, _prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.response.clone())
    }

    fn provider(&self) -> Provider {
        Provider::DeepSeek
    }
}

// ============================================================================
// Fixtures
// ============================================================================

fn sample_pr() -> PullRequest {
    PullRequest {
        id: "42".to_string(),
        title: "Refactor order validation".to_string(),
        description: "Tightens the validation path. PROJ-7".to_string(),
        author: "dev".to_string(),
        head_sha: "headsha1".to_string(),
        base_sha: "basesha1".to_string(),
        source_branch: "feature/validation".to_string(),
        target_branch: "main".to_string(),
    }
}

/// A one-file diff replacing a line in src/a.ts
fn sample_diffs() -> Vec<FileDiff> {
    let old = "function validate(order) {\n  return true;\n}\n";
    let new = "function validate(order) {\n  return order.total > 0;\n}\n";
    vec![compute_file_diff("src/a.ts", old, new, 8000)]
}

fn llm_response_for_line2() -> String {
    "SUMMARY: One real issue in the validation path.\n\n\
     [File: src/a.ts, Line: 2]\n\
     Major: this silently accepts zero-item orders with a negative total. [Confidence: 0.9]\n\n\
     VERDICT: request_changes\n"
        .to_string()
}

async fn write_module_x(dir: &Path, renamed: bool) {
    let body = if renamed {
        "def alpha():\n    beta()\n\ndef beta():\n    pass\n\ndef gamma_renamed():\n    pass\n\ndef delta():\n    pass\n"
    } else {
        "def alpha():\n    beta()\n\ndef beta():\n    pass\n\ndef gamma():\n    pass\n\ndef delta():\n    pass\n\ndef epsilon():\n    pass\n"
    };
    tokio::fs::write(dir.join("module_x.py"), body).await.unwrap();
}

// ============================================================================
// Indexing scenarios
// ============================================================================

#[tokio::test]
async fn incremental_index_replaces_file_symbols() {
    let dir = tempfile::TempDir::new().unwrap();
    write_module_x(dir.path(), false).await;
    // A second file calling into module_x
    tokio::fs::write(
        dir.path().join("caller.py"),
        "def caller():\n    gamma()\n",
    )
    .await
    .unwrap();

    let storage = Arc::new(Storage::open_in_memory("incremental_e2e").await.unwrap());
    let indexer = Indexer::new(storage.clone(), None, "repo-1", "main");
    let mut graph = SymbolGraph::new();

    let stats = indexer
        .full_index(dir.path(), &mut graph, &ProgressSender::disabled())
        .await
        .unwrap();
    assert_eq!(stats.files, 2);
    assert_eq!(graph.symbols_in_file("module_x.py").len(), 5);
    // caller -> gamma resolves
    assert_eq!(graph.get_callers("module_x.py:gamma", 1).len(), 1);

    // Rewrite module_x with 4 symbols, gamma renamed
    write_module_x(dir.path(), true).await;
    indexer
        .incremental_update(
            dir.path(),
            &mut graph,
            &["module_x.py".to_string()],
            &ProgressSender::disabled(),
        )
        .await
        .unwrap();

    let names: Vec<String> = graph
        .symbols_in_file("module_x.py")
        .iter()
        .map(|s| s.qualified_name.clone())
        .collect();
    assert_eq!(names.len(), 4);
    assert!(names.contains(&"gamma_renamed".to_string()));
    assert!(!names.contains(&"gamma".to_string()));
    assert!(!names.contains(&"epsilon".to_string()));

    // The old symbol id is gone, and the caller's edge to it no longer
    // resolves
    assert!(graph.get_symbol("module_x.py:gamma").is_none());
    assert!(graph.get_callees("caller.py:caller", 1).is_empty());

    // The snapshot reflects the updated graph
    let blob = storage.load_snapshot("repo-1", "main").await.unwrap().unwrap();
    let restored = SymbolGraph::deserialize(&blob).unwrap();
    assert_eq!(restored.symbols_in_file("module_x.py").len(), 4);
}

#[tokio::test]
async fn full_index_emits_progress_and_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(dir.path().join("app.ts"), "function main() { helper(); }\nfunction helper() {}\n")
        .await
        .unwrap();

    let storage = Arc::new(Storage::open_in_memory("progress_e2e").await.unwrap());
    let indexer = Indexer::new(storage.clone(), None, "repo-1", "main");
    let mut graph = SymbolGraph::new();

    let (sender, mut rx) = ProgressSender::channel(64);
    indexer
        .full_index(dir.path(), &mut graph, &sender)
        .await
        .unwrap();

    let mut saw_parsing = false;
    let mut saw_done = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            agnus::indexer::IndexProgress::Parsing { file, .. } => {
                assert_eq!(file, "app.ts");
                saw_parsing = true;
            }
            agnus::indexer::IndexProgress::Done { symbol_count, edge_count, .. } => {
                assert_eq!(symbol_count, 2);
                assert_eq!(edge_count, 1);
                saw_done = true;
            }
            _ => {}
        }
    }
    assert!(saw_parsing);
    assert!(saw_done);
    assert!(storage.load_snapshot("repo-1", "main").await.unwrap().is_some());
}

#[tokio::test]
async fn graph_cache_round_trip_through_snapshot() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(
        dir.path().join("svc.go"),
        "package main\n\nfunc Handle() {\n    process()\n}\n\nfunc process() {}\n",
    )
    .await
    .unwrap();

    let storage = Arc::new(Storage::open_in_memory("cache_e2e").await.unwrap());
    let cache = GraphCache::new(storage.clone(), None);

    // First access runs a full index (no snapshot yet)
    let entry = cache
        .get_or_load("repo-1", "main", dir.path(), &ProgressSender::disabled())
        .await
        .unwrap();
    assert_eq!(entry.graph.read().await.symbol_count(), 2);

    // A second cache on the same storage loads from the snapshot
    let cache2 = GraphCache::new(storage.clone(), None);
    let entry2 = cache2
        .get_or_load("repo-1", "main", dir.path(), &ProgressSender::disabled())
        .await
        .unwrap();
    assert_eq!(entry2.graph.read().await.symbol_count(), 2);
    assert_eq!(entry2.graph.read().await.edge_count(), 1);
}

// ============================================================================
// Review orchestration scenarios
// ============================================================================

fn settings() -> ReviewSettings {
    ReviewSettings::default()
}

#[tokio::test]
async fn review_posts_valid_comment_and_checkpoint() {
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    let llm = Arc::new(MockLlm::new(llm_response_for_line2()));
    let storage = Arc::new(Storage::open_in_memory("review_post_e2e").await.unwrap());

    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm.clone(), settings(), "repo-1")
        .with_storage(storage.clone());

    let outcome = orchestrator.review_pr("42").await.unwrap();
    assert_eq!(outcome.posted, 1);
    assert!(!outcome.skipped_no_new_commits);
    assert_eq!(vcs.inline_comment_count().await, 1);

    // Posted comment lands on an added line of the diff
    let comments = vcs.all_comments().await;
    let inline = comments.iter().find(|c| c.path.is_some()).unwrap();
    assert_eq!(inline.path.as_deref(), Some("src/a.ts"));
    assert_eq!(inline.line, Some(2));
    // Confidence markers never reach the host
    assert!(!inline.body.contains("[Confidence"));

    // A sentinel-wrapped checkpoint comment exists and carries the head sha
    let checkpoint = comments
        .iter()
        .find(|c| c.body.contains("AGNUSAI_CHECKPOINT"))
        .expect("checkpoint comment posted");
    assert!(checkpoint.body.contains("headsha1"));
}

#[tokio::test]
async fn hallucinated_path_is_dropped() {
    let response = "SUMMARY: sketchy.\n\n\
        [File: src/b.ts, Line: 10]\n\
        Critical: made-up file. [Confidence: 0.95]\n\n\
        [File: src/a.ts, Line: 2]\n\
        Major: real file. [Confidence: 0.9]\n\n\
        VERDICT: comment\n";
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    let llm = Arc::new(MockLlm::new(response));

    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm, settings(), "repo-1");
    let outcome = orchestrator.review_pr("42").await.unwrap();

    assert_eq!(outcome.posted, 1);
    assert_eq!(outcome.dropped, 1);
    let comments = vcs.all_comments().await;
    assert!(comments.iter().all(|c| c.path.as_deref() != Some("src/b.ts")));
}

#[tokio::test]
async fn precision_filter_drops_low_confidence_end_to_end() {
    let response = "SUMMARY: three findings.\n\n\
        [File: src/a.ts, Line: 2]\n\
        First finding. [Confidence: 0.92]\n\n\
        [File: src/a.ts, Line: 2]\n\
        Second finding. [Confidence: 0.60]\n\n\
        [File: src/a.ts, Line: 2]\n\
        Third finding. [Confidence: 0.80]\n\n\
        VERDICT: comment\n";
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    let llm = Arc::new(MockLlm::new(response));

    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm, settings(), "repo-1");
    let outcome = orchestrator.review_pr("42").await.unwrap();

    // 0.92 and 0.80 pass the 0.7 threshold; 0.60 is dropped
    assert_eq!(outcome.posted, 2);
    assert_eq!(vcs.inline_comment_count().await, 2);
}

#[tokio::test]
async fn replaying_identical_response_posts_nothing_new() {
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    let llm = Arc::new(MockLlm::new(llm_response_for_line2()));

    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm.clone(), settings(), "repo-1");

    let first = orchestrator.review_pr("42").await.unwrap();
    assert_eq!(first.posted, 1);
    assert_eq!(vcs.inline_comment_count().await, 1);

    // Same LLM output again: the fingerprint gate suppresses the repost
    let second = orchestrator.review_pr("42").await.unwrap();
    assert_eq!(second.posted, 0);
    assert_eq!(vcs.inline_comment_count().await, 1);
    assert_eq!(llm.call_count(), 2);
}

#[tokio::test]
async fn incremental_rerun_at_same_head_skips() {
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    let llm = Arc::new(MockLlm::new(llm_response_for_line2()));

    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm.clone(), settings(), "repo-1");

    // First review writes a checkpoint for headsha1
    orchestrator.review_pr("42").await.unwrap();
    assert_eq!(llm.call_count(), 1);

    // Incremental re-run at the unchanged head exits without an LLM call
    let outcome = orchestrator.review_pr_incremental("42").await.unwrap();
    assert!(outcome.skipped_no_new_commits);
    assert_eq!(outcome.posted, 0);
    assert_eq!(llm.call_count(), 1);
    assert_eq!(vcs.inline_comment_count().await, 1);
}

#[tokio::test]
async fn corrupted_checkpoint_falls_back_to_full_review() {
    let vcs = Arc::new(MockVcs::new(sample_pr(), sample_diffs()));
    // Seed a corrupted checkpoint comment
    vcs.post_comment("42", "<!-- AGNUSAI_CHECKPOINT: {\"sha\":\"headsha1\",  broken json -->\nold summary")
        .await
        .unwrap();

    let llm = Arc::new(MockLlm::new(llm_response_for_line2()));
    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm.clone(), settings(), "repo-1");

    // Incremental would normally skip at the same head sha, but the
    // malformed checkpoint forces a full review
    let outcome = orchestrator.review_pr_incremental("42").await.unwrap();
    assert!(!outcome.skipped_no_new_commits);
    assert_eq!(outcome.posted, 1);
    assert_eq!(llm.call_count(), 1);

    // The corrupted comment was replaced by a valid checkpoint in place
    let comments = vcs.all_comments().await;
    let checkpoints: Vec<_> = comments
        .iter()
        .filter(|c| c.body.contains("AGNUSAI_CHECKPOINT"))
        .collect();
    assert_eq!(checkpoints.len(), 1);
    assert!(checkpoints[0].body.contains("\"filesReviewed\""));
}

#[tokio::test]
async fn lock_and_generated_files_are_not_reviewed() {
    let mut diffs = sample_diffs();
    diffs.push(compute_file_diff("package-lock.json", "{}", "{\"a\":1}", 8000));
    diffs.push(compute_file_diff("dist/app.min.js", "x", "y", 8000));
    let response = "SUMMARY: s\n\n\
        [File: package-lock.json, Line: 1]\n\
        Lockfile churn. [Confidence: 0.99]\n\n\
        [File: src/a.ts, Line: 2]\n\
        Real finding. [Confidence: 0.9]\n\n\
        VERDICT: comment\n";

    let vcs = Arc::new(MockVcs::new(sample_pr(), diffs));
    let llm = Arc::new(MockLlm::new(response));
    let orchestrator = ReviewOrchestrator::new(vcs.clone(), llm, settings(), "repo-1");

    let outcome = orchestrator.review_pr("42").await.unwrap();
    assert_eq!(outcome.posted, 1);
    let comments = vcs.all_comments().await;
    assert!(comments
        .iter()
        .all(|c| c.path.as_deref() != Some("package-lock.json")));
}

// ============================================================================
// Retriever over an indexed tree
// ============================================================================

#[tokio::test]
async fn retriever_surfaces_callers_of_changed_file() {
    let dir = tempfile::TempDir::new().unwrap();
    tokio::fs::write(
        dir.path().join("util.py"),
        "def util_a():\n    pass\n",
    )
    .await
    .unwrap();
    tokio::fs::write(
        dir.path().join("handlers.py"),
        "def handler_b():\n    util_a()\n\ndef handler_c():\n    util_a()\n",
    )
    .await
    .unwrap();
    tokio::fs::write(
        dir.path().join("router.py"),
        "def router_e():\n    handler_b()\n",
    )
    .await
    .unwrap();

    let storage = Arc::new(Storage::open_in_memory("retriever_e2e").await.unwrap());
    let cache = GraphCache::new(storage.clone(), None);
    let entry = cache
        .get_or_load("repo-1", "main", dir.path(), &ProgressSender::disabled())
        .await
        .unwrap();

    let old = "def util_a():\n    pass\n";
    let new = "def util_a():\n    return None\n";
    let diff = render_unified(&[compute_file_diff("util.py", old, new, 8000)]);

    let retriever: &Retriever = &entry.retriever;
    let context = retriever
        .build_context(&diff, ReviewDepth::Standard)
        .await
        .unwrap();

    assert_eq!(context.changed_symbols.len(), 1);
    assert_eq!(context.changed_symbols[0].qualified_name, "util_a");

    let caller_names: Vec<&str> = context
        .callers
        .iter()
        .map(|s| s.qualified_name.as_str())
        .collect();
    assert!(caller_names.contains(&"handler_b"));
    assert!(caller_names.contains(&"handler_c"));
    assert!(caller_names.contains(&"router_e"));

    // Blast radius: 2 direct callers, 1 transitive, 2 affected files
    assert_eq!(context.blast_radius.direct_callers.len(), 2);
    assert_eq!(context.blast_radius.transitive_callers.len(), 1);
    assert_eq!(context.blast_radius.affected_files.len(), 2);
    // 10*2 + 5*2 = 30
    assert_eq!(context.blast_radius.risk_score, 30);

    // Rendered context names the spec'd sections
    let rendered = context.render();
    assert!(rendered.contains("## Codebase Context"));
    assert!(rendered.contains("### Changed Symbols"));
    assert!(rendered.contains("### Direct Callers (1 hop)"));
    assert!(rendered.contains("### Transitive Callers (2 hops)"));
}
