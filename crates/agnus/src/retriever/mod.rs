// crates/agnus/src/retriever/mod.rs
// Assembles the review context for a diff: changed symbols, graph
// neighbourhood, blast radius, semantic neighbours and rated prior examples

use std::collections::HashSet;
use std::sync::Arc;

use regex::Regex;
use std::sync::LazyLock;
use tokio::sync::RwLock;

use crate::diff::unified::changed_paths;
use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::graph::{BlastRadius, Symbol, SymbolGraph};
use crate::storage::Storage;
use crate::utils::{distance_to_score, truncate_at_boundary};

/// Semantic neighbour candidates fetched from the vector index
const NEIGHBOR_TOP_K: usize = 10;
/// Accepted prior examples injected into the prompt
const ACCEPTED_EXAMPLES: usize = 5;
/// Rejected prior examples injected into the prompt
const REJECTED_EXAMPLES: usize = 3;
/// Over-fetch factor for the comment search before the signal join
const COMMENT_FETCH: usize = 24;
/// Diff characters embedded for prior-example retrieval
const DIFF_EMBED_CHARS: usize = 8_000;
/// Graph-distance search bound; anything unreachable within it scores at
/// the cap
const DISTANCE_MAX_HOPS: u32 = 2;
const DISTANCE_CAP: u32 = 3;
/// Symbols rendered per context section, keeping the prompt near its token
/// budget
const SECTION_LIMIT: usize = 12;

/// Analysis depth selected per review
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewDepth {
    Fast,
    Standard,
    Deep,
}

impl ReviewDepth {
    /// Caller-BFS hop count for this depth
    pub fn hops(&self) -> u32 {
        match self {
            Self::Fast => 1,
            Self::Standard | Self::Deep => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "fast" => Some(Self::Fast),
            "standard" => Some(Self::Standard),
            "deep" => Some(Self::Deep),
            _ => None,
        }
    }
}

/// A prior review comment rated by a developer, retrieved as style guidance
#[derive(Debug, Clone)]
pub struct RatedExample {
    pub body: String,
    pub file_path: String,
    pub score: f32,
}

/// Everything the orchestrator injects into the prompt for one review
#[derive(Debug, Default)]
pub struct ReviewContext {
    pub changed_symbols: Vec<Symbol>,
    pub callers: Vec<Symbol>,
    pub callees: Vec<Symbol>,
    pub blast_radius: BlastRadius,
    pub semantic_neighbors: Vec<(Symbol, f32)>,
    pub prior_examples: Vec<RatedExample>,
    pub rejected_examples: Vec<RatedExample>,
}

impl ReviewContext {
    pub fn is_empty(&self) -> bool {
        self.changed_symbols.is_empty()
            && self.callers.is_empty()
            && self.callees.is_empty()
            && self.prior_examples.is_empty()
            && self.rejected_examples.is_empty()
    }

    /// Serialize to the "Codebase Context" markdown section. One line per
    /// symbol keeps the aggregate near the context token budget.
    pub fn render(&self) -> String {
        if self.is_empty() {
            return String::new();
        }

        let mut out = String::from("## Codebase Context\n");

        let line = |s: &Symbol| format!("- {} ({}) {}\n", s.qualified_name, s.kind, s.signature);

        if !self.changed_symbols.is_empty() {
            out.push_str("\n### Changed Symbols\n");
            for s in self.changed_symbols.iter().take(SECTION_LIMIT) {
                out.push_str(&line(s));
            }
        }

        if !self.blast_radius.affected_files.is_empty() || self.blast_radius.risk_score > 0 {
            out.push_str(&format!(
                "\n### Blast Radius (risk score {}/100)\nAffected files: {}\n",
                self.blast_radius.risk_score,
                self.blast_radius.affected_files.join(", ")
            ));
        }

        if !self.blast_radius.direct_callers.is_empty() {
            out.push_str("\n### Direct Callers (1 hop)\n");
            for s in self.blast_radius.direct_callers.iter().take(SECTION_LIMIT) {
                out.push_str(&line(s));
            }
        }

        if !self.blast_radius.transitive_callers.is_empty() {
            out.push_str("\n### Transitive Callers (2 hops)\n");
            for s in self
                .blast_radius
                .transitive_callers
                .iter()
                .take(SECTION_LIMIT)
            {
                out.push_str(&line(s));
            }
        }

        if !self.callees.is_empty() {
            out.push_str("\n### Callees\n");
            for s in self.callees.iter().take(SECTION_LIMIT) {
                out.push_str(&line(s));
            }
        }

        if !self.semantic_neighbors.is_empty() {
            out.push_str("\n### Semantic Neighbors\n");
            for (s, score) in self.semantic_neighbors.iter().take(SECTION_LIMIT) {
                out.push_str(&format!(
                    "- {} ({}) {} [relevance {:.2}]\n",
                    s.qualified_name, s.kind, s.signature, score
                ));
            }
        }

        if !self.prior_examples.is_empty() {
            out.push_str("\n### Examples your team found helpful\n");
            for example in &self.prior_examples {
                out.push_str(&format!("- [{}] {}\n", example.file_path, example.body));
            }
        }

        if !self.rejected_examples.is_empty() {
            out.push_str("\n### Examples your team found NOT helpful\n");
            for example in &self.rejected_examples {
                out.push_str(&format!("- [{}] {}\n", example.file_path, example.body));
            }
        }

        out
    }
}

/// Builds review contexts against one (repo, branch) graph
pub struct Retriever {
    graph: Arc<RwLock<SymbolGraph>>,
    storage: Arc<Storage>,
    embeddings: Option<Arc<EmbeddingClient>>,
    repo_id: String,
    branch: String,
}

impl Retriever {
    pub fn new(
        graph: Arc<RwLock<SymbolGraph>>,
        storage: Arc<Storage>,
        embeddings: Option<Arc<EmbeddingClient>>,
        repo_id: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            graph,
            storage,
            embeddings,
            repo_id: repo_id.into(),
            branch: branch.into(),
        }
    }

    /// Assemble the context for a raw unified diff. No file contents are
    /// read; everything derives from the graph, the vector index and rated
    /// history.
    pub async fn build_context(&self, diff: &str, depth: ReviewDepth) -> Result<ReviewContext> {
        let paths = changed_paths(diff);
        let hops = depth.hops();

        // Graph-derived sections under a read lock; BFS never suspends
        let (changed_symbols, callers, callees, blast_radius, changed_ids) = {
            let graph = self.graph.read().await;

            let changed_symbols: Vec<Symbol> = paths
                .iter()
                .flat_map(|p| graph.symbols_in_file(p))
                .cloned()
                .collect();
            let changed_ids: Vec<String> =
                changed_symbols.iter().map(|s| s.id.clone()).collect();
            let changed_set: HashSet<&str> = changed_ids.iter().map(|s| s.as_str()).collect();

            let mut callers: Vec<Symbol> = Vec::new();
            let mut seen_callers: HashSet<String> = HashSet::new();
            let mut callees: Vec<Symbol> = Vec::new();
            let mut seen_callees: HashSet<String> = HashSet::new();

            for id in &changed_ids {
                for caller in graph.get_callers(id, hops) {
                    if !changed_set.contains(caller.id.as_str())
                        && seen_callers.insert(caller.id.clone())
                    {
                        callers.push(caller.clone());
                    }
                }
                for callee in graph.get_callees(id, 1) {
                    if !changed_set.contains(callee.id.as_str())
                        && seen_callees.insert(callee.id.clone())
                    {
                        callees.push(callee.clone());
                    }
                }
            }

            let blast_radius = graph.blast_radius(&changed_ids);
            (changed_symbols, callers, callees, blast_radius, changed_ids)
        };

        let semantic_neighbors = if depth == ReviewDepth::Deep && !changed_ids.is_empty() {
            self.semantic_neighbors(&changed_symbols, &changed_ids, &callers, &callees)
                .await?
        } else {
            Vec::new()
        };

        let (prior_examples, rejected_examples) = self.rated_examples(diff).await?;

        Ok(ReviewContext {
            changed_symbols,
            callers,
            callees,
            blast_radius,
            semantic_neighbors,
            prior_examples,
            rejected_examples,
        })
    }

    /// Deep-mode semantic neighbours: embed changed signatures, query the
    /// vector index, re-rank by graph distance, and exclude symbols already
    /// present in the context.
    async fn semantic_neighbors(
        &self,
        changed_symbols: &[Symbol],
        changed_ids: &[String],
        callers: &[Symbol],
        callees: &[Symbol],
    ) -> Result<Vec<(Symbol, f32)>> {
        let Some(embeddings) = &self.embeddings else {
            return Ok(Vec::new());
        };

        let texts: Vec<String> = changed_symbols
            .iter()
            .map(crate::indexer::symbol_embedding_text)
            .collect();
        let vectors = match embeddings.embed_batch(&texts).await {
            Ok(vectors) => vectors,
            Err(e) => {
                tracing::warn!(error = %e, "Neighbor embedding failed; skipping semantic section");
                return Ok(Vec::new());
            }
        };
        let Some(query) = mean_normalized(&vectors) else {
            return Ok(Vec::new());
        };

        let candidates = self
            .storage
            .search_symbol_embeddings(query, &self.repo_id, NEIGHBOR_TOP_K)
            .await
            .map_err(|e| crate::error::AgnusError::Embedding(e.to_string()))?;

        let mut excluded: HashSet<&str> = changed_ids.iter().map(|s| s.as_str()).collect();
        excluded.extend(callers.iter().map(|s| s.id.as_str()));
        excluded.extend(callees.iter().map(|s| s.id.as_str()));

        let graph = self.graph.read().await;
        let seed_set: HashSet<String> = changed_ids.iter().cloned().collect();

        let scored = rerank_neighbors(
            candidates
                .into_iter()
                .map(|(id, dist)| (id, distance_to_score(dist)))
                .collect(),
            |id| graph.min_distance(&seed_set, id, DISTANCE_MAX_HOPS, DISTANCE_CAP),
        );

        let neighbors = scored
            .into_iter()
            .filter(|(id, _)| !excluded.contains(id.as_str()))
            .filter_map(|(id, score)| graph.get_symbol(&id).map(|s| (s.clone(), score)))
            .collect();
        Ok(neighbors)
    }

    /// Prior feedback-rated comments most similar to this diff: the top
    /// accepted and rejected examples, with UI artefacts stripped.
    async fn rated_examples(&self, diff: &str) -> Result<(Vec<RatedExample>, Vec<RatedExample>)> {
        let Some(embeddings) = &self.embeddings else {
            return Ok((Vec::new(), Vec::new()));
        };

        let query_text = truncate_at_boundary(diff, DIFF_EMBED_CHARS);
        if query_text.trim().is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let query = match embeddings.embed(query_text).await {
            Ok(query) => query,
            Err(e) => {
                tracing::warn!(error = %e, "Diff embedding failed; skipping prior examples");
                return Ok((Vec::new(), Vec::new()));
            }
        };

        let hits = self
            .storage
            .search_comment_embeddings(query, &self.repo_id, COMMENT_FETCH)
            .await
            .map_err(|e| crate::error::AgnusError::Embedding(e.to_string()))?;
        if hits.is_empty() {
            return Ok((Vec::new(), Vec::new()));
        }

        let ids: Vec<i64> = hits.iter().map(|(id, _)| *id).collect();
        let rated = self
            .storage
            .rated_comments(ids)
            .await
            .map_err(|e| crate::error::AgnusError::Storage(e.to_string()))?;

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for comment in rated {
            let distance = hits
                .iter()
                .find(|(id, _)| *id == comment.comment_id)
                .map(|(_, d)| *d)
                .unwrap_or(1.0);
            let example = RatedExample {
                body: strip_feedback_links(&comment.body),
                file_path: comment.file_path,
                score: distance_to_score(distance),
            };
            match comment.signal.as_str() {
                "accepted" if accepted.len() < ACCEPTED_EXAMPLES => accepted.push(example),
                "rejected" if rejected.len() < REJECTED_EXAMPLES => rejected.push(example),
                _ => {}
            }
        }

        Ok((accepted, rejected))
    }
}

/// Combine embedding similarity with graph proximity:
/// `score = sim * 1 / (graph_distance + 1)`, sorted descending.
pub(crate) fn rerank_neighbors(
    candidates: Vec<(String, f32)>,
    graph_distance: impl Fn(&str) -> u32,
) -> Vec<(String, f32)> {
    let mut scored: Vec<(String, f32)> = candidates
        .into_iter()
        .map(|(id, sim)| {
            let distance = graph_distance(&id);
            let combined = sim / (distance as f32 + 1.0);
            (id, combined)
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored
}

/// Average a set of vectors and unit-normalise the result
pub(crate) fn mean_normalized(vectors: &[Vec<f32>]) -> Option<Vec<f32>> {
    let first = vectors.first()?;
    let dim = first.len();
    let mut mean = vec![0.0f32; dim];
    let mut count = 0usize;
    for vector in vectors {
        if vector.len() != dim {
            continue;
        }
        for (m, v) in mean.iter_mut().zip(vector) {
            *m += v;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for m in mean.iter_mut() {
        *m /= count as f32;
    }
    let norm = mean.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for m in mean.iter_mut() {
            *m /= norm;
        }
    }
    Some(mean)
}

static FEEDBACK_LINK: LazyLock<Regex> = LazyLock::new(|| {
    // Markdown feedback links and raw feedback URLs injected under posted
    // comments
    Regex::new(r"(?m)^.*\[(?:👍|👎|Helpful|Not helpful)\]\([^)]*\).*$\n?|https?://\S*/feedback\?\S*")
        .expect("feedback link regex")
});

/// Remove feedback-link UI artefacts from a stored comment body before it
/// is injected as an example
pub(crate) fn strip_feedback_links(body: &str) -> String {
    FEEDBACK_LINK.replace_all(body, "").trim().to_string()
}
