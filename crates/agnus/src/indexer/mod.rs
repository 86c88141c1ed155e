// crates/agnus/src/indexer/mod.rs
// Full and incremental indexing: parse -> graph mutation -> storage ->
// embeddings -> snapshot, with progress events

pub mod parsers;
pub mod progress;

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use crate::config::ignore as ignore_rules;
use crate::embeddings::EmbeddingClient;
use crate::error::{AgnusError, Result};
use crate::graph::{Edge, EdgeKind, Symbol, SymbolGraph};
use crate::storage::Storage;
use crate::utils::truncate_at_boundary;

pub use self::parsers::{LanguageParser, PARSERS, ParsedRelation, ParsedSymbol, ParserRegistry};
pub use self::progress::{IndexProgress, ProgressSender};

/// Symbols per embedding request
pub const EMBED_BATCH_SIZE: usize = 32;

/// Max characters of symbol text handed to the embedder
const MAX_EMBED_CHARS: usize = 2_000;

/// Index statistics
#[derive(Debug, Default, Clone)]
pub struct IndexStats {
    pub files: usize,
    pub symbols: usize,
    pub edges: usize,
    pub errors: usize,
    pub skipped: usize,
    pub duration_ms: u64,
}

/// Orchestrates parsing, graph mutation, persistence and embedding for one
/// (repo, branch) pair.
pub struct Indexer {
    storage: Arc<Storage>,
    embeddings: Option<Arc<EmbeddingClient>>,
    repo_id: String,
    branch: String,
}

impl Indexer {
    pub fn new(
        storage: Arc<Storage>,
        embeddings: Option<Arc<EmbeddingClient>>,
        repo_id: impl Into<String>,
        branch: impl Into<String>,
    ) -> Self {
        Self {
            storage,
            embeddings,
            repo_id: repo_id.into(),
            branch: branch.into(),
        }
    }

    /// Index an entire working tree from scratch.
    ///
    /// Existing rows for this (repo, branch) are cleared first so re-triggered
    /// indexes stay idempotent.
    pub async fn full_index(
        &self,
        root: &Path,
        graph: &mut SymbolGraph,
        progress: &ProgressSender,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let mut stats = IndexStats::default();

        let files = collect_files(root, &mut stats);
        tracing::info!(
            repo = %self.repo_id,
            branch = %self.branch,
            files = files.len(),
            "Starting full index"
        );

        self.storage.clear_graph(&self.repo_id, &self.branch).await?;

        let total = files.len();
        for (i, rel_path) in files.iter().enumerate() {
            progress.emit(IndexProgress::Parsing {
                file: rel_path.clone(),
                progress: i + 1,
                total,
            });

            match self.parse_one(root, rel_path) {
                Some((symbols, edges)) => {
                    stats.files += 1;
                    stats.symbols += symbols.len();
                    for symbol in &symbols {
                        graph.add_symbol(symbol.clone());
                    }
                    for edge in &edges {
                        graph.add_edge(edge.clone());
                    }
                    self.storage
                        .persist_file(&self.repo_id, &self.branch, rel_path, symbols, edges)
                        .await?;
                }
                None => {
                    stats.errors += 1;
                }
            }
        }

        graph.resolve_names();
        stats.edges = graph.edge_count();

        let all_ids: Vec<String> = graph
            .all_symbols()
            .map(|s| s.id.clone())
            .collect();
        self.embed_symbols(graph, &all_ids, progress).await;

        self.write_snapshot(graph).await?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        progress.emit(IndexProgress::Done {
            symbol_count: graph.symbol_count(),
            edge_count: stats.edges,
            duration_ms: stats.duration_ms,
        });

        if stats.errors > 0 {
            tracing::warn!(
                files = stats.files,
                symbols = stats.symbols,
                errors = stats.errors,
                "Full index complete with errors"
            );
        } else {
            tracing::info!(
                files = stats.files,
                symbols = stats.symbols,
                edges = stats.edges,
                "Full index complete"
            );
        }
        Ok(stats)
    }

    /// Apply a batch of changed file paths: invalidate, re-parse what still
    /// exists, resolve once, re-embed affected symbols, rewrite the snapshot.
    pub async fn incremental_update(
        &self,
        root: &Path,
        graph: &mut SymbolGraph,
        changed: &[String],
        progress: &ProgressSender,
    ) -> Result<IndexStats> {
        let started = Instant::now();
        let mut stats = IndexStats::default();
        let mut affected_files: Vec<String> = Vec::new();

        let total = changed.len();
        for (i, path) in changed.iter().enumerate() {
            let rel_path = crate::utils::normalize_diff_path(path);
            progress.emit(IndexProgress::Parsing {
                file: rel_path.clone(),
                progress: i + 1,
                total,
            });

            graph.remove_file(&rel_path);
            self.storage
                .delete_file_rows(&self.repo_id, &self.branch, &rel_path)
                .await?;

            if !root.join(&rel_path).is_file() || !PARSERS.supports(&rel_path) {
                stats.skipped += 1;
                continue;
            }

            match self.parse_one(root, &rel_path) {
                Some((symbols, edges)) => {
                    stats.files += 1;
                    stats.symbols += symbols.len();
                    for symbol in &symbols {
                        graph.add_symbol(symbol.clone());
                    }
                    for edge in &edges {
                        graph.add_edge(edge.clone());
                    }
                    self.storage
                        .persist_file(&self.repo_id, &self.branch, &rel_path, symbols, edges)
                        .await?;
                    affected_files.push(rel_path);
                }
                None => {
                    stats.errors += 1;
                }
            }
        }

        graph.resolve_names();
        stats.edges = graph.edge_count();

        let affected_ids: Vec<String> = affected_files
            .iter()
            .flat_map(|f| graph.symbols_in_file(f))
            .map(|s| s.id.clone())
            .collect();
        self.embed_symbols(graph, &affected_ids, progress).await;

        self.write_snapshot(graph).await?;

        stats.duration_ms = started.elapsed().as_millis() as u64;
        progress.emit(IndexProgress::Done {
            symbol_count: graph.symbol_count(),
            edge_count: stats.edges,
            duration_ms: stats.duration_ms,
        });

        Ok(stats)
    }

    /// Parse one file into graph symbols and edges. Parse failures are
    /// absorbed: the file contributes nothing this cycle.
    fn parse_one(&self, root: &Path, rel_path: &str) -> Option<(Vec<Symbol>, Vec<Edge>)> {
        let ext = rel_path.rsplit('.').next()?;
        let parser = PARSERS.by_extension(ext)?;

        let bytes = match std::fs::read(root.join(rel_path)) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(file = rel_path, error = %e, "Failed to read file");
                return None;
            }
        };
        let content = String::from_utf8_lossy(&bytes);

        let (parsed_symbols, relations) = match parsers::parse_with(parser, &content) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!(file = rel_path, error = %e, "Failed to parse file");
                return None;
            }
        };

        Some(self.to_graph_parts(rel_path, parsed_symbols, relations))
    }

    /// Attach file/repo/branch context to parsed declarations and fan
    /// relations out into graph edges with bare-name targets.
    fn to_graph_parts(
        &self,
        rel_path: &str,
        parsed: Vec<ParsedSymbol>,
        relations: Vec<ParsedRelation>,
    ) -> (Vec<Symbol>, Vec<Edge>) {
        let symbols: Vec<Symbol> = parsed
            .into_iter()
            .map(|p| Symbol {
                id: Symbol::make_id(rel_path, &p.qualified_name),
                file_path: rel_path.to_string(),
                name: p.name,
                qualified_name: p.qualified_name,
                kind: p.kind,
                signature: p.signature,
                start_line: p.start_line,
                end_line: p.end_line,
                doc_comment: p.doc_comment,
                repo_id: self.repo_id.clone(),
                branch: self.branch.clone(),
            })
            .collect();

        // File-scope imports attach to the file's top-level declarations,
        // since files themselves are not graph nodes
        let top_level_ids: Vec<&str> = symbols
            .iter()
            .filter(|s| !s.qualified_name.contains('.'))
            .map(|s| s.id.as_str())
            .collect();

        let mut edges = Vec::new();
        for relation in relations {
            match relation {
                ParsedRelation::Call { caller, callee } => {
                    edges.push(Edge::named(
                        Symbol::make_id(rel_path, &caller),
                        callee,
                        EdgeKind::Calls,
                    ));
                }
                ParsedRelation::Inherits { child, parent } => {
                    edges.push(Edge::named(
                        Symbol::make_id(rel_path, &child),
                        parent,
                        EdgeKind::Inherits,
                    ));
                }
                ParsedRelation::Implements { child, iface } => {
                    edges.push(Edge::named(
                        Symbol::make_id(rel_path, &child),
                        iface,
                        EdgeKind::Implements,
                    ));
                }
                ParsedRelation::Import { name } => {
                    for from in &top_level_ids {
                        edges.push(Edge::named(*from, name.clone(), EdgeKind::Imports));
                    }
                }
            }
        }

        (symbols, edges)
    }

    /// Embed the given symbols in fixed-size batches. A failed batch is
    /// skipped with a warning; the index continues and deep-mode retrieval
    /// degrades for the affected symbols.
    async fn embed_symbols(&self, graph: &SymbolGraph, ids: &[String], progress: &ProgressSender) {
        let Some(embeddings) = &self.embeddings else {
            return;
        };
        if ids.is_empty() {
            return;
        }
        if let Err(e) = self.storage.ensure_vector_dim(embeddings.dimensions()).await {
            tracing::warn!(error = %e, "Vector store unavailable; skipping embeddings");
            return;
        }

        let total = ids.len();
        let mut done = 0usize;

        for batch in ids.chunks(EMBED_BATCH_SIZE) {
            let texts: Vec<String> = batch
                .iter()
                .filter_map(|id| graph.get_symbol(id))
                .map(|s| truncate_at_boundary(&symbol_embedding_text(s), MAX_EMBED_CHARS).to_string())
                .collect();

            match embeddings.embed_batch(&texts).await {
                Ok(vectors) => {
                    for (id, vector) in batch.iter().zip(vectors) {
                        if let Err(e) = self
                            .storage
                            .upsert_symbol_embedding(id, &self.repo_id, &self.branch, vector)
                            .await
                        {
                            tracing::warn!(symbol = %id, error = %e, "Failed to store embedding");
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        batch_size = batch.len(),
                        error = %e,
                        "Embedding batch failed; continuing without vectors"
                    );
                }
            }

            done += batch.len();
            progress.emit(IndexProgress::Embedding {
                symbol_count: batch.len(),
                progress: done,
                total,
            });
        }
    }

    async fn write_snapshot(&self, graph: &SymbolGraph) -> Result<()> {
        let blob = graph.serialize()?;
        self.storage
            .save_snapshot(&self.repo_id, &self.branch, blob)
            .await
            .map_err(|e| AgnusError::Storage(e.to_string()))
    }
}

/// Text embedded for a symbol: qualified name, kind and signature, plus the
/// doc comment when present
pub fn symbol_embedding_text(symbol: &Symbol) -> String {
    match &symbol.doc_comment {
        Some(doc) => format!(
            "{} {} {}: {}",
            symbol.qualified_name, symbol.kind, symbol.signature, doc
        ),
        None => format!(
            "{} {} {}",
            symbol.qualified_name, symbol.kind, symbol.signature
        ),
    }
}

/// Enumerate indexable files under `root`, honoring .gitignore, the skip-dir
/// list and generated-file patterns. Returns repo-relative forward-slash
/// paths.
fn collect_files(root: &Path, stats: &mut IndexStats) -> Vec<String> {
    let mut files = Vec::new();

    let walker = ignore::WalkBuilder::new(root)
        .follow_links(true)
        .hidden(true)
        .git_ignore(true)
        .filter_entry(|entry| {
            let name = entry.file_name().to_string_lossy();
            !(entry.file_type().is_some_and(|t| t.is_dir()) && ignore_rules::should_skip_dir(&name))
        })
        .build();

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Failed to access path during indexing: {}", e);
                stats.errors += 1;
                continue;
            }
        };
        if !entry.file_type().is_some_and(|t| t.is_file()) {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");

        if !PARSERS.supports(&rel) {
            continue;
        }
        if ignore_rules::should_skip_path(&rel) {
            stats.skipped += 1;
            continue;
        }
        files.push(rel);
    }

    files.sort();
    files
}
