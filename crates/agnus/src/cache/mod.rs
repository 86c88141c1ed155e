// crates/agnus/src/cache/mod.rs
// Per-(repo, branch) lifecycle of loaded graph, retriever and indexer

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::embeddings::EmbeddingClient;
use crate::error::Result;
use crate::graph::SymbolGraph;
use crate::indexer::{IndexStats, Indexer, ProgressSender};
use crate::retriever::Retriever;
use crate::storage::Storage;

/// Loaded state for one (repo, branch): the graph plus the components bound
/// to it. Readers share the graph lock during BFS; indexing runs hold the
/// write side.
pub struct GraphEntry {
    pub graph: Arc<RwLock<SymbolGraph>>,
    pub retriever: Arc<Retriever>,
    pub indexer: Arc<Indexer>,
    /// Serialises indexing batches per (repo, branch)
    index_lock: Mutex<()>,
}

impl GraphEntry {
    /// Apply an incremental batch. Batches for one pair run in receipt
    /// order; reviews observe the graph before or after a batch, never
    /// mid-batch.
    pub async fn run_incremental(
        &self,
        root: &Path,
        changed: &[String],
        progress: &ProgressSender,
    ) -> Result<IndexStats> {
        let _serialised = self.index_lock.lock().await;
        let mut graph = self.graph.write().await;
        self.indexer
            .incremental_update(root, &mut graph, changed, progress)
            .await
    }

    /// Run a full index from the working tree
    pub async fn run_full_index(
        &self,
        root: &Path,
        progress: &ProgressSender,
    ) -> Result<IndexStats> {
        let _serialised = self.index_lock.lock().await;
        let mut graph = self.graph.write().await;
        *graph = SymbolGraph::new();
        self.indexer.full_index(root, &mut graph, progress).await
    }
}

/// Process-wide cache of loaded graphs keyed by (repo, branch).
///
/// First access loads the durable snapshot when one exists, otherwise runs
/// a full index. Entries are evicted on repo deletion.
pub struct GraphCache {
    storage: Arc<Storage>,
    embeddings: Option<Arc<EmbeddingClient>>,
    entries: RwLock<HashMap<(String, String), Arc<GraphEntry>>>,
}

impl GraphCache {
    pub fn new(storage: Arc<Storage>, embeddings: Option<Arc<EmbeddingClient>>) -> Self {
        Self {
            storage,
            embeddings,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Fetch the entry for a pair, loading or building it on first use.
    /// `root` is the checked-out working tree, used when no snapshot exists.
    pub async fn get_or_load(
        &self,
        repo_id: &str,
        branch: &str,
        root: &Path,
        progress: &ProgressSender,
    ) -> Result<Arc<GraphEntry>> {
        let key = (repo_id.to_string(), branch.to_string());

        if let Some(entry) = self.entries.read().await.get(&key) {
            return Ok(entry.clone());
        }

        let entry = self.build_entry(repo_id, branch).await?;

        // Another task may have raced us; first insert wins
        {
            let mut entries = self.entries.write().await;
            if let Some(existing) = entries.get(&key) {
                return Ok(existing.clone());
            }
            entries.insert(key, entry.clone());
        }

        let needs_full_index = entry.graph.read().await.symbol_count() == 0;
        if needs_full_index {
            tracing::info!(repo = repo_id, branch, "No snapshot found; running full index");
            entry.run_full_index(root, progress).await?;
        }

        Ok(entry)
    }

    /// True when a pair is currently loaded
    pub async fn is_loaded(&self, repo_id: &str, branch: &str) -> bool {
        self.entries
            .read()
            .await
            .contains_key(&(repo_id.to_string(), branch.to_string()))
    }

    /// Evict every branch of a repo and delete its stored rows
    pub async fn evict_repo(&self, repo_id: &str) -> Result<()> {
        {
            let mut entries = self.entries.write().await;
            entries.retain(|(repo, _), _| repo != repo_id);
        }
        self.storage
            .delete_repo(repo_id)
            .await
            .map_err(|e| crate::error::AgnusError::Storage(e.to_string()))?;
        tracing::info!(repo = repo_id, "Repo evicted from graph cache and storage");
        Ok(())
    }

    async fn build_entry(&self, repo_id: &str, branch: &str) -> Result<Arc<GraphEntry>> {
        // Dimension drift detection: a changed embedding dimension drops the
        // vector store and the pair must re-index
        if let Some(embeddings) = &self.embeddings {
            let recreated = self
                .storage
                .ensure_vector_dim(embeddings.dimensions())
                .await
                .map_err(|e| crate::error::AgnusError::Storage(e.to_string()))?;
            if recreated {
                tracing::warn!(
                    repo = repo_id,
                    branch,
                    "Vector store recreated after dimension change; re-index to restore semantic search"
                );
            }
        }

        let graph = match self
            .storage
            .load_snapshot(repo_id, branch)
            .await
            .map_err(|e| crate::error::AgnusError::Storage(e.to_string()))?
        {
            Some(blob) => match SymbolGraph::deserialize(&blob) {
                Ok(graph) => {
                    tracing::info!(
                        repo = repo_id,
                        branch,
                        symbols = graph.symbol_count(),
                        "Loaded graph snapshot"
                    );
                    graph
                }
                Err(e) => {
                    tracing::warn!(
                        repo = repo_id,
                        branch,
                        error = %e,
                        "Corrupt graph snapshot; rebuilding from scratch"
                    );
                    SymbolGraph::new()
                }
            },
            None => SymbolGraph::new(),
        };

        let graph = Arc::new(RwLock::new(graph));
        let retriever = Arc::new(Retriever::new(
            graph.clone(),
            self.storage.clone(),
            self.embeddings.clone(),
            repo_id,
            branch,
        ));
        let indexer = Arc::new(Indexer::new(
            self.storage.clone(),
            self.embeddings.clone(),
            repo_id,
            branch,
        ));

        Ok(Arc::new(GraphEntry {
            graph,
            retriever,
            indexer,
            index_lock: Mutex::new(()),
        }))
    }
}
