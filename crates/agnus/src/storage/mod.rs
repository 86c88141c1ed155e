// crates/agnus/src/storage/mod.rs
// Durable persistence for symbols, edges, snapshots, embeddings, reviews
// and feedback

pub mod pool;
pub mod schema;

use anyhow::Result;
use rusqlite::{Connection, params};
use std::path::Path;

use crate::graph::{Edge, EdgeTarget, Symbol};
use crate::utils::embedding_to_bytes;

pub use self::pool::DatabasePool;

/// A stored review comment joined with its feedback signal
#[derive(Debug, Clone)]
pub struct RatedComment {
    pub comment_id: i64,
    pub body: String,
    pub file_path: String,
    pub signal: String,
}

/// Storage adapter over the pooled SQLite database
pub struct Storage {
    pool: DatabasePool,
}

impl Storage {
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self {
            pool: DatabasePool::open(path).await?,
        })
    }

    /// Shared-cache in-memory storage, for tests
    pub async fn open_in_memory(tag: &str) -> Result<Self> {
        Ok(Self {
            pool: DatabasePool::open_in_memory(tag).await?,
        })
    }

    pub async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        self.pool.interact(f).await
    }

    // ========================================================================
    // Symbol graph persistence
    // ========================================================================

    /// Replace all rows belonging to one file in a single transaction
    pub async fn persist_file(
        &self,
        repo_id: &str,
        branch: &str,
        file_path: &str,
        symbols: Vec<Symbol>,
        edges: Vec<Edge>,
    ) -> Result<()> {
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        let file_path = file_path.to_string();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            delete_file_rows_sync(&tx, &repo_id, &branch, &file_path)?;
            insert_symbols_sync(&tx, &symbols)?;
            insert_edges_sync(&tx, &repo_id, &branch, &file_path, &edges)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Delete a file's symbol, edge and vector rows (incremental updates)
    pub async fn delete_file_rows(&self, repo_id: &str, branch: &str, file_path: &str) -> Result<()> {
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        let file_path = file_path.to_string();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            delete_file_rows_sync(&tx, &repo_id, &branch, &file_path)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Clear all graph rows for a (repo, branch), ahead of a full re-index
    pub async fn clear_graph(&self, repo_id: &str, branch: &str) -> Result<()> {
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM code_symbols WHERE repo_id = ?1 AND branch = ?2",
                params![repo_id, branch],
            )?;
            tx.execute(
                "DELETE FROM code_edges WHERE repo_id = ?1 AND branch = ?2",
                params![repo_id, branch],
            )?;
            if table_exists(&tx, "vec_symbols") {
                tx.execute(
                    "DELETE FROM vec_symbols WHERE repo_id = ?1 AND branch = ?2",
                    params![repo_id, branch],
                )?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    /// Remove everything stored for a repository (deregistration)
    pub async fn delete_repo(&self, repo_id: &str) -> Result<()> {
        let repo_id = repo_id.to_string();
        self.interact(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM code_symbols WHERE repo_id = ?1", params![repo_id])?;
            tx.execute("DELETE FROM code_edges WHERE repo_id = ?1", params![repo_id])?;
            tx.execute(
                "DELETE FROM graph_snapshots WHERE repo_id = ?1",
                params![repo_id],
            )?;
            tx.execute("DELETE FROM reviews WHERE repo_id = ?1", params![repo_id])?;
            tx.execute(
                "DELETE FROM review_feedback WHERE comment_id IN \
                 (SELECT id FROM review_comments WHERE repo_id = ?1)",
                params![repo_id],
            )?;
            tx.execute(
                "DELETE FROM review_comments WHERE repo_id = ?1",
                params![repo_id],
            )?;
            if table_exists(&tx, "vec_symbols") {
                tx.execute("DELETE FROM vec_symbols WHERE repo_id = ?1", params![repo_id])?;
            }
            if table_exists(&tx, "vec_comments") {
                tx.execute("DELETE FROM vec_comments WHERE repo_id = ?1", params![repo_id])?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    pub async fn save_snapshot(&self, repo_id: &str, branch: &str, blob: Vec<u8>) -> Result<()> {
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO graph_snapshots (repo_id, branch, snapshot, updated_at)
                 VALUES (?1, ?2, ?3, CURRENT_TIMESTAMP)
                 ON CONFLICT(repo_id, branch) DO UPDATE SET
                     snapshot = excluded.snapshot,
                     updated_at = CURRENT_TIMESTAMP",
                params![repo_id, branch, blob],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn load_snapshot(&self, repo_id: &str, branch: &str) -> Result<Option<Vec<u8>>> {
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        self.interact(move |conn| {
            let blob = conn
                .query_row(
                    "SELECT snapshot FROM graph_snapshots WHERE repo_id = ?1 AND branch = ?2",
                    params![repo_id, branch],
                    |row| row.get::<_, Vec<u8>>(0),
                )
                .ok();
            Ok(blob)
        })
        .await
    }

    // ========================================================================
    // Vector store
    // ========================================================================

    /// Ensure the vector tables match the observed embedding dimension.
    /// Returns true when the store was dropped and re-created (re-index
    /// required).
    pub async fn ensure_vector_dim(&self, dim: usize) -> Result<bool> {
        self.interact(move |conn| schema::ensure_vector_dim(conn, dim))
            .await
    }

    pub async fn upsert_symbol_embedding(
        &self,
        symbol_id: &str,
        repo_id: &str,
        branch: &str,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let symbol_id = symbol_id.to_string();
        let repo_id = repo_id.to_string();
        let branch = branch.to_string();
        self.interact(move |conn| {
            let bytes = embedding_to_bytes(&embedding);
            conn.execute(
                "DELETE FROM vec_symbols WHERE symbol_id = ?1 AND repo_id = ?2 AND branch = ?3",
                params![symbol_id, repo_id, branch],
            )?;
            conn.execute(
                "INSERT INTO vec_symbols (embedding, symbol_id, repo_id, branch)
                 VALUES (?1, ?2, ?3, ?4)",
                params![bytes, symbol_id, repo_id, branch],
            )?;
            Ok(())
        })
        .await
    }

    /// KNN over symbol vectors scoped to one repo. Returns (symbol_id,
    /// distance) pairs ordered by ascending distance.
    pub async fn search_symbol_embeddings(
        &self,
        query: Vec<f32>,
        repo_id: &str,
        top_k: usize,
    ) -> Result<Vec<(String, f32)>> {
        let repo_id = repo_id.to_string();
        self.interact(move |conn| {
            if !table_exists(conn, "vec_symbols") {
                return Ok(Vec::new());
            }
            let bytes = embedding_to_bytes(&query);
            // Over-fetch, then filter to the repo: vec0 KNN runs before the
            // aux-column predicate applies
            let fetch = (top_k * 8).max(top_k);
            let mut stmt = conn.prepare(
                "SELECT symbol_id, repo_id, distance FROM vec_symbols
                 WHERE embedding MATCH ?1 AND k = ?2
                 ORDER BY distance",
            )?;
            let rows = stmt.query_map(params![bytes, fetch as i64], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f32>(2)?,
                ))
            })?;
            let mut results = Vec::new();
            for row in rows {
                let (symbol_id, row_repo, distance) = row?;
                if row_repo == repo_id {
                    results.push((symbol_id, distance));
                    if results.len() >= top_k {
                        break;
                    }
                }
            }
            Ok(results)
        })
        .await
    }

    pub async fn upsert_comment_embedding(
        &self,
        comment_id: i64,
        repo_id: &str,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let repo_id = repo_id.to_string();
        self.interact(move |conn| {
            let bytes = embedding_to_bytes(&embedding);
            conn.execute(
                "DELETE FROM vec_comments WHERE comment_id = ?1",
                params![comment_id],
            )?;
            conn.execute(
                "INSERT INTO vec_comments (embedding, comment_id, repo_id)
                 VALUES (?1, ?2, ?3)",
                params![bytes, comment_id, repo_id],
            )?;
            Ok(())
        })
        .await
    }

    /// KNN over stored review-comment vectors scoped to one repo
    pub async fn search_comment_embeddings(
        &self,
        query: Vec<f32>,
        repo_id: &str,
        top_k: usize,
    ) -> Result<Vec<(i64, f32)>> {
        let repo_id = repo_id.to_string();
        self.interact(move |conn| {
            if !table_exists(conn, "vec_comments") {
                return Ok(Vec::new());
            }
            let bytes = embedding_to_bytes(&query);
            let fetch = (top_k * 8).max(top_k);
            let mut stmt = conn.prepare(
                "SELECT comment_id, repo_id, distance FROM vec_comments
                 WHERE embedding MATCH ?1 AND k = ?2
                 ORDER BY distance",
            )?;
            let rows = stmt.query_map(params![bytes, fetch as i64], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, f32>(2)?,
                ))
            })?;
            let mut results = Vec::new();
            for row in rows {
                let (comment_id, row_repo, distance) = row?;
                if row_repo == repo_id {
                    results.push((comment_id, distance));
                    if results.len() >= top_k {
                        break;
                    }
                }
            }
            Ok(results)
        })
        .await
    }

    // ========================================================================
    // Reviews and feedback
    // ========================================================================

    pub async fn insert_review(
        &self,
        repo_id: &str,
        pr_id: &str,
        sha: &str,
        verdict: &str,
        summary: &str,
        comment_count: usize,
    ) -> Result<i64> {
        let repo_id = repo_id.to_string();
        let pr_id = pr_id.to_string();
        let sha = sha.to_string();
        let verdict = verdict.to_string();
        let summary = summary.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO reviews (repo_id, pr_id, sha, verdict, summary, comment_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![repo_id, pr_id, sha, verdict, summary, comment_count as i64],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn insert_review_comment(
        &self,
        repo_id: &str,
        pr_id: &str,
        fingerprint: &str,
        file_path: &str,
        line: u32,
        body: &str,
        severity: &str,
        confidence: Option<f32>,
    ) -> Result<i64> {
        let repo_id = repo_id.to_string();
        let pr_id = pr_id.to_string();
        let fingerprint = fingerprint.to_string();
        let file_path = file_path.to_string();
        let body = body.to_string();
        let severity = severity.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO review_comments
                     (repo_id, pr_id, fingerprint, file_path, line, body, severity, confidence)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    repo_id,
                    pr_id,
                    fingerprint,
                    file_path,
                    line as i64,
                    body,
                    severity,
                    confidence.map(|c| c as f64)
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    /// Record a feedback signal; the most recent signal wins on conflict
    pub async fn upsert_feedback(&self, comment_id: i64, signal: &str) -> Result<()> {
        let signal = signal.to_string();
        self.interact(move |conn| {
            conn.execute(
                "INSERT INTO review_feedback (comment_id, signal, created_at)
                 VALUES (?1, ?2, CURRENT_TIMESTAMP)
                 ON CONFLICT(comment_id) DO UPDATE SET
                     signal = excluded.signal,
                     created_at = CURRENT_TIMESTAMP",
                params![comment_id, signal],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_feedback(&self, comment_id: i64) -> Result<Option<String>> {
        self.interact(move |conn| {
            let signal = conn
                .query_row(
                    "SELECT signal FROM review_feedback WHERE comment_id = ?1",
                    params![comment_id],
                    |row| row.get::<_, String>(0),
                )
                .ok();
            Ok(signal)
        })
        .await
    }

    /// Fetch comment bodies joined with feedback signals for the given ids,
    /// preserving the input ordering
    pub async fn rated_comments(&self, comment_ids: Vec<i64>) -> Result<Vec<RatedComment>> {
        if comment_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.interact(move |conn| {
            let placeholders: Vec<&str> = comment_ids.iter().map(|_| "?").collect();
            let sql = format!(
                "SELECT c.id, c.body, c.file_path, f.signal
                 FROM review_comments c
                 JOIN review_feedback f ON f.comment_id = c.id
                 WHERE c.id IN ({})",
                placeholders.join(",")
            );
            let params_vec: Vec<Box<dyn rusqlite::ToSql>> = comment_ids
                .iter()
                .map(|id| Box::new(*id) as Box<dyn rusqlite::ToSql>)
                .collect();
            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|p| p.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_refs.as_slice(), |row| {
                Ok(RatedComment {
                    comment_id: row.get(0)?,
                    body: row.get(1)?,
                    file_path: row.get(2)?,
                    signal: row.get(3)?,
                })
            })?;

            let mut by_id = std::collections::HashMap::new();
            for row in rows {
                let comment: RatedComment = row?;
                by_id.insert(comment.comment_id, comment);
            }
            Ok(comment_ids
                .iter()
                .filter_map(|id| by_id.remove(id))
                .collect())
        })
        .await
    }
}

// ============================================================================
// Sync row functions (run inside pool.interact)
// ============================================================================

fn table_exists(conn: &Connection, name: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?1",
        params![name],
        |_| Ok(true),
    )
    .unwrap_or(false)
}

fn delete_file_rows_sync(
    conn: &Connection,
    repo_id: &str,
    branch: &str,
    file_path: &str,
) -> Result<()> {
    conn.execute(
        "DELETE FROM code_symbols WHERE repo_id = ?1 AND branch = ?2 AND file_path = ?3",
        params![repo_id, branch, file_path],
    )?;
    conn.execute(
        "DELETE FROM code_edges WHERE repo_id = ?1 AND branch = ?2 AND file_path = ?3",
        params![repo_id, branch, file_path],
    )?;
    if table_exists(conn, "vec_symbols") {
        conn.execute(
            "DELETE FROM vec_symbols WHERE repo_id = ?1 AND branch = ?2
             AND symbol_id LIKE ?3 || ':%'",
            params![repo_id, branch, file_path],
        )?;
    }
    Ok(())
}

fn insert_symbols_sync(conn: &Connection, symbols: &[Symbol]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO code_symbols
             (symbol_id, repo_id, branch, file_path, name, qualified_name, kind,
              signature, start_line, end_line, doc_comment)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(symbol_id, repo_id, branch) DO UPDATE SET
             signature = excluded.signature,
             start_line = excluded.start_line,
             end_line = excluded.end_line,
             doc_comment = excluded.doc_comment,
             indexed_at = CURRENT_TIMESTAMP",
    )?;
    for s in symbols {
        stmt.execute(params![
            s.id,
            s.repo_id,
            s.branch,
            s.file_path,
            s.name,
            s.qualified_name,
            s.kind.as_str(),
            s.signature,
            s.start_line,
            s.end_line,
            s.doc_comment,
        ])?;
    }
    Ok(())
}

fn insert_edges_sync(
    conn: &Connection,
    repo_id: &str,
    branch: &str,
    file_path: &str,
    edges: &[Edge],
) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO code_edges
             (repo_id, branch, file_path, from_id, to_target, to_resolved, kind)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
    )?;
    for e in edges {
        let (target, resolved) = match &e.to {
            EdgeTarget::Name(name) => (name.as_str(), 0i64),
            EdgeTarget::Id(id) => (id.as_str(), 1i64),
        };
        stmt.execute(params![
            repo_id,
            branch,
            file_path,
            e.from,
            target,
            resolved,
            e.kind.as_str(),
        ])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{EdgeKind, SymbolKind};

    fn sample_symbol(file: &str, name: &str) -> Symbol {
        Symbol {
            id: Symbol::make_id(file, name),
            file_path: file.to_string(),
            name: name.to_string(),
            qualified_name: name.to_string(),
            kind: SymbolKind::Function,
            signature: format!("fn {}()", name),
            start_line: 1,
            end_line: 3,
            doc_comment: None,
            repo_id: "repo-1".to_string(),
            branch: "main".to_string(),
        }
    }

    #[tokio::test]
    async fn test_persist_and_delete_file_rows() {
        let storage = Storage::open_in_memory("persist_file_test").await.unwrap();
        let symbols = vec![sample_symbol("src/a.ts", "a"), sample_symbol("src/a.ts", "b")];
        let edges = vec![Edge::named("src/a.ts:a", "b", EdgeKind::Calls)];

        storage
            .persist_file("repo-1", "main", "src/a.ts", symbols, edges)
            .await
            .unwrap();

        let count: i64 = storage
            .interact(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM code_symbols", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 2);

        storage
            .delete_file_rows("repo-1", "main", "src/a.ts")
            .await
            .unwrap();
        let count: i64 = storage
            .interact(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM code_symbols", [], |r| r.get(0))?)
            })
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_snapshot_roundtrip() {
        let storage = Storage::open_in_memory("snapshot_test").await.unwrap();
        storage
            .save_snapshot("repo-1", "main", b"snapshot-bytes".to_vec())
            .await
            .unwrap();
        let loaded = storage.load_snapshot("repo-1", "main").await.unwrap();
        assert_eq!(loaded.as_deref(), Some(b"snapshot-bytes".as_ref()));

        // Overwrite wins
        storage
            .save_snapshot("repo-1", "main", b"newer".to_vec())
            .await
            .unwrap();
        let loaded = storage.load_snapshot("repo-1", "main").await.unwrap();
        assert_eq!(loaded.as_deref(), Some(b"newer".as_ref()));

        assert!(storage.load_snapshot("other", "main").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_feedback_latest_signal_wins() {
        let storage = Storage::open_in_memory("feedback_test").await.unwrap();
        let comment_id = storage
            .insert_review_comment(
                "repo-1",
                "pr-1",
                "abcd1234abcd1234",
                "src/a.ts",
                3,
                "Consider handling the error case.",
                "warning",
                Some(0.9),
            )
            .await
            .unwrap();

        storage.upsert_feedback(comment_id, "accepted").await.unwrap();
        assert_eq!(
            storage.get_feedback(comment_id).await.unwrap().as_deref(),
            Some("accepted")
        );

        storage.upsert_feedback(comment_id, "rejected").await.unwrap();
        assert_eq!(
            storage.get_feedback(comment_id).await.unwrap().as_deref(),
            Some("rejected")
        );
    }

    #[tokio::test]
    async fn test_vector_dim_drift_recreates_store() {
        let storage = Storage::open_in_memory("dim_drift_test").await.unwrap();
        assert!(!storage.ensure_vector_dim(4).await.unwrap());
        storage
            .upsert_symbol_embedding("src/a.ts:a", "repo-1", "main", vec![0.1, 0.2, 0.3, 0.4])
            .await
            .unwrap();

        // Same dim: nothing happens
        assert!(!storage.ensure_vector_dim(4).await.unwrap());

        // Dimension change drops the store
        assert!(storage.ensure_vector_dim(8).await.unwrap());
        let results = storage
            .search_symbol_embeddings(vec![0.0; 8], "repo-1", 5)
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_symbol_vector_search_scoped_to_repo() {
        let storage = Storage::open_in_memory("vec_search_test").await.unwrap();
        storage.ensure_vector_dim(4).await.unwrap();

        storage
            .upsert_symbol_embedding("src/a.ts:a", "repo-1", "main", vec![1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();
        storage
            .upsert_symbol_embedding("src/b.ts:b", "repo-2", "main", vec![1.0, 0.0, 0.0, 0.0])
            .await
            .unwrap();

        let results = storage
            .search_symbol_embeddings(vec![1.0, 0.0, 0.0, 0.0], "repo-1", 5)
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "src/a.ts:a");
    }

    #[tokio::test]
    async fn test_rated_comments_join() {
        let storage = Storage::open_in_memory("rated_comments_test").await.unwrap();
        let accepted = storage
            .insert_review_comment("r", "p", "fp1", "a.ts", 1, "good catch", "info", None)
            .await
            .unwrap();
        let unrated = storage
            .insert_review_comment("r", "p", "fp2", "a.ts", 2, "meh", "info", None)
            .await
            .unwrap();
        storage.upsert_feedback(accepted, "accepted").await.unwrap();

        let rated = storage
            .rated_comments(vec![accepted, unrated])
            .await
            .unwrap();
        assert_eq!(rated.len(), 1);
        assert_eq!(rated[0].signal, "accepted");
        assert_eq!(rated[0].body, "good catch");
    }
}
