// crates/agnus/src/storage/schema.rs
// Schema and migrations for the review core database

use anyhow::Result;
use rusqlite::Connection;

/// Main schema. Idempotent; run on every startup.
pub const SCHEMA: &str = r#"
-- =======================================
-- SYMBOL GRAPH
-- =======================================
CREATE TABLE IF NOT EXISTS code_symbols (
    id INTEGER PRIMARY KEY,
    symbol_id TEXT NOT NULL,
    repo_id TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_path TEXT NOT NULL,
    name TEXT NOT NULL,
    qualified_name TEXT NOT NULL,
    kind TEXT NOT NULL,
    signature TEXT,
    start_line INTEGER,
    end_line INTEGER,
    doc_comment TEXT,
    indexed_at TEXT DEFAULT CURRENT_TIMESTAMP,
    UNIQUE(symbol_id, repo_id, branch)
);
CREATE INDEX IF NOT EXISTS idx_symbols_file ON code_symbols(repo_id, branch, file_path);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON code_symbols(name);

CREATE TABLE IF NOT EXISTS code_edges (
    id INTEGER PRIMARY KEY,
    repo_id TEXT NOT NULL,
    branch TEXT NOT NULL,
    file_path TEXT NOT NULL,
    from_id TEXT NOT NULL,
    to_target TEXT NOT NULL,
    to_resolved INTEGER NOT NULL DEFAULT 0,
    kind TEXT NOT NULL,
    UNIQUE(repo_id, branch, from_id, to_target, to_resolved, kind)
);
CREATE INDEX IF NOT EXISTS idx_edges_file ON code_edges(repo_id, branch, file_path);

CREATE TABLE IF NOT EXISTS graph_snapshots (
    repo_id TEXT NOT NULL,
    branch TEXT NOT NULL,
    snapshot BLOB NOT NULL,
    updated_at TEXT DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (repo_id, branch)
);

-- =======================================
-- REVIEWS AND FEEDBACK
-- =======================================
CREATE TABLE IF NOT EXISTS reviews (
    id INTEGER PRIMARY KEY,
    repo_id TEXT NOT NULL,
    pr_id TEXT NOT NULL,
    sha TEXT NOT NULL,
    verdict TEXT NOT NULL,
    summary TEXT,
    comment_count INTEGER DEFAULT 0,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_reviews_repo ON reviews(repo_id, pr_id);

CREATE TABLE IF NOT EXISTS review_comments (
    id INTEGER PRIMARY KEY,
    repo_id TEXT NOT NULL,
    pr_id TEXT NOT NULL,
    fingerprint TEXT NOT NULL,
    file_path TEXT NOT NULL,
    line INTEGER NOT NULL,
    body TEXT NOT NULL,
    severity TEXT NOT NULL,
    confidence REAL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS idx_review_comments_repo ON review_comments(repo_id);
CREATE INDEX IF NOT EXISTS idx_review_comments_fp ON review_comments(repo_id, fingerprint);

CREATE TABLE IF NOT EXISTS review_feedback (
    comment_id INTEGER PRIMARY KEY,
    signal TEXT NOT NULL,
    created_at TEXT DEFAULT CURRENT_TIMESTAMP
);

-- =======================================
-- VECTOR STORE METADATA
-- =======================================
-- vec_symbols / vec_comments are created lazily once the embedding
-- dimension is known; vector_meta records it for drift detection.
CREATE TABLE IF NOT EXISTS vector_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    dim INTEGER NOT NULL
);
"#;

/// DDL for the symbol-vector table, parameterized by embedding dimension
pub fn vec_symbols_ddl(dim: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_symbols USING vec0(
            embedding float[{dim}],
            +symbol_id TEXT,
            +repo_id TEXT,
            +branch TEXT
        )"
    )
}

/// DDL for the comment-vector table, parameterized by embedding dimension
pub fn vec_comments_ddl(dim: usize) -> String {
    format!(
        "CREATE VIRTUAL TABLE IF NOT EXISTS vec_comments USING vec0(
            embedding float[{dim}],
            +comment_id INTEGER,
            +repo_id TEXT
        )"
    )
}

/// Run all schema setup and migrations. Idempotent.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Ensure the vector tables exist with the observed embedding dimension.
///
/// A dimension change invalidates every stored vector: the tables are
/// dropped and recreated, and the caller must re-index. Never silently
/// truncates.
pub fn ensure_vector_dim(conn: &Connection, dim: usize) -> Result<bool> {
    let stored: Option<usize> = conn
        .query_row("SELECT dim FROM vector_meta WHERE id = 1", [], |row| {
            row.get::<_, i64>(0).map(|d| d as usize)
        })
        .ok();

    match stored {
        Some(existing) if existing == dim => {
            // Tables may still be missing on a fresh file with stale meta
            conn.execute(&vec_symbols_ddl(dim), [])?;
            conn.execute(&vec_comments_ddl(dim), [])?;
            Ok(false)
        }
        Some(existing) => {
            tracing::warn!(
                stored = existing,
                observed = dim,
                "Embedding dimension changed; dropping vector store, re-index required"
            );
            conn.execute("DROP TABLE IF EXISTS vec_symbols", [])?;
            conn.execute("DROP TABLE IF EXISTS vec_comments", [])?;
            conn.execute(&vec_symbols_ddl(dim), [])?;
            conn.execute(&vec_comments_ddl(dim), [])?;
            conn.execute(
                "UPDATE vector_meta SET dim = ?1 WHERE id = 1",
                [dim as i64],
            )?;
            Ok(true)
        }
        None => {
            conn.execute(&vec_symbols_ddl(dim), [])?;
            conn.execute(&vec_comments_ddl(dim), [])?;
            conn.execute(
                "INSERT INTO vector_meta (id, dim) VALUES (1, ?1)",
                [dim as i64],
            )?;
            Ok(false)
        }
    }
}
