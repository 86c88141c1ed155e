// crates/agnus/src/storage/pool.rs
// Async connection pool using deadpool-sqlite with sqlite-vec support
//
// Use `pool.interact()` for all database access so the async runtime is
// never blocked. Closures need explicit result types when inference fails:
// `Ok::<_, rusqlite::Error>(result)`. In-memory tests use a shared-cache URI
// (`file:name?mode=memory&cache=shared`) so pooled connections see the same
// database.

use anyhow::{Context, Result, anyhow};
use deadpool_sqlite::{Config, Hook, Pool, Runtime};
use rusqlite::Connection;
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;
use std::sync::Once;

#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

/// Registers the sqlite-vec extension globally (once per process).
/// Must happen before any SQLite connection is opened.
static SQLITE_VEC_INIT: Once = Once::new();

#[allow(clippy::missing_transmute_annotations)]
fn ensure_sqlite_vec_registered() {
    SQLITE_VEC_INIT.call_once(|| {
        unsafe {
            rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
                sqlite3_vec_init as *const (),
            )));
        }
        tracing::debug!("sqlite-vec extension registered globally");
    });
}

/// Per-connection pragmas
fn setup_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

/// Database pool wrapper with sqlite-vec support and per-connection setup
pub struct DatabasePool {
    pool: Pool,
}

impl DatabasePool {
    /// Open a pooled database at the given path.
    ///
    /// Ensures the parent directory exists with restrictive permissions,
    /// registers sqlite-vec, and runs the schema migrations before returning.
    pub async fn open(path: &Path) -> Result<Self> {
        ensure_sqlite_vec_registered();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
            #[cfg(unix)]
            {
                let mut perms = std::fs::metadata(parent)?.permissions();
                perms.set_mode(0o700);
                std::fs::set_permissions(parent, perms)?;
            }
        }

        let path_str = path.to_string_lossy().to_string();
        let db_pool = Self::build(&path_str, Some(path.to_path_buf()))?;
        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    /// Open a shared-cache in-memory database, for tests.
    /// `tag` keeps separate tests isolated from each other.
    pub async fn open_in_memory(tag: &str) -> Result<Self> {
        ensure_sqlite_vec_registered();
        let uri = format!("file:{}?mode=memory&cache=shared", tag);
        let db_pool = Self::build(&uri, None)?;
        db_pool.run_migrations().await?;
        Ok(db_pool)
    }

    fn build(path_str: &str, file_path: Option<std::path::PathBuf>) -> Result<Self> {
        let cfg = Config::new(path_str);
        let pool = cfg
            .builder(Runtime::Tokio1)
            .context("Failed to create pool builder")?
            .post_create(Hook::async_fn(move |conn, _metrics| {
                let path_for_perms = file_path.clone();
                Box::pin(async move {
                    conn.interact(move |conn| {
                        setup_connection(conn)?;

                        #[cfg(unix)]
                        if let Some(path) = path_for_perms
                            && let Ok(metadata) = std::fs::metadata(&path)
                        {
                            let mut perms = metadata.permissions();
                            perms.set_mode(0o600);
                            if let Err(e) = std::fs::set_permissions(&path, perms) {
                                tracing::warn!(
                                    "Failed to set database file permissions to 0600: {}",
                                    e
                                );
                            }
                        }

                        Ok::<_, rusqlite::Error>(())
                    })
                    .await
                    .map_err(|e| {
                        deadpool_sqlite::HookError::Message(format!("interact failed: {e}").into())
                    })?
                    .map_err(|e| {
                        deadpool_sqlite::HookError::Message(
                            format!("connection setup failed: {e}").into(),
                        )
                    })
                })
            }))
            .build()
            .context("Failed to build connection pool")?;

        Ok(Self { pool })
    }

    async fn run_migrations(&self) -> Result<()> {
        self.interact(|conn| super::schema::run_migrations(conn))
            .await
    }

    /// Run a closure against a pooled connection on a blocking thread
    pub async fn interact<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let obj = self.pool.get().await.context("Failed to get connection")?;
        obj.interact(f)
            .await
            .map_err(|e| anyhow!("Database interaction failed: {}", e))?
    }
}
