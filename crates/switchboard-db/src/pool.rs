//! Connection pool creation and configuration.

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use thiserror::Error;

/// Path that selects a private in-memory database.
pub const IN_MEMORY: &str = ":memory:";

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// Busy timeout for SQLite connections, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections. Ignored for
    /// [`IN_MEMORY`], which always pools exactly one connection.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Creates a SQLite connection pool with WAL mode, foreign keys and the
/// configured busy timeout applied to every connection.
///
/// A file path has its parent directory created on demand. [`IN_MEMORY`]
/// opens a single long-lived connection, since each SQLite connection to
/// `:memory:` would otherwise see its own empty database.
///
/// # Errors
///
/// Returns `PoolError::CreateDir` if the database directory cannot be
/// created, or `PoolError::PoolInit` if the first connection fails.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    let busy_timeout_ms = settings.busy_timeout_ms;

    if db_path == IN_MEMORY {
        let manager = SqliteConnectionManager::memory()
            .with_init(move |conn| init_connection(conn, busy_timeout_ms));
        tracing::debug!("using a single-connection in-memory database");
        let pool = Pool::builder()
            .max_size(1)
            .min_idle(Some(1))
            .idle_timeout(None)
            .max_lifetime(None)
            .build(manager)?;
        return Ok(pool);
    }

    ensure_parent_dir(db_path)?;

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let manager = SqliteConnectionManager::file(db_path)
        .with_flags(flags)
        .with_init(move |conn| init_connection(conn, busy_timeout_ms));

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .build(manager)?;
    Ok(pool)
}

fn ensure_parent_dir(db_path: &str) -> Result<(), PoolError> {
    let Some(parent) = Path::new(db_path).parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|source| PoolError::CreateDir {
        path: parent.display().to_string(),
        source,
    })?;
    tracing::info!(path = %parent.display(), "created database directory");
    Ok(())
}

fn init_connection(conn: &mut Connection, busy_timeout_ms: u64) -> Result<(), rusqlite::Error> {
    // In-memory databases report "memory".
    let journal_mode: String = conn.query_row("PRAGMA journal_mode = WAL;", [], |row| row.get(0))?;
    if journal_mode != "wal" && journal_mode != "memory" {
        return Err(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
            Some(format!("journal_mode stayed {}", journal_mode)),
        ));
    }
    conn.execute_batch(&format!(
        "PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {};",
        busy_timeout_ms
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_pool_applies_pragmas() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("switchboard.db");
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 2_500,
            pool_max_size: 3,
        };

        let pool = create_pool(path.to_str().unwrap(), settings).expect("pool creation should succeed");
        let conn = pool.get().expect("should get a connection");

        let mode: String = conn
            .query_row("PRAGMA journal_mode;", [], |row| row.get(0))
            .expect("should query journal_mode");
        assert_eq!(mode, "wal");

        let fk: i32 = conn
            .query_row("PRAGMA foreign_keys;", [], |row| row.get(0))
            .expect("should query foreign_keys");
        assert_eq!(fk, 1, "foreign keys should be enabled");

        let busy_timeout: i32 = conn
            .query_row("PRAGMA busy_timeout;", [], |row| row.get(0))
            .expect("should query busy_timeout");
        assert_eq!(busy_timeout, 2_500);

        assert_eq!(pool.max_size(), 3);
    }

    #[test]
    fn in_memory_pool_shares_one_database() {
        let settings = DbRuntimeSettings {
            busy_timeout_ms: 1_000,
            pool_max_size: 4,
        };
        let pool = create_pool(IN_MEMORY, settings).expect("pool creation should succeed");
        assert_eq!(pool.max_size(), 1);

        {
            let conn = pool.get().unwrap();
            conn.execute_batch("CREATE TABLE marks (id INTEGER PRIMARY KEY); INSERT INTO marks DEFAULT VALUES;")
                .unwrap();
        }

        let conn = pool.get().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM marks", [], |row| row.get(0))
            .expect("table written through an earlier checkout should be visible");
        assert_eq!(count, 1);

        let fk: i32 = conn.query_row("PRAGMA foreign_keys;", [], |row| row.get(0)).unwrap();
        assert_eq!(fk, 1);
    }

    #[test]
    fn missing_parent_directory_is_created() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nested").join("data").join("switchboard.db");

        let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap();
        drop(pool.get().unwrap());
        assert!(path.exists());
    }

    #[test]
    fn unusable_parent_directory_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let blocker = dir.path().join("occupied");
        std::fs::write(&blocker, b"not a directory").unwrap();
        let path = blocker.join("switchboard.db");

        let err = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default()).unwrap_err();
        assert!(matches!(err, PoolError::CreateDir { .. }));
    }
}
