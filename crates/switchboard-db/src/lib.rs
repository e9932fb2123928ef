//! Database layer for Switchboard.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and the embedded SQL migrations that create the `users`, `calls` and
//! `sessions` tables. Row-level queries live in `switchboard-calls`.
//!
//! SQLite in WAL mode allows concurrent readers with a single writer, which
//! is all the orchestration core needs: each row is written by one request
//! or agent task at a time and SQLite serializes the writes.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError, IN_MEMORY};
