//! Bridges the synchronous call store onto the async runtime.

use crate::error::AgentError;
use rusqlite::Connection;
use switchboard_calls::CallStoreError;
use switchboard_db::DbPool;

/// Runs `op` against a pooled connection on the blocking thread pool.
pub async fn blocking<T, F>(pool: &DbPool, op: F) -> Result<T, AgentError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, CallStoreError> + Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let conn = pool.get()?;
        op(&conn).map_err(AgentError::from)
    })
    .await?
}
