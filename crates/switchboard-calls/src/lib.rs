//! Persisted call and session records.
//!
//! Every function takes a borrowed `rusqlite::Connection` and performs one
//! logical operation. Multi-row creation (a call plus its caller session) runs
//! inside a single transaction so a failure never leaves a call without its
//! caller. Async callers are expected to run these on a blocking thread.

use rusqlite::{params, types::Type, Connection, OptionalExtension, Row};
use switchboard_types::{Call, CallStatus, Session, SessionRole, SessionStatus};
use thiserror::Error;

/// Maximum length of a caller identifier, in bytes.
pub const MAX_CALLER_ID_LEN: usize = 128;

/// Errors that can occur during call store operations.
#[derive(Debug, Error)]
pub enum CallStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("call not found: {0}")]
    CallNotFound(String),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("invalid input: {0}")]
    Validation(String),
    #[error("session {0} already carries a different token")]
    TokenAlreadySet(String),
}

/// Parameters for creating a call together with its caller session.
#[derive(Debug, Clone)]
pub struct NewCall {
    pub call_id: String,
    pub caller_id: String,
    pub caller_session_id: String,
    /// Access token issued to the caller, stored on the caller session.
    pub caller_token: Option<String>,
}

/// Parameters for creating a standalone session on an existing call.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub id: String,
    pub call_id: String,
    pub user_id: String,
    pub role: SessionRole,
    pub status: SessionStatus,
}

/// Generates a fresh opaque identifier for calls and sessions.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Checks a caller identifier and returns its trimmed form.
pub fn validate_caller_id(caller_id: &str) -> Result<&str, CallStoreError> {
    let trimmed = caller_id.trim();
    if trimmed.is_empty() {
        return Err(CallStoreError::Validation("caller_id required".to_string()));
    }
    if trimmed.len() > MAX_CALLER_ID_LEN {
        return Err(CallStoreError::Validation(format!(
            "caller_id exceeds {} bytes",
            MAX_CALLER_ID_LEN
        )));
    }
    Ok(trimmed)
}

/// Creates a call row and the caller's session in one transaction.
pub fn create_call(conn: &Connection, new_call: &NewCall) -> Result<(), CallStoreError> {
    let caller_id = validate_caller_id(&new_call.caller_id)?;
    let now = now_unix();

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO calls (id, caller_id, status, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![new_call.call_id, caller_id, CallStatus::New.as_str(), now],
    )?;
    tx.execute(
        "INSERT INTO sessions (id, call_id, user_id, type, status, token, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            new_call.caller_session_id,
            new_call.call_id,
            caller_id,
            SessionRole::Caller.as_str(),
            SessionStatus::New.as_str(),
            new_call.caller_token,
            now,
        ],
    )?;
    tx.commit()?;

    tracing::debug!(
        call_id = %new_call.call_id,
        session_id = %new_call.caller_session_id,
        "created call with caller session"
    );
    Ok(())
}

/// Creates a session on an existing call.
pub fn create_session(conn: &Connection, session: &NewSession) -> Result<(), CallStoreError> {
    let exists: bool = conn.query_row(
        "SELECT COUNT(*) > 0 FROM calls WHERE id = ?1",
        [&session.call_id],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(CallStoreError::CallNotFound(session.call_id.clone()));
    }

    conn.execute(
        "INSERT INTO sessions (id, call_id, user_id, type, status, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session.id,
            session.call_id,
            session.user_id,
            session.role.as_str(),
            session.status.as_str(),
            now_unix(),
        ],
    )?;
    Ok(())
}

/// Sets the status of a session.
pub fn update_session_status(
    conn: &Connection,
    session_id: &str,
    status: SessionStatus,
) -> Result<(), CallStoreError> {
    let changed = conn.execute(
        "UPDATE sessions SET status = ?1 WHERE id = ?2",
        params![status.as_str(), session_id],
    )?;
    if changed == 0 {
        return Err(CallStoreError::SessionNotFound(session_id.to_string()));
    }
    Ok(())
}

/// Sets the status of a call.
pub fn update_call_status(
    conn: &Connection,
    call_id: &str,
    status: CallStatus,
) -> Result<(), CallStoreError> {
    let changed = conn.execute(
        "UPDATE calls SET status = ?1 WHERE id = ?2",
        params![status.as_str(), call_id],
    )?;
    if changed == 0 {
        return Err(CallStoreError::CallNotFound(call_id.to_string()));
    }
    Ok(())
}

/// Stores the access token for a session.
///
/// A token is written once. Writing the identical token again is a no-op;
/// writing a different one fails with [`CallStoreError::TokenAlreadySet`].
pub fn update_session_token(
    conn: &Connection,
    session_id: &str,
    token: &str,
) -> Result<(), CallStoreError> {
    let changed = conn.execute(
        "UPDATE sessions SET token = ?1 WHERE id = ?2 AND token IS NULL",
        params![token, session_id],
    )?;
    if changed == 1 {
        return Ok(());
    }

    match get_session_token(conn, session_id)? {
        Some(existing) if existing == token => Ok(()),
        Some(_) => Err(CallStoreError::TokenAlreadySet(session_id.to_string())),
        // The row vanished between the two statements.
        None => Err(CallStoreError::SessionNotFound(session_id.to_string())),
    }
}

/// Stores a freshly issued token and marks the session active in one
/// transaction. Either both writes land or neither does.
pub fn activate_session(
    conn: &Connection,
    session_id: &str,
    token: &str,
) -> Result<(), CallStoreError> {
    let tx = conn.unchecked_transaction()?;
    update_session_token(&tx, session_id, token)?;
    update_session_status(&tx, session_id, SessionStatus::Active)?;
    tx.commit()?;
    Ok(())
}

/// Reads the stored token for a session, `None` if none was issued yet.
pub fn get_session_token(
    conn: &Connection,
    session_id: &str,
) -> Result<Option<String>, CallStoreError> {
    let row: Option<Option<String>> = conn
        .query_row(
            "SELECT token FROM sessions WHERE id = ?1",
            [session_id],
            |row| row.get(0),
        )
        .optional()?;
    row.ok_or_else(|| CallStoreError::SessionNotFound(session_id.to_string()))
}

fn label_error(idx: usize, err: switchboard_types::ParseLabelError) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn row_to_session(row: &Row) -> rusqlite::Result<Session> {
    let role: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(Session {
        id: row.get(0)?,
        call_id: row.get(1)?,
        user_id: row.get(2)?,
        role: role.parse().map_err(|e| label_error(3, e))?,
        status: status.parse().map_err(|e| label_error(4, e))?,
        token: row.get(5)?,
        created_at: row.get(6)?,
    })
}

const SESSION_COLUMNS: &str = "id, call_id, user_id, type, status, token, created_at";

/// Retrieves a session by id.
pub fn get_session(conn: &Connection, session_id: &str) -> Result<Session, CallStoreError> {
    conn.query_row(
        &format!("SELECT {} FROM sessions WHERE id = ?1", SESSION_COLUMNS),
        [session_id],
        row_to_session,
    )
    .optional()?
    .ok_or_else(|| CallStoreError::SessionNotFound(session_id.to_string()))
}

/// Resolves a signaling participant identity to its session.
///
/// Participants join rooms using their session id as identity, so this is a
/// session lookup under the name the signaling layer uses.
pub fn find_session_by_identity(
    conn: &Connection,
    identity: &str,
) -> Result<Session, CallStoreError> {
    get_session(conn, identity)
}

/// Lists every session recorded for a call, oldest first.
pub fn list_call_sessions(conn: &Connection, call_id: &str) -> Result<Vec<Session>, CallStoreError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM sessions WHERE call_id = ?1 ORDER BY created_at ASC, rowid ASC",
        SESSION_COLUMNS
    ))?;
    let sessions = stmt
        .query_map([call_id], row_to_session)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(sessions)
}

/// Retrieves a call by id.
pub fn get_call(conn: &Connection, call_id: &str) -> Result<Call, CallStoreError> {
    conn.query_row(
        "SELECT id, caller_id, status, created_at FROM calls WHERE id = ?1",
        [call_id],
        |row| {
            let status: String = row.get(2)?;
            Ok(Call {
                id: row.get(0)?,
                caller_id: row.get(1)?,
                status: status.parse().map_err(|e| label_error(2, e))?,
                created_at: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or_else(|| CallStoreError::CallNotFound(call_id.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn caller_id_is_trimmed_and_bounded() {
        assert_eq!(validate_caller_id("  alice ").unwrap(), "alice");
        assert!(matches!(
            validate_caller_id("   "),
            Err(CallStoreError::Validation(_))
        ));
        let long = "x".repeat(MAX_CALLER_ID_LEN + 1);
        assert!(matches!(
            validate_caller_id(&long),
            Err(CallStoreError::Validation(_))
        ));
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(new_id(), new_id());
        assert_eq!(new_id().len(), 32);
    }
}
